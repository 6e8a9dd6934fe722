use std::fmt;

use serde::{Deserialize, Serialize};

/// Liveness of an agent or health ring member.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Unknown,
    Up,
    Down,
}

impl NodeStatus {
    pub fn from_success(success: bool) -> Self {
        if success {
            NodeStatus::Up
        } else {
            NodeStatus::Down
        }
    }

    pub fn is_up(self) -> bool {
        self == NodeStatus::Up
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Unknown => write!(f, "unknown"),
            NodeStatus::Up => write!(f, "up"),
            NodeStatus::Down => write!(f, "down"),
        }
    }
}
