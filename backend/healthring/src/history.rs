use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one evaluation of a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    pub fn ok() -> Self {
        Self {
            timestamp: Utc::now(),
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Fixed-capacity ring of results. Oldest entries are evicted first.
#[derive(Debug, Clone)]
pub struct HealthHistory {
    capacity: usize,
    entries: VecDeque<CheckResult>,
}

impl HealthHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, result: CheckResult) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(result);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&CheckResult> {
        self.entries.back()
    }

    /// Oldest first.
    pub fn to_vec(&self) -> Vec<CheckResult> {
        self.entries.iter().cloned().collect()
    }
}
