use thiserror::Error;

use crate::types::NodeStatus;

pub type Result<T> = std::result::Result<T, FleetError>;

/// Top-level error type for the fleetgate core.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("agent not found: {name}")]
    AgentNotFound { name: String },

    #[error("agent {name} is not reachable (status: {status})")]
    AgentUnreachable { name: String, status: NodeStatus },

    #[error("service {service} not found on agent {agent}")]
    ServiceNotFound { agent: String, service: String },

    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("unsupported prefix length /{0}: only /24 ranges can be scanned")]
    UnsupportedPrefix(u8),

    #[error("unknown health check type: {0}")]
    UnknownCheckType(String),

    #[error("all lanes unavailable (primary: {primary}, fallbacks: {fallbacks:?})")]
    AllLanesUnavailable {
        primary: String,
        fallbacks: Vec<String>,
    },

    #[error("operation cancelled before it started")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FleetError {
    /// True for "never heard of it" errors, as opposed to "known but down".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FleetError::AgentNotFound { .. } | FleetError::ServiceNotFound { .. }
        )
    }
}
