use async_trait::async_trait;

use crate::error::Result;

/// Resolves agent names to network locations.
///
/// Implemented by the agent registry; consumed by the health ring so that
/// check definitions can refer to agents by name.
#[async_trait]
pub trait ServiceResolver: Send + Sync {
    /// Current address of the agent, regardless of its status.
    async fn agent_host(&self, agent: &str) -> Result<String>;

    /// `http://address:port` for a named service of the agent.
    async fn service_url(&self, agent: &str, service: &str) -> Result<String>;
}
