//! Agent Registry
//!
//! In-memory map of configured agents. The set of agents is fixed at
//! construction; only status, address and last-seen change afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fleetgate_config::AgentConfig;
use fleetgate_core::{FleetError, NodeStatus, Result, ServiceResolver};
use fleetgate_logging::{EventLogger, FleetEvent};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::agent::Agent;

#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: Arc<RwLock<BTreeMap<String, Agent>>>,
}

impl AgentRegistry {
    pub fn new(agents: impl IntoIterator<Item = Agent>) -> Self {
        let mut map = BTreeMap::new();
        for agent in agents {
            if map.contains_key(&agent.name) {
                warn!(agent = %agent.name, "Duplicate agent name ignored");
                continue;
            }
            map.insert(agent.name.clone(), agent);
        }
        Self {
            agents: Arc::new(RwLock::new(map)),
        }
    }

    pub fn from_config(configs: &[AgentConfig]) -> Self {
        Self::new(configs.iter().map(Agent::from))
    }

    /// Current address of an agent that is known to be up.
    pub async fn resolve(&self, name: &str) -> Result<String> {
        let agents = self.agents.read().await;
        let agent = agents.get(name).ok_or_else(|| FleetError::AgentNotFound {
            name: name.to_string(),
        })?;
        if !agent.status.is_up() {
            return Err(FleetError::AgentUnreachable {
                name: name.to_string(),
                status: agent.status,
            });
        }
        Ok(agent.address.clone())
    }

    /// `http://address:port` for a named service. Status is not consulted.
    pub async fn service_url(&self, name: &str, service: &str) -> Result<String> {
        let agents = self.agents.read().await;
        let agent = agents.get(name).ok_or_else(|| FleetError::AgentNotFound {
            name: name.to_string(),
        })?;
        agent
            .service_url(service)
            .ok_or_else(|| FleetError::ServiceNotFound {
                agent: name.to_string(),
                service: service.to_string(),
            })
    }

    /// Snapshot of every agent, ordered by name.
    pub async fn list_agents(&self) -> Vec<Agent> {
        self.agents.read().await.values().cloned().collect()
    }

    pub async fn get_agent(&self, name: &str) -> Option<Agent> {
        self.agents.read().await.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }

    /// (up, total)
    pub async fn up_count(&self) -> (usize, usize) {
        let agents = self.agents.read().await;
        let up = agents.values().filter(|a| a.status.is_up()).count();
        (up, agents.len())
    }

    /// Record a probe outcome. Up also refreshes last-seen. Returns the
    /// previous status, or `None` for an unknown agent.
    pub async fn set_status(&self, name: &str, status: NodeStatus) -> Option<NodeStatus> {
        let previous = {
            let mut agents = self.agents.write().await;
            let agent = agents.get_mut(name)?;
            let previous = agent.status;
            agent.status = status;
            if status.is_up() {
                agent.last_seen = Some(Utc::now());
            }
            previous
        };

        if previous != status {
            info!(agent = %name, from = %previous, to = %status, "Agent status changed");
            EventLogger::log_event(FleetEvent::AgentStatusChanged {
                agent: name.to_string(),
                from: previous,
                to: status,
            });
        }
        Some(previous)
    }

    /// Replace the dial address after a successful re-resolution.
    pub async fn set_address(&self, name: &str, address: &str) -> bool {
        let previous = {
            let mut agents = self.agents.write().await;
            let Some(agent) = agents.get_mut(name) else {
                return false;
            };
            if agent.address == address {
                return true;
            }
            std::mem::replace(&mut agent.address, address.to_string())
        };

        debug!(agent = %name, from = %previous, to = %address, "Agent address changed");
        EventLogger::log_event(FleetEvent::AgentAddressChanged {
            agent: name.to_string(),
            from: previous,
            to: address.to_string(),
        });
        true
    }
}

#[async_trait]
impl ServiceResolver for AgentRegistry {
    async fn agent_host(&self, agent: &str) -> Result<String> {
        self.get_agent(agent)
            .await
            .map(|a| a.address)
            .ok_or_else(|| FleetError::AgentNotFound {
                name: agent.to_string(),
            })
    }

    async fn service_url(&self, agent: &str, service: &str) -> Result<String> {
        AgentRegistry::service_url(self, agent, service).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AgentRegistry {
        AgentRegistry::new([
            Agent::new("harold", "192.168.1.128").with_service("bridge", 18802),
            Agent::new("pink", "192.168.1.186").with_service("ollama", 11434),
        ])
    }

    #[tokio::test]
    async fn resolve_requires_up() {
        let reg = registry();
        match reg.resolve("harold").await {
            Err(FleetError::AgentUnreachable { status, .. }) => {
                assert_eq!(status, NodeStatus::Unknown)
            }
            other => panic!("expected AgentUnreachable, got {other:?}"),
        }

        reg.set_status("harold", NodeStatus::Up).await;
        assert_eq!(reg.resolve("harold").await.unwrap(), "192.168.1.128");

        reg.set_status("harold", NodeStatus::Down).await;
        assert!(matches!(
            reg.resolve("harold").await,
            Err(FleetError::AgentUnreachable {
                status: NodeStatus::Down,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn unknown_name_is_not_found_not_unreachable() {
        let err = registry().resolve("nobody").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn service_url_composition() {
        let reg = registry();
        assert_eq!(
            reg.service_url("harold", "bridge").await.unwrap(),
            "http://192.168.1.128:18802"
        );
        assert!(matches!(
            reg.service_url("harold", "ollama").await,
            Err(FleetError::ServiceNotFound { .. })
        ));
        assert!(matches!(
            reg.service_url("ghost", "bridge").await,
            Err(FleetError::AgentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn up_refreshes_last_seen_and_down_keeps_it() {
        let reg = registry();
        assert_eq!(
            reg.set_status("pink", NodeStatus::Up).await,
            Some(NodeStatus::Unknown)
        );
        let seen = reg.get_agent("pink").await.unwrap().last_seen;
        assert!(seen.is_some());

        reg.set_status("pink", NodeStatus::Down).await;
        assert_eq!(reg.get_agent("pink").await.unwrap().last_seen, seen);
        assert_eq!(reg.set_status("ghost", NodeStatus::Up).await, None);
    }

    #[tokio::test]
    async fn address_update_flows_into_urls() {
        let reg = registry();
        assert!(reg.set_address("harold", "10.0.0.9").await);
        assert!(!reg.set_address("ghost", "10.0.0.9").await);
        assert_eq!(
            reg.service_url("harold", "bridge").await.unwrap(),
            "http://10.0.0.9:18802"
        );
        assert_eq!(reg.get_agent("harold").await.unwrap().host, "192.168.1.128");
    }

    #[tokio::test]
    async fn list_is_sorted_and_counts_up() {
        let reg = registry();
        reg.set_status("pink", NodeStatus::Up).await;
        let names: Vec<_> = reg.list_agents().await.into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["harold", "pink"]);
        assert_eq!(reg.up_count().await, (1, 2));
    }

    #[tokio::test]
    async fn duplicate_names_keep_first() {
        let reg = AgentRegistry::new([
            Agent::new("a", "10.0.0.1"),
            Agent::new("a", "10.0.0.2"),
        ]);
        assert_eq!(reg.len().await, 1);
        assert_eq!(reg.get_agent("a").await.unwrap().host, "10.0.0.1");
    }

    #[tokio::test]
    async fn resolver_host_ignores_status() {
        let reg = registry();
        let resolver: &dyn ServiceResolver = &reg;
        assert_eq!(resolver.agent_host("pink").await.unwrap(), "192.168.1.186");
    }
}
