use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use fleetgate_config::AgentConfig;
use fleetgate_core::NodeStatus;
use serde::{Deserialize, Serialize};

/// A statically configured swarm member.
///
/// `host` is what the operator wrote; `address` is where we currently dial,
/// which changes only when name resolution is enabled and succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub host: String,
    pub address: String,
    pub services: BTreeMap<String, u16>,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Agent {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            name: name.into(),
            address: host.clone(),
            host,
            services: BTreeMap::new(),
            status: NodeStatus::Unknown,
            last_seen: None,
        }
    }

    pub fn with_service(mut self, service: impl Into<String>, port: u16) -> Self {
        self.services.insert(service.into(), port);
        self
    }

    pub fn service_url(&self, service: &str) -> Option<String> {
        self.services
            .get(service)
            .map(|port| format!("http://{}:{}", self.address, port))
    }

    /// Ports to try when checking reachability: the admin port first, then
    /// each declared service port once.
    pub fn probe_ports(&self, admin_port: u16) -> Vec<u16> {
        let mut ports = vec![admin_port];
        for port in self.services.values() {
            if !ports.contains(port) {
                ports.push(*port);
            }
        }
        ports
    }
}

impl From<&AgentConfig> for Agent {
    fn from(config: &AgentConfig) -> Self {
        Self {
            services: config.services.clone(),
            ..Agent::new(config.name.clone(), config.host.clone())
        }
    }
}
