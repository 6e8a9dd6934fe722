//! fleetgate configuration schema.
//!
//! Typed for serde YAML deserialization. Every section is optional so that an
//! empty file is a valid (if idle) configuration; defaults are filled in by
//! [`crate::defaults::apply_all_defaults`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for fleetgate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Operator HTTP surface
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    /// Logging configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    /// Statically known agents and discovery policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swarm: Option<SwarmConfig>,

    /// Health ring policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthring: Option<HealthRingConfig>,

    /// Lane fallback and circuit breaker policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference: Option<InferenceConfig>,
}

// ---------------------------------------------------------------------------
// Server / logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// EnvFilter directive, e.g. "info" or "fleetgate_discovery=debug"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Directory for rolling NDJSON logs; console only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

// ---------------------------------------------------------------------------
// Swarm
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmConfig {
    #[serde(default)]
    pub agents: Vec<AgentConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<DiscoveryConfig>,
}

/// One statically configured swarm member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    /// Hostname or IP address
    pub host: String,
    /// service name → port
    #[serde(default)]
    pub services: BTreeMap<String, u16>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// "arp", "mdns", or a combination such as "mdns+arp"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(
        default,
        with = "crate::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub scan_interval: Option<Duration>,

    /// CIDR offered to the subnet sweep, e.g. "192.168.1.0/24"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
}

impl DiscoveryConfig {
    /// Whether hostnames should be re-resolved on each reconciliation pass.
    pub fn resolves_names(&self) -> bool {
        self.method
            .as_deref()
            .map(|m| m.split(['+', ',', ' ']).any(|part| part.trim() == "mdns"))
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Health ring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthRingConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(
        default,
        with = "crate::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub check_interval: Option<Duration>,

    /// Capacity of each member's history ring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_size: Option<usize>,

    #[serde(default)]
    pub members: Vec<HealthMemberConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMemberConfig {
    pub name: String,
    #[serde(default)]
    pub checks: Vec<HealthCheckSpec>,
}

/// Declarative check bound to a health ring member.
///
/// `type` is kept as a free string: an unrecognised type is reported when the
/// check runs, not when the file is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    #[serde(rename = "type")]
    pub check_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// May embed `{{resolve <agent> <service>}}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_status: Option<u16>,
}

impl HealthCheckSpec {
    pub fn tcp(port: u16) -> Self {
        Self {
            check_type: "tcp".to_string(),
            port: Some(port),
            url: None,
            expect_status: None,
        }
    }

    pub fn http(url: impl Into<String>) -> Self {
        Self {
            check_type: "http".to_string(),
            port: None,
            url: Some(url.into()),
            expect_status: None,
        }
    }

    pub fn with_expect_status(mut self, status: u16) -> Self {
        self.expect_status = Some(status);
        self
    }
}

// ---------------------------------------------------------------------------
// Inference lanes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerSettings>,
}

/// Ordered lane preference: primary first, then fallbacks in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default)]
    pub primary: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
    #[serde(default)]
    pub use_circuit_breaker: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,

    #[serde(
        default,
        with = "crate::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub recovery_timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_threshold: Option<u32>,
}
