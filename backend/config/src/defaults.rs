//! Config defaults: fills unset tunables after parsing.

use std::time::Duration;

use crate::schema::{
    CircuitBreakerSettings, DiscoveryConfig, FleetConfig, HealthRingConfig, InferenceConfig,
    LoggingConfig, ServerConfig, SwarmConfig,
};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 18800;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_DISCOVERY_METHOD: &str = "arp";
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_HISTORY_SIZE: usize = 20;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;

/// Apply all defaults to a freshly loaded config.
pub fn apply_all_defaults(config: FleetConfig) -> FleetConfig {
    let config = apply_server_defaults(config);
    let config = apply_logging_defaults(config);
    let config = apply_discovery_defaults(config);
    let config = apply_healthring_defaults(config);
    apply_breaker_defaults(config)
}

fn apply_server_defaults(mut config: FleetConfig) -> FleetConfig {
    let server = config.server.get_or_insert_with(ServerConfig::default);
    server.host.get_or_insert_with(|| DEFAULT_HOST.to_string());
    server.port.get_or_insert(DEFAULT_PORT);
    config
}

fn apply_logging_defaults(mut config: FleetConfig) -> FleetConfig {
    let logging = config.logging.get_or_insert_with(LoggingConfig::default);
    logging
        .level
        .get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());
    config
}

fn apply_discovery_defaults(mut config: FleetConfig) -> FleetConfig {
    let swarm = config.swarm.get_or_insert_with(SwarmConfig::default);
    let discovery = swarm.discovery.get_or_insert_with(DiscoveryConfig::default);
    discovery
        .method
        .get_or_insert_with(|| DEFAULT_DISCOVERY_METHOD.to_string());
    discovery.scan_interval.get_or_insert(DEFAULT_SCAN_INTERVAL);
    config
}

fn apply_healthring_defaults(mut config: FleetConfig) -> FleetConfig {
    let ring = config.healthring.get_or_insert_with(HealthRingConfig::default);
    ring.check_interval.get_or_insert(DEFAULT_CHECK_INTERVAL);
    ring.history_size.get_or_insert(DEFAULT_HISTORY_SIZE);
    config
}

/// Zero values are treated as unset, matching how the breaker normalises its own config.
fn apply_breaker_defaults(mut config: FleetConfig) -> FleetConfig {
    let inference = config.inference.get_or_insert_with(InferenceConfig::default);
    let cb = inference
        .circuit_breaker
        .get_or_insert_with(CircuitBreakerSettings::default);
    if cb.failure_threshold.unwrap_or(0) == 0 {
        cb.failure_threshold = Some(DEFAULT_FAILURE_THRESHOLD);
    }
    if cb.recovery_timeout.unwrap_or(Duration::ZERO).is_zero() {
        cb.recovery_timeout = Some(DEFAULT_RECOVERY_TIMEOUT);
    }
    if cb.success_threshold.unwrap_or(0) == 0 {
        cb.success_threshold = Some(DEFAULT_SUCCESS_THRESHOLD);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_empty_config() {
        let cfg = apply_all_defaults(FleetConfig::default());
        assert_eq!(cfg.server.unwrap().port, Some(DEFAULT_PORT));
        let ring = cfg.healthring.unwrap();
        assert_eq!(ring.check_interval, Some(DEFAULT_CHECK_INTERVAL));
        assert_eq!(ring.history_size, Some(DEFAULT_HISTORY_SIZE));
        let cb = cfg.inference.unwrap().circuit_breaker.unwrap();
        assert_eq!(cb.failure_threshold, Some(3));
        assert_eq!(cb.recovery_timeout, Some(Duration::from_secs(30)));
        assert_eq!(cb.success_threshold, Some(2));
    }

    #[test]
    fn does_not_override_user_values() {
        let mut cfg = FleetConfig::default();
        cfg.healthring = Some(HealthRingConfig {
            history_size: Some(5),
            ..Default::default()
        });
        let cfg = apply_all_defaults(cfg);
        assert_eq!(cfg.healthring.unwrap().history_size, Some(5));
    }

    #[test]
    fn zero_threshold_is_replaced() {
        let mut cfg = FleetConfig::default();
        cfg.inference = Some(InferenceConfig {
            circuit_breaker: Some(CircuitBreakerSettings {
                failure_threshold: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        });
        let cfg = apply_all_defaults(cfg);
        let cb = cfg.inference.unwrap().circuit_breaker.unwrap();
        assert_eq!(cb.failure_threshold, Some(DEFAULT_FAILURE_THRESHOLD));
    }
}
