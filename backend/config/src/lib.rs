//! `fleetgate-config`: static configuration for the fleet liveness core.
//!
//! Provides:
//! - Typed schema for agents, discovery, health ring, and lane fallback
//! - YAML loading
//! - `${ENV_VAR}` substitution
//! - Human duration strings (`30s`, `5m`)
//! - Default value application
//! - Structural validation

pub mod defaults;
pub mod duration;
pub mod env;
pub mod io;
pub mod schema;
pub mod validation;

pub use defaults::apply_all_defaults;
pub use env::{resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use io::{config_dir, config_file_path, load_raw, parse_config};
pub use schema::{
    AgentConfig, CircuitBreakerSettings, DiscoveryConfig, FallbackConfig, FleetConfig,
    HealthCheckSpec, HealthMemberConfig, HealthRingConfig, InferenceConfig, LoggingConfig,
    ServerConfig, SwarmConfig,
};
pub use validation::{validate, ConfigValidationError, ValidationReport};

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Load, substitute env vars, and apply defaults, returning the validation
/// report alongside the config instead of failing on it.
pub async fn load_with_report(path: &Path) -> Result<(FleetConfig, ValidationReport)> {
    let value = load_raw(path).await?;
    let value = resolve_env_vars(&value).context("Failed to resolve env vars in config")?;
    let config: FleetConfig =
        serde_json::from_value(value).context("Failed to deserialize config after processing")?;
    let config = apply_all_defaults(config);
    let report = validate(&config);
    Ok((config, report))
}

/// Log every warning and error in `report`.
pub fn log_report(report: &ValidationReport) {
    for warning in &report.warnings {
        tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
    }
    for error in &report.errors {
        tracing::error!(path = %error.path, message = %error.message, "Config error");
    }
}

/// Fail if `report` holds any errors.
pub fn ensure_valid(path: &Path, report: &ValidationReport) -> Result<()> {
    if let Some(first) = report.errors.first() {
        bail!(
            "config at {} has {} error(s); first: {}",
            path.display(),
            report.errors.len(),
            first
        );
    }
    Ok(())
}

/// Load, substitute env vars, apply defaults, and validate a config file.
///
/// Validation warnings are logged through whatever subscriber is already
/// installed; validation errors fail the load.
pub async fn load_and_prepare(path: &Path) -> Result<FleetConfig> {
    let (config, report) = load_with_report(path).await?;
    log_report(&report);
    ensure_valid(path, &report)?;
    Ok(config)
}
