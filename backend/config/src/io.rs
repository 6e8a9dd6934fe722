//! Config file location and YAML loading.

use crate::schema::FleetConfig;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Default config file name within the config directory.
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Resolve the fleetgate config directory.
/// Priority: `FLEETGATE_CONFIG_DIR` env > `~/.fleetgate/`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FLEETGATE_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|home| home.join(".fleetgate"))
        .unwrap_or_else(|| PathBuf::from(".fleetgate"))
}

/// Resolve the full path to the main config file.
pub fn config_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CONFIG_FILE_NAME)
}

/// Read the config file as an untyped JSON value tree.
///
/// Returns an empty object if the file doesn't exist (first run).
pub async fn load_raw(path: &Path) -> Result<Value> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(Value::Object(Default::default()));
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let value = parse_yaml(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    Ok(value)
}

/// Parse YAML text into a JSON value tree. An empty document is an empty object.
pub fn parse_yaml(raw: &str) -> Result<Value> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(raw)?;
    if yaml.is_null() {
        return Ok(Value::Object(Default::default()));
    }
    Ok(serde_json::to_value(yaml)?)
}

/// Parse YAML text straight into the typed config, without env substitution.
pub fn parse_config(raw: &str) -> Result<FleetConfig> {
    let value = parse_yaml(raw)?;
    serde_json::from_value(value).context("Config does not match the fleetgate schema")
}
