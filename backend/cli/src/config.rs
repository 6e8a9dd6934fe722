use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fleetgate_config::{
    config_dir, config_file_path, defaults, ensure_valid, load_with_report, log_report,
    FleetConfig,
};
use fleetgate_logging::init_logger;

/// `--config` if given, otherwise `$FLEETGATE_CONFIG_DIR/config.yaml` or
/// `~/.fleetgate/config.yaml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config_file_path(&config_dir()))
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Address to bind the gateway to; `port` overrides the configured one.
pub fn bind_addr(config: &FleetConfig, port: Option<u16>) -> Result<SocketAddr> {
    let server = config.server.clone().unwrap_or_default();
    let host = server.host.unwrap_or_else(|| defaults::DEFAULT_HOST.to_string());
    let port = port.or(server.port).unwrap_or(defaults::DEFAULT_PORT);
    format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid bind address {host}:{port}"))
}

pub fn log_settings(config: &FleetConfig) -> (Option<PathBuf>, String) {
    let logging = config.logging.clone().unwrap_or_default();
    (
        logging.dir.as_deref().map(expand_home),
        logging
            .level
            .unwrap_or_else(|| defaults::DEFAULT_LOG_LEVEL.to_string()),
    )
}

/// Load the config, start logging with its settings, then report what
/// validation found. Errors still fail the load.
pub async fn load_with_logging(path: &Path) -> Result<FleetConfig> {
    let (fleet, report) = load_with_report(path).await?;
    let (log_dir, level) = log_settings(&fleet);
    init_logger(log_dir.as_deref(), &level);
    log_report(&report);
    ensure_valid(path, &report)?;
    Ok(fleet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetgate_config::ServerConfig;

    #[test]
    fn port_flag_overrides_config() {
        let config = FleetConfig {
            server: Some(ServerConfig {
                host: Some("127.0.0.1".into()),
                port: Some(9000),
            }),
            ..Default::default()
        };
        assert_eq!(bind_addr(&config, None).unwrap().port(), 9000);
        assert_eq!(bind_addr(&config, Some(9100)).unwrap().port(), 9100);
    }

    #[test]
    fn defaults_when_server_missing() {
        let addr = bind_addr(&FleetConfig::default(), None).unwrap();
        assert_eq!(addr.to_string(), "0.0.0.0:18800");
    }

    #[test]
    fn bad_host_is_an_error() {
        let config = FleetConfig {
            server: Some(ServerConfig {
                host: Some("not a host".into()),
                port: None,
            }),
            ..Default::default()
        };
        assert!(bind_addr(&config, None).is_err());
    }

    #[test]
    fn explicit_path_wins() {
        let path = resolve_config_path(Some(Path::new("/etc/fleetgate.yaml")));
        assert_eq!(path, PathBuf::from("/etc/fleetgate.yaml"));
        assert_eq!(expand_home("/var/log/fleetgate"), PathBuf::from("/var/log/fleetgate"));
    }

    #[tokio::test]
    async fn logger_is_installed_before_warnings_are_reported() {
        let path = std::env::temp_dir().join(format!(
            "fleetgate-cli-{}-warn.yaml",
            std::process::id()
        ));
        tokio::fs::write(
            &path,
            "logging:\n  level: warn\nswarm:\n  discovery:\n    subnet: 10.0.0.0/16\n",
        )
        .await
        .unwrap();

        let fleet = load_with_logging(&path).await.unwrap();
        assert!(tracing::dispatcher::has_been_set());
        assert_eq!(
            fleet.swarm.unwrap().discovery.unwrap().subnet.as_deref(),
            Some("10.0.0.0/16")
        );

        tokio::fs::write(&path, "swarm:\n  discovery:\n    subnet: nope\n")
            .await
            .unwrap();
        assert!(load_with_logging(&path).await.is_err());
        tokio::fs::remove_file(&path).await.ok();
    }
}
