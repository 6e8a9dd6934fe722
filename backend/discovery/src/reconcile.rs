//! Background reachability loop for configured agents.

use std::time::Duration;

use fleetgate_config::{defaults, DiscoveryConfig};
use fleetgate_core::NodeStatus;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::net::lookup_host;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::probe;
use crate::registry::AgentRegistry;

pub const ADMIN_PORT: u16 = 22;

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub interval: Duration,
    /// Re-resolve agent hostnames each pass (mdns-style methods).
    pub resolve_names: bool,
    pub admin_port: u16,
    pub dial_timeout: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            interval: defaults::DEFAULT_SCAN_INTERVAL,
            resolve_names: false,
            admin_port: ADMIN_PORT,
            dial_timeout: probe::DEFAULT_DIAL_TIMEOUT,
        }
    }
}

impl From<&DiscoveryConfig> for DiscoveryOptions {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            interval: config
                .scan_interval
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults::DEFAULT_SCAN_INTERVAL),
            resolve_names: config.resolves_names(),
            ..Default::default()
        }
    }
}

/// Periodically probes every configured agent and records up/down.
pub struct Discovery {
    registry: AgentRegistry,
    options: DiscoveryOptions,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Discovery {
    pub fn new(registry: AgentRegistry, options: DiscoveryOptions) -> Self {
        Self {
            registry,
            options,
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some() && !self.cancel.is_cancelled()
    }

    /// Run one pass now, then every `interval` until stopped. A second call
    /// while running, or any call after `stop`, does nothing.
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.is_some() || self.cancel.is_cancelled() {
            debug!("Discovery already started");
            return;
        }

        let registry = self.registry.clone();
        let options = self.options.clone();
        let cancel = self.cancel.clone();
        info!(
            interval_secs = options.interval.as_secs(),
            resolve_names = options.resolve_names,
            "Starting agent discovery"
        );

        *handle = Some(tokio::spawn(async move {
            let period = options.interval.max(Duration::from_millis(10));
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = reconcile_once(&registry, &options) => {}
                        }
                    }
                }
            }
            debug!("Discovery loop exited");
        }));
    }

    /// Cancel the loop and wait for it to exit. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Discovery task ended abnormally");
            }
            info!("Agent discovery stopped");
        }
    }
}

/// Probe every agent once, concurrently.
pub async fn reconcile_once(registry: &AgentRegistry, options: &DiscoveryOptions) {
    let agents = registry.list_agents().await;
    join_all(
        agents
            .iter()
            .map(|agent| reconcile_agent(registry, options, agent)),
    )
    .await;
}

async fn reconcile_agent(registry: &AgentRegistry, options: &DiscoveryOptions, agent: &Agent) {
    let mut address = agent.address.clone();
    if options.resolve_names {
        if let Some(resolved) = resolve_host(&agent.host, options.dial_timeout).await {
            if resolved != address {
                registry.set_address(&agent.name, &resolved).await;
                address = resolved;
            }
        }
    }

    let ports = agent.probe_ports(options.admin_port);
    let hit = probe::any_port_open(&address, &ports, options.dial_timeout).await;
    debug!(agent = %agent.name, address = %address, port = ?hit, "Probed agent");
    registry
        .set_status(&agent.name, NodeStatus::from_success(hit.is_some()))
        .await;
}

/// First IPv4 address for `host`, falling back to any address. `None` keeps
/// the previous address, including when the lookup outlasts `limit`.
async fn resolve_host(host: &str, limit: Duration) -> Option<String> {
    match tokio::time::timeout(limit, lookup_host((host, 0))).await {
        Ok(Ok(addrs)) => {
            let addrs: Vec<_> = addrs.map(|a| a.ip()).collect();
            addrs
                .iter()
                .find(|ip| ip.is_ipv4())
                .or_else(|| addrs.first())
                .map(|ip| ip.to_string())
        }
        Ok(Err(e)) => {
            debug!(host = %host, error = %e, "Name resolution failed, keeping address");
            None
        }
        Err(_) => {
            debug!(
                host = %host,
                timeout_ms = limit.as_millis() as u64,
                "Name resolution timed out, keeping address"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn options(admin_port: u16) -> DiscoveryOptions {
        DiscoveryOptions {
            interval: Duration::from_secs(60),
            resolve_names: false,
            admin_port,
            dial_timeout: Duration::from_millis(500),
        }
    }

    async fn closed_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[tokio::test]
    async fn service_port_marks_up_when_admin_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let registry = AgentRegistry::new([
            Agent::new("live", "127.0.0.1").with_service("bridge", port),
            Agent::new("dead", "127.0.0.1"),
        ]);

        reconcile_once(&registry, &options(closed_port().await)).await;

        assert_eq!(registry.get_agent("live").await.unwrap().status, NodeStatus::Up);
        assert_eq!(registry.get_agent("dead").await.unwrap().status, NodeStatus::Down);
        assert_eq!(registry.resolve("live").await.unwrap(), "127.0.0.1");
    }

    #[tokio::test]
    async fn failed_resolution_keeps_address() {
        let registry = AgentRegistry::new([Agent::new("ghost", "no-such-host.invalid")]);
        let mut opts = options(closed_port().await);
        opts.resolve_names = true;
        reconcile_once(&registry, &opts).await;

        let agent = registry.get_agent("ghost").await.unwrap();
        assert_eq!(agent.address, "no-such-host.invalid");
        assert_eq!(agent.status, NodeStatus::Down);
    }

    #[tokio::test]
    async fn resolution_is_bounded_by_dial_timeout() {
        assert_eq!(resolve_host("localhost", Duration::ZERO).await, None);
        assert!(resolve_host("localhost", Duration::from_secs(5)).await.is_some());
    }

    #[tokio::test]
    async fn resolution_updates_address() {
        let registry = AgentRegistry::new([Agent::new("local", "localhost")]);
        let mut opts = options(closed_port().await);
        opts.resolve_names = true;
        reconcile_once(&registry, &opts).await;

        let agent = registry.get_agent("local").await.unwrap();
        assert_eq!(agent.host, "localhost");
        assert!(agent.address.parse::<std::net::IpAddr>().is_ok());
    }

    #[tokio::test]
    async fn start_probes_immediately_and_stop_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let registry = AgentRegistry::new([Agent::new("a", "127.0.0.1")]);
        let discovery = Discovery::new(registry.clone(), options(port));

        discovery.start();
        discovery.start();
        assert!(discovery.is_running());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while registry.get_agent("a").await.unwrap().status != NodeStatus::Up {
            assert!(tokio::time::Instant::now() < deadline, "first pass never ran");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        discovery.stop().await;
        discovery.stop().await;
        assert!(!discovery.is_running());

        discovery.start();
        assert!(!discovery.is_running());
    }

    #[test]
    fn options_from_config() {
        let opts = DiscoveryOptions::from(&DiscoveryConfig {
            method: Some("mdns+arp".into()),
            scan_interval: Some(Duration::from_secs(0)),
            subnet: None,
        });
        assert!(opts.resolve_names);
        assert_eq!(opts.interval, defaults::DEFAULT_SCAN_INTERVAL);
        assert_eq!(opts.admin_port, 22);
    }
}
