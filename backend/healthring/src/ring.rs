//! Health Ring
//!
//! Evaluates every member on a fixed interval. A tick evaluates all members
//! concurrently and then applies every result under one write lock, so a
//! status snapshot is always from a single tick.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleetgate_config::{defaults, HealthCheckSpec, HealthMemberConfig, HealthRingConfig};
use fleetgate_core::{NodeStatus, ServiceResolver};
use fleetgate_discovery::probe;
use fleetgate_logging::{EventLogger, FleetEvent};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::check::{self, CheckContext};
use crate::history::{CheckResult, HealthHistory};

#[derive(Debug, Clone)]
pub struct HealthRingOptions {
    pub check_interval: Duration,
    pub history_size: usize,
    pub tcp_timeout: Duration,
    pub http_timeout: Duration,
}

impl Default for HealthRingOptions {
    fn default() -> Self {
        Self {
            check_interval: defaults::DEFAULT_CHECK_INTERVAL,
            history_size: defaults::DEFAULT_HISTORY_SIZE,
            tcp_timeout: probe::DEFAULT_DIAL_TIMEOUT,
            http_timeout: probe::DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl From<&HealthRingConfig> for HealthRingOptions {
    fn from(config: &HealthRingConfig) -> Self {
        let base = Self::default();
        Self {
            check_interval: config
                .check_interval
                .filter(|d| !d.is_zero())
                .unwrap_or(base.check_interval),
            history_size: config
                .history_size
                .filter(|n| *n > 0)
                .unwrap_or(base.history_size),
            ..base
        }
    }
}

/// Copy of one member's state handed to readers.
#[derive(Debug, Clone, Serialize)]
pub struct MemberStatus {
    pub name: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub history: Vec<CheckResult>,
}

#[derive(Debug)]
struct MemberState {
    status: NodeStatus,
    history: HealthHistory,
}

impl MemberState {
    fn snapshot(&self, name: &str) -> MemberStatus {
        let latest = self.history.latest();
        MemberStatus {
            name: name.to_string(),
            status: self.status,
            last_check: latest.map(|r| r.timestamp),
            last_error: latest.and_then(|r| r.error.clone()),
            history: self.history.to_vec(),
        }
    }
}

pub struct HealthRing {
    members: Arc<Vec<HealthMemberConfig>>,
    state: Arc<RwLock<BTreeMap<String, MemberState>>>,
    resolver: Arc<dyn ServiceResolver>,
    client: reqwest::Client,
    options: HealthRingOptions,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HealthRing {
    pub fn new(
        members: Vec<HealthMemberConfig>,
        resolver: Arc<dyn ServiceResolver>,
        options: HealthRingOptions,
    ) -> Self {
        let mut state = BTreeMap::new();
        let mut unique = Vec::with_capacity(members.len());
        for member in members {
            if state.contains_key(&member.name) {
                warn!(member = %member.name, "Duplicate health ring member ignored");
                continue;
            }
            state.insert(
                member.name.clone(),
                MemberState {
                    status: NodeStatus::Unknown,
                    history: HealthHistory::new(options.history_size),
                },
            );
            unique.push(member);
        }

        Self {
            members: Arc::new(unique),
            state: Arc::new(RwLock::new(state)),
            resolver,
            client: reqwest::Client::new(),
            options,
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    pub fn from_config(config: &HealthRingConfig, resolver: Arc<dyn ServiceResolver>) -> Self {
        Self::new(
            config.members.clone(),
            resolver,
            HealthRingOptions::from(config),
        )
    }

    pub fn options(&self) -> &HealthRingOptions {
        &self.options
    }

    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some() && !self.cancel.is_cancelled()
    }

    /// Tick immediately, then every `check_interval`, until stopped. Calls
    /// after the first, or after `stop`, do nothing.
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.is_some() || self.cancel.is_cancelled() {
            debug!("Health ring already started");
            return;
        }

        let ticker = self.ticker();
        let cancel = self.cancel.clone();
        info!(
            members = self.members.len(),
            interval_secs = self.options.check_interval.as_secs(),
            "Starting health ring"
        );

        *handle = Some(tokio::spawn(async move {
            let period = ticker.options.check_interval.max(Duration::from_millis(10));
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = ticker.run() => {}
                        }
                    }
                }
            }
            debug!("Health ring loop exited");
        }));
    }

    /// Cancel the loop and wait for it. Safe to call repeatedly; no state
    /// changes once this returns.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Health ring task ended abnormally");
            }
            info!("Health ring stopped");
        }
    }

    /// Evaluate every member once, outside the schedule. Does nothing once
    /// the ring has been stopped.
    pub async fn run_tick(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.ticker().run().await;
    }

    fn ticker(&self) -> Ticker {
        Ticker {
            members: self.members.clone(),
            state: self.state.clone(),
            resolver: self.resolver.clone(),
            client: self.client.clone(),
            options: self.options.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Every member's state, keyed by name.
    pub async fn status(&self) -> BTreeMap<String, MemberStatus> {
        self.state
            .read()
            .await
            .iter()
            .map(|(name, state)| (name.clone(), state.snapshot(name)))
            .collect()
    }

    pub async fn member(&self, name: &str) -> Option<MemberStatus> {
        self.state.read().await.get(name).map(|s| s.snapshot(name))
    }

    /// (up, total)
    pub async fn up_count(&self) -> (usize, usize) {
        let state = self.state.read().await;
        let up = state.values().filter(|s| s.status.is_up()).count();
        (up, state.len())
    }

    pub fn member_names(&self) -> Vec<String> {
        self.members.iter().map(|m| m.name.clone()).collect()
    }
}

struct Ticker {
    members: Arc<Vec<HealthMemberConfig>>,
    state: Arc<RwLock<BTreeMap<String, MemberState>>>,
    resolver: Arc<dyn ServiceResolver>,
    client: reqwest::Client,
    options: HealthRingOptions,
    cancel: CancellationToken,
}

impl Ticker {
    async fn run(&self) {
        let ctx = CheckContext {
            resolver: self.resolver.as_ref(),
            client: &self.client,
            tcp_timeout: self.options.tcp_timeout,
            http_timeout: self.options.http_timeout,
        };

        let results = join_all(self.members.iter().map(|member| {
            let checks: &[HealthCheckSpec] = &member.checks;
            async move { (member.name.as_str(), check::evaluate(&member.name, checks, &ctx).await) }
        }))
        .await;

        let mut changes = Vec::new();
        {
            let mut state = self.state.write().await;
            if self.cancel.is_cancelled() {
                return;
            }
            for (name, result) in results {
                let Some(member) = state.get_mut(name) else {
                    continue;
                };
                let status = NodeStatus::from_success(result.success);
                if member.status != status {
                    changes.push((name, member.status, status, result.error.clone()));
                }
                member.status = status;
                member.history.push(result);
            }
        }

        for (member, from, to, error) in changes {
            info!(member = %member, from = %from, to = %to, "Member health changed");
            EventLogger::log_event(FleetEvent::MemberHealthChanged {
                member: member.to_string(),
                from,
                to,
                error,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::tests::StaticResolver;
    use async_trait::async_trait;
    use fleetgate_core::FleetError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    fn member(name: &str, checks: Vec<HealthCheckSpec>) -> HealthMemberConfig {
        HealthMemberConfig {
            name: name.into(),
            checks,
        }
    }

    fn options(history_size: usize) -> HealthRingOptions {
        HealthRingOptions {
            check_interval: Duration::from_secs(60),
            history_size,
            tcp_timeout: Duration::from_millis(500),
            http_timeout: Duration::from_secs(2),
        }
    }

    fn loopback_resolver(names: &[&str]) -> Arc<StaticResolver> {
        let mut resolver = StaticResolver::default();
        for name in names {
            resolver.hosts.insert(name.to_string(), "127.0.0.1".into());
        }
        Arc::new(resolver)
    }

    /// Fails the first lookup, then serves `url`.
    struct FlakyResolver {
        calls: AtomicUsize,
        url: String,
    }

    #[async_trait]
    impl ServiceResolver for FlakyResolver {
        async fn agent_host(&self, _agent: &str) -> fleetgate_core::Result<String> {
            Ok("127.0.0.1".into())
        }

        async fn service_url(&self, agent: &str, service: &str) -> fleetgate_core::Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(FleetError::ServiceNotFound {
                    agent: agent.into(),
                    service: service.into(),
                });
            }
            Ok(self.url.clone())
        }
    }

    #[tokio::test]
    async fn members_start_unknown() {
        let ring = HealthRing::new(
            vec![member("a", vec![HealthCheckSpec::tcp(22)])],
            loopback_resolver(&["a"]),
            options(5),
        );
        let status = ring.status().await;
        assert_eq!(status["a"].status, NodeStatus::Unknown);
        assert!(status["a"].history.is_empty());
        assert!(ring.member("b").await.is_none());
    }

    #[tokio::test]
    async fn tick_sets_up_and_down_independently() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let ring = HealthRing::new(
            vec![
                member("good", vec![HealthCheckSpec::tcp(open)]),
                member("bad", vec![HealthCheckSpec::tcp(open), HealthCheckSpec::tcp(closed)]),
                member("ghost", vec![HealthCheckSpec::tcp(open)]),
            ],
            loopback_resolver(&["good", "bad"]),
            options(5),
        );

        ring.run_tick().await;

        let status = ring.status().await;
        assert_eq!(status["good"].status, NodeStatus::Up);
        assert_eq!(status["bad"].status, NodeStatus::Down);
        assert!(status["bad"].last_error.is_some());
        assert_eq!(status["ghost"].status, NodeStatus::Down);
        assert!(status["ghost"]
            .last_error
            .as_deref()
            .unwrap()
            .contains("agent not found"));
        assert_eq!(ring.up_count().await, (1, 3));
    }

    #[tokio::test]
    async fn unknown_check_type_fails_member() {
        let mut spec = HealthCheckSpec::tcp(22);
        spec.check_type = "ping".into();
        let ring = HealthRing::new(
            vec![member("a", vec![spec])],
            loopback_resolver(&["a"]),
            options(5),
        );
        ring.run_tick().await;
        let a = ring.member("a").await.unwrap();
        assert_eq!(a.status, NodeStatus::Down);
        assert!(a.last_error.unwrap().contains("unknown health check type"));
    }

    #[tokio::test]
    async fn history_evicts_oldest_after_capacity_plus_one() {
        use axum::{routing::get, Router};
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/health", get(|| async { "ok" })))
                .await
                .ok();
        });

        let resolver = Arc::new(FlakyResolver {
            calls: AtomicUsize::new(0),
            url: format!("http://{addr}"),
        });
        let ring = HealthRing::new(
            vec![member("a", vec![HealthCheckSpec::http("{{resolve a api}}/health")])],
            resolver,
            options(3),
        );

        for _ in 0..4 {
            ring.run_tick().await;
        }

        let a = ring.member("a").await.unwrap();
        assert_eq!(a.history.len(), 3);
        assert!(a.history.iter().all(|r| r.success), "first failure evicted");
        assert_eq!(a.status, NodeStatus::Up);
        assert_eq!(a.last_check, a.history.last().map(|r| r.timestamp));
    }

    #[tokio::test]
    async fn snapshots_are_copies() {
        let ring = HealthRing::new(
            vec![member("a", vec![])],
            loopback_resolver(&["a"]),
            options(2),
        );
        let before = ring.status().await;
        ring.run_tick().await;
        assert!(before["a"].history.is_empty());
        assert_eq!(ring.member("a").await.unwrap().history.len(), 1);
    }

    #[tokio::test]
    async fn start_ticks_and_stop_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let ring = HealthRing::new(
            vec![member("a", vec![HealthCheckSpec::tcp(open)])],
            loopback_resolver(&["a"]),
            options(5),
        );

        ring.start();
        ring.start();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while ring.member("a").await.unwrap().status != NodeStatus::Up {
            assert!(tokio::time::Instant::now() < deadline, "first tick never ran");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        ring.stop().await;
        ring.stop().await;
        assert!(!ring.is_running());

        let frozen = ring.member("a").await.unwrap().history.len();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ring.member("a").await.unwrap().history.len(), frozen);
    }

    #[tokio::test]
    async fn manual_tick_after_stop_changes_nothing() {
        let ring = HealthRing::new(
            vec![member("a", vec![])],
            loopback_resolver(&["a"]),
            options(5),
        );
        ring.run_tick().await;
        assert_eq!(ring.member("a").await.unwrap().history.len(), 1);

        ring.stop().await;
        ring.run_tick().await;
        ring.run_tick().await;
        let a = ring.member("a").await.unwrap();
        assert_eq!(a.history.len(), 1);
        assert_eq!(a.status, NodeStatus::Up);
    }

    #[test]
    fn options_from_config_fill_zeros() {
        let opts = HealthRingOptions::from(&HealthRingConfig {
            enabled: true,
            check_interval: Some(Duration::ZERO),
            history_size: Some(0),
            members: vec![],
        });
        assert_eq!(opts.check_interval, defaults::DEFAULT_CHECK_INTERVAL);
        assert_eq!(opts.history_size, defaults::DEFAULT_HISTORY_SIZE);
    }
}
