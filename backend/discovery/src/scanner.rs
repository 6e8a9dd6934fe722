//! Subnet Sweep
//!
//! Active /24 sweep for unlisted nodes. A fixed pool of workers pulls host
//! indices from a shared counter, so open sockets are bounded by
//! `workers × probes per host` no matter how large the range is. Nodes are
//! streamed out as they are found.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fleetgate_core::{FleetError, Result};
use fleetgate_logging::{EventLogger, FleetEvent};
use futures::future::join_all;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::probe;

pub const DEFAULT_WORKERS: usize = 32;
pub const DEFAULT_TCP_PORTS: &[u16] = &[22, 80, 443, 8080, 11434, 18802, 18892];
pub const DEFAULT_HTTP_ENDPOINTS: &[(u16, &str)] = &[
    (8080, "/health"),
    (11434, "/api/tags"),
    (18802, "/health"),
    (18892, "/health"),
];

/// Something that answered on a swept host.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceSignature {
    Tcp { port: u16 },
    Http { port: u16, path: String },
}

impl fmt::Display for ServiceSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceSignature::Tcp { port } => write!(f, "tcp:{port}"),
            ServiceSignature::Http { port, path } => write!(f, "http:{port}{path}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredNode {
    pub address: Ipv4Addr,
    pub services: BTreeSet<ServiceSignature>,
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub workers: usize,
    pub tcp_ports: Vec<u16>,
    pub http_endpoints: Vec<(u16, String)>,
    pub probe_timeout: Duration,
    /// Capacity of the outward result channel.
    pub buffer: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            tcp_ports: DEFAULT_TCP_PORTS.to_vec(),
            http_endpoints: DEFAULT_HTTP_ENDPOINTS
                .iter()
                .map(|(port, path)| (*port, path.to_string()))
                .collect(),
            probe_timeout: probe::DEFAULT_DIAL_TIMEOUT,
            buffer: 16,
        }
    }
}

impl ScanOptions {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_tcp_ports(mut self, ports: Vec<u16>) -> Self {
        self.tcp_ports = ports;
        self
    }

    pub fn without_http(mut self) -> Self {
        self.http_endpoints.clear();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}

/// Host addresses of a /24, excluding network and broadcast.
pub fn subnet_hosts(cidr: &str) -> Result<Vec<Ipv4Addr>> {
    let net: Ipv4Net = cidr
        .trim()
        .parse()
        .map_err(|_| FleetError::InvalidCidr(cidr.to_string()))?;
    if net.prefix_len() != 24 {
        return Err(FleetError::UnsupportedPrefix(net.prefix_len()));
    }
    Ok(net.hosts().collect())
}

/// Sweep `cidr` and stream responsive nodes.
///
/// Structural problems (bad CIDR, token already cancelled) are returned
/// before any probing starts. Cancelling the token afterwards stops new
/// probes and closes the stream; probes already in flight run to their
/// timeout and their results are dropped.
pub fn scan_subnet(
    token: CancellationToken,
    cidr: &str,
    options: ScanOptions,
) -> Result<mpsc::Receiver<DiscoveredNode>> {
    let hosts = subnet_hosts(cidr)?;
    if token.is_cancelled() {
        return Err(FleetError::Cancelled);
    }

    let client = reqwest::Client::builder()
        .timeout(options.probe_timeout)
        .build()
        .map_err(|e| FleetError::Other(e.into()))?;

    let workers = options.workers.clamp(1, hosts.len());
    let (out_tx, out_rx) = mpsc::channel(options.buffer.max(1));
    let (found_tx, mut found_rx) = mpsc::channel::<DiscoveredNode>(workers);

    info!(cidr = %cidr, workers, "Starting subnet sweep");

    let hosts = Arc::new(hosts);
    let next = Arc::new(AtomicUsize::new(0));
    let options = Arc::new(options);

    for _ in 0..workers {
        let hosts = hosts.clone();
        let next = next.clone();
        let options = options.clone();
        let client = client.clone();
        let token = token.clone();
        let found_tx = found_tx.clone();
        tokio::spawn(async move {
            loop {
                if token.is_cancelled() {
                    break;
                }
                let i = next.fetch_add(1, Ordering::Relaxed);
                let Some(host) = hosts.get(i).copied() else {
                    break;
                };
                if let Some(node) = probe_host(&client, host, &options).await {
                    if found_tx.send(node).await.is_err() {
                        break;
                    }
                }
            }
        });
    }
    drop(found_tx);

    let cidr = cidr.to_string();
    tokio::spawn(async move {
        let mut emitted = 0usize;
        loop {
            let node = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                node = found_rx.recv() => match node {
                    Some(node) => node,
                    None => break,
                },
            };

            EventLogger::log_event(FleetEvent::NodeDiscovered {
                address: node.address.to_string(),
                services: node.services.iter().map(|s| s.to_string()).collect(),
            });

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                sent = out_tx.send(node) => {
                    if sent.is_err() {
                        break;
                    }
                    emitted += 1;
                }
            }
        }
        if token.is_cancelled() {
            info!(cidr = %cidr, emitted, "Subnet sweep cancelled");
        } else {
            info!(cidr = %cidr, emitted, "Subnet sweep complete");
        }
    });

    Ok(out_rx)
}

async fn probe_host(
    client: &reqwest::Client,
    host: Ipv4Addr,
    options: &ScanOptions,
) -> Option<DiscoveredNode> {
    let ip = host.to_string();

    let tcp = join_all(options.tcp_ports.iter().map(|port| {
        let ip = &ip;
        async move {
            probe::tcp_probe(ip, *port, options.probe_timeout)
                .await
                .then_some(ServiceSignature::Tcp { port: *port })
        }
    }));
    let http = join_all(options.http_endpoints.iter().map(|(port, path)| {
        let url = format!("http://{ip}:{port}{path}");
        async move {
            probe::http_probe(client, &url, options.probe_timeout)
                .await
                .then(|| ServiceSignature::Http {
                    port: *port,
                    path: path.clone(),
                })
        }
    }));
    let (tcp, http) = tokio::join!(tcp, http);

    let services: BTreeSet<_> = tcp.into_iter().chain(http).flatten().collect();
    if services.is_empty() {
        return None;
    }
    debug!(address = %host, services = services.len(), "Node responded");
    Some(DiscoveredNode {
        address: host,
        services,
    })
}
