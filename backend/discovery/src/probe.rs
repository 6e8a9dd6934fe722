//! Short-timeout network probes.
//!
//! Failures fold into `false`/`Err(String)`; nothing here retries.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Open and immediately close a TCP connection.
pub async fn tcp_connect(host: &str, port: u16, limit: Duration) -> Result<()> {
    let addr = format!("{host}:{port}");
    let stream = timeout(limit, TcpStream::connect(&addr))
        .await
        .map_err(|_| anyhow!("tcp {addr}: timed out after {}ms", limit.as_millis()))?
        .with_context(|| format!("tcp {addr}"))?;
    drop(stream);
    Ok(())
}

pub async fn tcp_probe(host: &str, port: u16, limit: Duration) -> bool {
    tcp_connect(host, port, limit).await.is_ok()
}

/// First port that accepts a connection, tried in order.
pub async fn any_port_open(host: &str, ports: &[u16], limit: Duration) -> Option<u16> {
    for port in ports {
        if tcp_probe(host, *port, limit).await {
            return Some(*port);
        }
    }
    None
}

/// GET `url` and return the status code.
pub async fn http_status(client: &reqwest::Client, url: &str, limit: Duration) -> Result<u16> {
    let resp = client
        .get(url)
        .timeout(limit)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?;
    Ok(resp.status().as_u16())
}

/// True if GET `url` answers 2xx.
pub async fn http_probe(client: &reqwest::Client, url: &str, limit: Duration) -> bool {
    matches!(http_status(client, url, limit).await, Ok(code) if (200..300).contains(&code))
}
