//! `fleetgate scan`: stream a /24 sweep as JSON lines.

use std::time::Duration;

use anyhow::{Context, Result};
use fleetgate_discovery::{scan_subnet, ScanOptions};
use tokio_util::sync::CancellationToken;

pub async fn run(cidr: &str, workers: usize, timeout_ms: u64) -> Result<()> {
    let token = CancellationToken::new();
    let options = ScanOptions::default()
        .with_workers(workers)
        .with_timeout(Duration::from_millis(timeout_ms));
    let mut nodes = scan_subnet(token.clone(), cidr, options)
        .with_context(|| format!("Cannot scan {cidr}"))?;

    let on_ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let mut found = 0usize;
    while let Some(node) = nodes.recv().await {
        println!("{}", serde_json::to_string(&node)?);
        found += 1;
    }

    if token.is_cancelled() {
        eprintln!("scan of {cidr} cancelled after {found} node(s)");
    } else {
        eprintln!("scan of {cidr} complete: {found} node(s)");
    }
    Ok(())
}
