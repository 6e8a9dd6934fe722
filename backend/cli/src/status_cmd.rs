//! CLI Status Command
//!
//! Summarises a running gateway's agents, members and circuits.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::terminal_output::{paint, status_badge, BOLD};

#[derive(Debug, Deserialize)]
struct Counts {
    up: usize,
    total: usize,
}

#[derive(Debug, Deserialize)]
struct Circuit {
    name: String,
    state: String,
    failures: u32,
}

#[derive(Debug, Deserialize)]
struct StatusReport {
    agents: Counts,
    members: Counts,
    healthring_enabled: bool,
    circuits: Vec<Circuit>,
}

pub async fn run(base_url: &str) -> Result<()> {
    let url = format!("{}/api/v1/status", base_url.trim_end_matches('/'));
    let report: StatusReport = match reqwest::get(&url).await {
        Ok(resp) => resp
            .error_for_status()
            .with_context(|| format!("GET {url}"))?
            .json()
            .await
            .context("Unexpected status payload")?,
        Err(_) => {
            println!("fleetgate is not running at {base_url}");
            return Ok(());
        }
    };

    println!("\n{}\n", paint(BOLD, "fleetgate status"));
    println!("Agents:  {}/{} up", report.agents.up, report.agents.total);
    if report.healthring_enabled {
        println!("Members: {}/{} up", report.members.up, report.members.total);
    } else {
        println!("Members: health ring disabled");
    }

    if !report.circuits.is_empty() {
        println!("\nCircuits:");
        for circuit in &report.circuits {
            println!(
                "  - {:<16} {} (failures: {})",
                circuit.name,
                status_badge(&circuit.state),
                circuit.failures
            );
        }
    }
    println!();
    Ok(())
}
