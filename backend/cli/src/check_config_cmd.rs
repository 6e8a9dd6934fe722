//! `fleetgate check-config`

use std::path::Path;

use anyhow::{bail, Result};
use fleetgate_config::load_with_report;

use crate::terminal_output::{paint, GREEN, RED, YELLOW};

pub async fn run(path: &Path) -> Result<()> {
    let (config, report) = load_with_report(path).await?;

    let agents = config.swarm.as_ref().map(|s| s.agents.len()).unwrap_or(0);
    let members = config
        .healthring
        .as_ref()
        .map(|h| h.members.len())
        .unwrap_or(0);
    println!("{}: {agents} agent(s), {members} health ring member(s)", path.display());

    for warning in &report.warnings {
        println!("  {} {}: {}", paint(YELLOW, "warning"), warning.path, warning.message);
    }
    for error in &report.errors {
        println!("  {} {}: {}", paint(RED, "error"), error.path, error.message);
    }

    if !report.is_valid() {
        bail!("{} error(s) in {}", report.errors.len(), path.display());
    }
    println!("{}", paint(GREEN, "config ok"));
    Ok(())
}
