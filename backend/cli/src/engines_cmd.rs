//! `fleetgate engines`

use std::time::Duration;

use anyhow::Result;
use fleetgate_discovery::EngineDetector;
use tokio_util::sync::CancellationToken;

use crate::terminal_output::{paint, BOLD, DIM};

pub async fn run(subnet: Option<&str>) -> Result<()> {
    let detector = EngineDetector::new(Duration::from_secs(3))?;
    let engines = detector.detect(subnet, CancellationToken::new()).await?;

    if engines.is_empty() {
        println!("No inference engines found");
        return Ok(());
    }

    for engine in &engines {
        println!(
            "{} {} ({}ms)",
            paint(BOLD, &engine.name),
            engine.base_url,
            engine.response_ms
        );
        match &engine.default_model {
            Some(model) => println!("  default: {model}"),
            None => println!("  {}", paint(DIM, "no models loaded")),
        }
        for model in &engine.models {
            println!("  - {model}");
        }
    }
    Ok(())
}
