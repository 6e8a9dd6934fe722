//! `fleetgate serve`: wires config into the long-running components.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use fleetgate_config::FleetConfig;
use fleetgate_discovery::{AgentRegistry, Discovery, DiscoveryOptions, EngineDetector};
use fleetgate_gateway::{start_server, GatewayState};
use fleetgate_healthring::HealthRing;
use fleetgate_routing::{CircuitBreakerConfig, CircuitBreakerRegistry, LaneSelector};
use tracing::{info, warn};

use crate::config::bind_addr;

pub async fn run_server(config: FleetConfig, port: Option<u16>) -> Result<()> {
    let addr = bind_addr(&config, port)?;
    let swarm = config.swarm.clone().unwrap_or_default();
    let inference = config.inference.clone().unwrap_or_default();
    let ring_config = config.healthring.clone().unwrap_or_default();

    info!(
        addr = %addr,
        agents = swarm.agents.len(),
        members = ring_config.members.len(),
        "Starting fleetgate"
    );

    let registry = AgentRegistry::from_config(&swarm.agents);
    let discovery = Discovery::new(
        registry.clone(),
        swarm
            .discovery
            .as_ref()
            .map(DiscoveryOptions::from)
            .unwrap_or_default(),
    );
    discovery.start();

    let ring = if ring_config.enabled {
        let ring = Arc::new(HealthRing::from_config(
            &ring_config,
            Arc::new(registry.clone()),
        ));
        ring.start();
        Some(ring)
    } else {
        info!("Health ring disabled");
        None
    };

    let breakers = Arc::new(CircuitBreakerRegistry::new(
        inference
            .circuit_breaker
            .as_ref()
            .map(CircuitBreakerConfig::from)
            .unwrap_or_default(),
    ));
    if let Some(fallback) = inference.fallback.clone() {
        let selector = LaneSelector::new(fallback, breakers.clone());
        let lanes: Vec<&str> = selector.candidates().collect();
        for lane in &lanes {
            breakers.get(lane);
        }
        info!(lanes = ?lanes, "Inference lanes registered");
    }

    let mut state = GatewayState::new(registry.clone(), breakers);
    if let Some(ring) = &ring {
        state = state.with_health_ring(ring.clone());
    }

    spawn_engine_detection(&state).await;

    let result = start_server(addr, state, shutdown_signal()).await;

    discovery.stop().await;
    if let Some(ring) = &ring {
        ring.stop().await;
    }
    info!("fleetgate stopped");
    result
}

/// Probe localhost and each configured agent for inference engines once.
async fn spawn_engine_detection(state: &GatewayState) {
    let mut hosts = vec!["127.0.0.1".to_string()];
    for agent in state.registry.list_agents().await {
        if !hosts.contains(&agent.address) {
            hosts.push(agent.address);
        }
    }

    let engines = state.engines.clone();
    tokio::spawn(async move {
        let detector = match EngineDetector::new(Duration::from_secs(3)) {
            Ok(detector) => detector,
            Err(e) => {
                warn!(error = %e, "Engine detection unavailable");
                return;
            }
        };
        let found = detector.detect_hosts(&hosts).await;
        info!(hosts = hosts.len(), engines = found.len(), "Engine detection complete");
        *engines.write().await = found;
    });
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl-C; running until killed");
            std::future::pending::<()>().await;
        }
    }
}
