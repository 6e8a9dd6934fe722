//! Gateway Health API
//!
//! Process liveness plus aggregate views over agents, members and breakers.

use std::collections::BTreeMap;

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use fleetgate_discovery::DetectedEngine;
use fleetgate_routing::CircuitStats;
use serde::Serialize;

use crate::server::GatewayState;

#[derive(Debug, Serialize)]
pub struct Counts {
    pub up: usize,
    pub total: usize,
}

impl From<(usize, usize)> for Counts {
    fn from((up, total): (usize, usize)) -> Self {
        Self { up, total }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub agents: usize,
    pub members: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub agents: Counts,
    pub members: Counts,
    pub healthring_enabled: bool,
    pub circuits: Vec<CircuitStats>,
    pub timestamp: DateTime<Utc>,
}

/// A model offered by one or more detected engines.
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub engines: Vec<String>,
}

fn uptime_seconds(state: &GatewayState) -> u64 {
    (Utc::now() - state.started_at).num_seconds().max(0) as u64
}

async fn member_counts(state: &GatewayState) -> (usize, usize) {
    match &state.health_ring {
        Some(ring) => ring.up_count().await,
        None => (0, 0),
    }
}

/// Handler for `GET /health`
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthReport> {
    let (_, members) = member_counts(&state).await;
    Json(HealthReport {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: uptime_seconds(&state),
        agents: state.registry.len().await,
        members,
        timestamp: Utc::now(),
    })
}

/// Handler for `GET /api/v1/status`
pub async fn get_status(State(state): State<GatewayState>) -> Json<StatusReport> {
    Json(StatusReport {
        agents: state.registry.up_count().await.into(),
        members: member_counts(&state).await.into(),
        healthring_enabled: state.health_ring.is_some(),
        circuits: state.breakers.all_stats(),
        timestamp: Utc::now(),
    })
}

/// Handler for `GET /api/v1/circuits`
pub async fn get_circuits(State(state): State<GatewayState>) -> Json<Vec<CircuitStats>> {
    Json(state.breakers.all_stats())
}

/// Handler for `GET /api/v1/inference/engines`
pub async fn get_engines(State(state): State<GatewayState>) -> Json<Vec<DetectedEngine>> {
    Json(state.engines.read().await.clone())
}

/// Handler for `GET /api/v1/inference/models`
pub async fn get_models(State(state): State<GatewayState>) -> Json<Vec<ModelInfo>> {
    let engines = state.engines.read().await;
    let mut models: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for engine in engines.iter() {
        for model in &engine.models {
            let offered_by = models.entry(model.as_str()).or_default();
            if !offered_by.contains(&engine.base_url) {
                offered_by.push(engine.base_url.clone());
            }
        }
    }
    Json(
        models
            .into_iter()
            .map(|(name, engines)| ModelInfo {
                name: name.to_string(),
                engines,
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use fleetgate_core::NodeStatus;
    use fleetgate_discovery::EngineApi;

    use super::*;
    use crate::server::build_router;
    use crate::server::tests::{call, state};

    #[tokio::test]
    async fn health_counts_agents() {
        let (status, body) = call(build_router(state()), "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["agents"], 2);
        assert_eq!(body["members"], 0);
    }

    #[tokio::test]
    async fn status_includes_circuits() {
        let app_state = state();
        app_state.registry.set_status("harold", NodeStatus::Up).await;
        for _ in 0..3 {
            app_state.breakers.get("local").record_failure();
        }
        app_state.breakers.get("cloud");

        let (status, body) = call(build_router(app_state), "GET", "/api/v1/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["agents"]["up"], 1);
        assert_eq!(body["agents"]["total"], 2);
        assert_eq!(body["healthring_enabled"], false);
        let circuits = body["circuits"].as_array().unwrap();
        assert_eq!(circuits[0]["name"], "cloud");
        assert_eq!(circuits[1]["state"], "open");
    }

    fn engine(api: EngineApi, base_url: &str, models: &[&str]) -> DetectedEngine {
        DetectedEngine {
            name: match api {
                EngineApi::Ollama => "ollama".into(),
                EngineApi::OpenAiCompatible => "openai".into(),
            },
            api,
            base_url: base_url.into(),
            models: models.iter().map(|m| m.to_string()).collect(),
            default_model: models.first().map(|m| m.to_string()),
            response_ms: 12,
        }
    }

    #[tokio::test]
    async fn engines_reflect_last_detection() {
        let app_state = state();
        app_state.engines.write().await.push(engine(
            EngineApi::Ollama,
            "http://192.168.1.186:11434",
            &["llama3"],
        ));
        let (status, body) =
            call(build_router(app_state), "GET", "/api/v1/inference/engines").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["api"], "ollama");
        assert_eq!(body[0]["default_model"], "llama3");

        let (_, circuits) = call(build_router(state()), "GET", "/api/v1/circuits").await;
        assert!(circuits.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn models_are_merged_across_engines() {
        let app_state = state();
        {
            let mut engines = app_state.engines.write().await;
            engines.push(engine(
                EngineApi::Ollama,
                "http://192.168.1.186:11434",
                &["llama3", "qwen2.5"],
            ));
            engines.push(engine(
                EngineApi::OpenAiCompatible,
                "http://192.168.1.128:8000",
                &["qwen2.5", "qwen2.5"],
            ));
        }
        let (status, body) =
            call(build_router(app_state), "GET", "/api/v1/inference/models").await;
        assert_eq!(status, StatusCode::OK);
        let models = body.as_array().unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0]["name"], "llama3");
        assert_eq!(models[1]["name"], "qwen2.5");
        assert_eq!(
            models[1]["engines"],
            serde_json::json!(["http://192.168.1.186:11434", "http://192.168.1.128:8000"])
        );
    }
}
