//! Swarm API
//!
//! Read-only views of the agent registry.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use fleetgate_discovery::Agent;

use crate::server::{error_response, ApiError, GatewayState};

/// Handler for `GET /agents`
pub async fn list_agents(State(state): State<GatewayState>) -> Json<Vec<Agent>> {
    Json(state.registry.list_agents().await)
}

/// Handler for `GET /agents/:name`
pub async fn get_agent(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
) -> Result<Json<Agent>, ApiError> {
    state
        .registry
        .get_agent(&name)
        .await
        .map(Json)
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, format!("agent not found: {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::build_router;
    use crate::server::tests::{call, state};
    use fleetgate_core::NodeStatus;

    #[tokio::test]
    async fn lists_agents_as_array() {
        let (status, body) = call(build_router(state()), "GET", "/agents").await;
        assert_eq!(status, StatusCode::OK);
        let agents = body.as_array().unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0]["name"], "harold");
        assert_eq!(agents[0]["services"]["bridge"], 18802);
        assert_eq!(agents[0]["status"], "unknown");
    }

    #[tokio::test]
    async fn single_agent_reflects_status() {
        let app_state = state();
        app_state.registry.set_status("pink", NodeStatus::Up).await;
        let (status, body) = call(build_router(app_state), "GET", "/agents/pink").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "up");
        assert!(body["last_seen"].is_string());
    }

    #[tokio::test]
    async fn missing_agent_is_404() {
        let (status, body) = call(build_router(state()), "GET", "/agents/ghost").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "agent not found: ghost");
    }
}
