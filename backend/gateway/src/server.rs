//! Main HTTP Gateway Server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    handler::Handler,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, MethodRouter},
    Json, Router,
};
use chrono::{DateTime, Utc};
use fleetgate_discovery::{AgentRegistry, DetectedEngine};
use fleetgate_healthring::HealthRing;
use fleetgate_routing::CircuitBreakerRegistry;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, instrument};

use crate::{health_api, healthring_api, swarm_api};

/// Application state shared across routes.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: AgentRegistry,
    /// `None` when the health ring is disabled.
    pub health_ring: Option<Arc<HealthRing>>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub engines: Arc<RwLock<Vec<DetectedEngine>>>,
    pub started_at: DateTime<Utc>,
}

impl GatewayState {
    pub fn new(registry: AgentRegistry, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self {
            registry,
            health_ring: None,
            breakers,
            engines: Arc::new(RwLock::new(Vec::new())),
            started_at: Utc::now(),
        }
    }

    pub fn with_health_ring(mut self, ring: Arc<HealthRing>) -> Self {
        self.health_ring = Some(ring);
        self
    }
}

pub type ApiError = (StatusCode, Json<Value>);

/// JSON error body with the given status.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

async fn method_not_allowed() -> impl IntoResponse {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

async fn not_found() -> impl IntoResponse {
    error_response(StatusCode::NOT_FOUND, "no such route")
}

/// GET route whose other methods answer 405 with a JSON body.
fn get_only<H, T>(handler: H) -> MethodRouter<GatewayState>
where
    H: Handler<T, GatewayState>,
    T: 'static,
{
    get(handler).fallback(method_not_allowed)
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get_only(health_api::get_health))
        .route("/agents", get_only(swarm_api::list_agents))
        .route("/agents/:name", get_only(swarm_api::get_agent))
        .route("/healthring/status", get_only(healthring_api::get_status))
        .route("/healthring/:name", get_only(healthring_api::get_member))
        .route("/api/v1/swarm/agents", get_only(swarm_api::list_agents))
        .route("/api/v1/swarm/agents/:name", get_only(swarm_api::get_agent))
        .route("/api/v1/healthring/status", get_only(healthring_api::get_status))
        .route("/api/v1/healthring/:name", get_only(healthring_api::get_member))
        .route("/api/v1/status", get_only(health_api::get_status))
        .route("/api/v1/circuits", get_only(health_api::get_circuits))
        .route("/api/v1/inference/engines", get_only(health_api::get_engines))
        .route("/api/v1/inference/models", get_only(health_api::get_models))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
#[instrument(skip(state, shutdown))]
pub async fn start_server<F>(addr: SocketAddr, state: GatewayState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind gateway to {addr}"))?;

    info!("Gateway HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Gateway server error")?;
    info!("Gateway HTTP server stopped");
    Ok(())
}
