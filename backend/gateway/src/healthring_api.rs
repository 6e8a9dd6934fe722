//! Health ring API.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use fleetgate_healthring::MemberStatus;

use crate::server::{error_response, ApiError, GatewayState};

/// Handler for `GET /healthring/status`. Empty when the ring is disabled.
pub async fn get_status(
    State(state): State<GatewayState>,
) -> Json<BTreeMap<String, MemberStatus>> {
    match &state.health_ring {
        Some(ring) => Json(ring.status().await),
        None => Json(BTreeMap::new()),
    }
}

/// Handler for `GET /healthring/:name`
pub async fn get_member(
    State(state): State<GatewayState>,
    Path(name): Path<String>,
) -> Result<Json<MemberStatus>, ApiError> {
    let member = match &state.health_ring {
        Some(ring) => ring.member(&name).await,
        None => None,
    };
    member
        .map(Json)
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, format!("member not found: {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::server::build_router;
    use crate::server::tests::{call, state};
    use fleetgate_config::{HealthCheckSpec, HealthMemberConfig};
    use fleetgate_healthring::{HealthRing, HealthRingOptions};

    fn ring_state() -> GatewayState {
        let app_state = state();
        let ring = HealthRing::new(
            vec![HealthMemberConfig {
                name: "harold".into(),
                checks: vec![HealthCheckSpec::tcp(22)],
            }],
            Arc::new(app_state.registry.clone()),
            HealthRingOptions {
                tcp_timeout: Duration::from_millis(200),
                ..Default::default()
            },
        );
        app_state.with_health_ring(Arc::new(ring))
    }

    #[tokio::test]
    async fn status_is_a_map_of_members() {
        let (status, body) =
            call(build_router(ring_state()), "GET", "/healthring/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["harold"]["status"], "unknown");
        assert_eq!(body["harold"]["history"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn member_lookup() {
        let app = build_router(ring_state());
        let (status, body) = call(app.clone(), "GET", "/healthring/harold").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "harold");

        let (status, body) = call(app, "GET", "/healthring/pink").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "member not found: pink");
    }

    #[tokio::test]
    async fn disabled_ring_reports_nothing() {
        let app = build_router(state());
        let (status, body) = call(app.clone(), "GET", "/healthring/status").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_object().unwrap().is_empty());
        let (status, _) = call(app, "GET", "/healthring/harold").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
