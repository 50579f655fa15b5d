//! Health endpoints: a liveness check and an upstream agent probe.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use super::AppState;

/// Health response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthView {
    /// "ok" or "degraded".
    pub status: &'static str,
    /// Failure detail when degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Creates the health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/agent", get(agent_health))
}

/// GET /api/health - process liveness.
async fn health() -> Json<HealthView> {
    Json(HealthView {
        status: "ok",
        error: None,
    })
}

/// GET /api/health/agent - upstream agent reachability.
async fn agent_health(State(state): State<AppState>) -> Json<HealthView> {
    match state.agent.probe().await {
        Ok(()) => Json(HealthView {
            status: "ok",
            error: None,
        }),
        Err(error) => Json(HealthView {
            status: "degraded",
            error: Some(error.to_string()),
        }),
    }
}
