use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::routes::AppState;
use crate::VERSION;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_sessions: usize,
}

/// GET /health, unauthenticated liveness check
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: VERSION,
        active_sessions: state.sessions.total_sessions(),
    })
}
