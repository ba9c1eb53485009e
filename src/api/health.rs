//! Health check endpoints

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use super::ApiState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Readiness response
#[derive(Serialize)]
pub struct ReadinessResponse {
    /// "ok", or "degraded" when some plugin failed to register
    pub status: &'static str,
    pub plugins: PluginCounts,
}

#[derive(Serialize)]
pub struct PluginCounts {
    pub active: usize,
    pub total: usize,
    pub failed: usize,
}

/// Liveness probe - is the service running?
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness probe - are plugins loaded?
async fn ready(State(state): State<Arc<ApiState>>) -> Json<ReadinessResponse> {
    let (active, total) = state.registry.counts().await;
    let failed = state.registry.failed().await;
    let status = if failed == 0 { "ok" } else { "degraded" };
    Json(ReadinessResponse {
        status,
        plugins: PluginCounts {
            active,
            total,
            failed,
        },
    })
}

/// Build health router (liveness only, no state needed)
pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

/// Build readiness router (needs state for checks)
pub fn ready_router(state: Arc<ApiState>) -> Router {
    Router::new().route("/ready", get(ready)).with_state(state)
}
