//! HTTP route definitions

use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::app::AppState;
use crate::config::ServerMode;
use crate::server::{TickStats, TickStatsSnapshot};
use crate::util::time::uptime_secs;

/// What the health endpoint reads from
#[derive(Clone)]
pub struct HealthState {
    pub app: AppState,
    pub mode: ServerMode,
    pub ticks: Option<Arc<TickStats>>,
}

/// Build the application router
pub fn build_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    mode: String,
    uptime_secs: u64,
    connections: usize,
    rooms: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    ticks: Option<TickStatsSnapshot>,
    failures_reported: u64,
}

async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        mode: state.mode.to_string(),
        uptime_secs: uptime_secs(),
        connections: state.app.registry.len(),
        rooms: state.app.registry.room_count(),
        ticks: state.ticks.as_ref().map(|stats| stats.snapshot()),
        failures_reported: state.app.failures.reported(),
    })
}
