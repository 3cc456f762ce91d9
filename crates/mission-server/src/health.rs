use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub status: &'static str,
    pub version: &'static str,
    pub agents: usize,
    pub events: usize,
    pub connections: ConnectionInfo,
}

#[derive(Serialize)]
pub struct ConnectionInfo {
    pub websocket: usize,
    pub sse: usize,
}

/// GET /health: liveness plus a few counters. Answers 503 once the engine
/// task is gone.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let stats = state.engine.stats().await?;
    Ok(Json(HealthResponse {
        ok: true,
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        agents: stats.agents,
        events: stats.events,
        connections: ConnectionInfo {
            websocket: state.ws_connection_count.load(Ordering::Relaxed),
            sse: state.sse_subscriber_count.load(Ordering::Relaxed),
        },
    }))
}
