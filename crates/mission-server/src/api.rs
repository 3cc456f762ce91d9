use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};

use mission_core::agent::{Agent, AgentPatch};
use mission_core::events::ActivityEvent;
use mission_core::messages::StateSnapshot;

use crate::error::AppError;
use crate::state::AppState;

/// Default page size for `GET /api/events`.
pub const DEFAULT_EVENTS_LIMIT: usize = 50;

/// GET /api/state (and /api/employee-status): every agent plus recent events.
pub async fn get_state(State(state): State<AppState>) -> Result<Json<StateSnapshot>, AppError> {
    Ok(Json(state.engine.snapshot().await?))
}

/// GET /api/agents/{name}
pub async fn get_agent(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Agent>, AppError> {
    state
        .engine
        .agent(name.clone())
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Agent {name} not found")))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

/// GET /api/events?limit=N: newest first, capped at the log bound.
pub async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<ActivityEvent>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENTS_LIMIT)
        .min(state.engine.event_capacity());
    Ok(Json(state.engine.recent(limit).await?))
}

#[derive(Debug, Serialize)]
pub struct OverrideResponse {
    pub ok: bool,
    pub agent: Agent,
}

/// POST /api/agent/{name}: operator override of status, task or model.
pub async fn post_agent(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<AgentPatch>, JsonRejection>,
) -> Result<Json<OverrideResponse>, AppError> {
    let Json(patch) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    patch.validate(state.config.limits.max_field_len)?;
    if !state.roster.contains(&name) {
        return Err(AppError::NotFound(format!("Agent {name} not found")));
    }
    let agent = state.engine.manual_override(name, patch).await??;
    Ok(Json(OverrideResponse { ok: true, agent }))
}
