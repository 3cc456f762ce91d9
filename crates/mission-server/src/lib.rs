pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod event_log;
pub mod health;
pub mod sources;
pub mod sse;
pub mod state;
pub mod store;
pub mod ws;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use config::{ConfigError, ServerConfig};
use state::AppState;

pub use sources::spawn_sources;

/// Build the Axum router and application state from a config. Spawns the
/// engine task, so it must run inside a tokio runtime.
pub fn build_app(config: ServerConfig) -> Result<(Router<()>, AppState), ConfigError> {
    let web_root = config.web_root.clone();
    let state = AppState::new(config)?;

    let api_routes = Router::new()
        .route("/state", get(api::get_state))
        .route("/employee-status", get(api::get_state))
        .route("/agents/{name}", get(api::get_agent))
        .route("/agent/{name}", post(api::post_agent))
        .route("/events", get(api::get_events))
        .route("/events/stream", get(sse::event_stream));

    let app = Router::new()
        .route("/health", get(health::health_check))
        .route("/ws", get(ws::ws_handler))
        .nest("/api", api_routes)
        .fallback_service(ServeDir::new(&web_root))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    Ok((app, state))
}
