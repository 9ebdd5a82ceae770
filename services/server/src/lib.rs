pub mod auth;
pub mod batcher;
pub mod db;
pub mod http;
pub mod hub;
pub mod repo;
pub mod state;
pub mod telemetry;
pub mod ws;

pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Wires the chat hub's full HTTP + WebSocket surface (spec §6).
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(http::health::root))
        .route("/ping", get(http::health::ping))
        .route("/auth/token", post(http::auth::issue_token))
        .route("/create_account", post(http::auth::create_account))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
