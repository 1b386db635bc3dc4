//! Axum router construction for the observer API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS and request tracing enabled.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the observer server.
///
/// The router includes:
/// - `GET /` -- service banner
/// - `GET /api/status` -- poller status and counts
/// - `GET /api/games` -- tracked games
/// - `GET /api/games/live` -- live games
/// - `GET /api/games/{id}` -- single game
/// - `GET /api/games/{id}/predictions` -- prediction history
/// - `GET /ws/games/{id}` -- `WebSocket` delivery stream
///
/// CORS allows any origin so browser dashboards on other hosts can read
/// the API.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::index))
        .route("/api/status", get(handlers::status))
        .route("/api/games", get(handlers::list_games))
        .route("/api/games/live", get(handlers::live_games))
        .route("/api/games/{id}", get(handlers::get_game))
        .route("/api/games/{id}/predictions", get(handlers::get_predictions))
        .route("/ws/games/{id}", get(ws::ws_game))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
