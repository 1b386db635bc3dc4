//! REST API endpoint handlers for the observer server.
//!
//! All handlers read from the shared [`StateStore`] via [`AppState`].
//! Prediction lists are always ordered oldest first.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Service banner with poller state |
//! | `GET` | `/api/status` | Poller status and counts |
//! | `GET` | `/api/games` | All tracked games (`?status=`) |
//! | `GET` | `/api/games/live` | Live games with latest prediction |
//! | `GET` | `/api/games/{id}` | One game with latest prediction |
//! | `GET` | `/api/games/{id}/predictions` | Prediction history (`?limit=`) |
//!
//! [`StateStore`]: touchline_core::store::StateStore

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use touchline_types::{EntityId, EntityStatus};

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

/// Query parameters for `GET /api/games`.
#[derive(Debug, serde::Deserialize)]
pub struct GamesQuery {
    /// Only games in this status (`scheduled`, `live`, `finished`, `cancelled`).
    pub status: Option<String>,
}

/// Query parameters for `GET /api/games/{id}/predictions`.
#[derive(Debug, serde::Deserialize)]
pub struct PredictionsQuery {
    /// Return only the most recent `limit` predictions.
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// GET / and GET /api/status
// ---------------------------------------------------------------------------

/// Service banner.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "touchline",
        "version": env!("CARGO_PKG_VERSION"),
        "poller": state.poller_status().state,
        "games": state.store.len(),
        "endpoints": [
            "/api/status",
            "/api/games",
            "/api/games/live",
            "/api/games/{id}",
            "/api/games/{id}/predictions",
            "/ws/games/{id}",
        ],
    }))
}

/// Poller status, store size and subscriber count.
pub async fn status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ObserverError> {
    let uptime = Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds()
        .max(0);

    Ok(Json(serde_json::json!({
        "poller": serde_json::to_value(state.poller_status())?,
        "games": state.store.len(),
        "live_games": state.store.list_active().len(),
        "subscribers": state.broadcaster.total_subscribers(),
        "history_capacity": state.store.history_capacity(),
        "uptime_seconds": uptime,
    })))
}

// ---------------------------------------------------------------------------
// Games
// ---------------------------------------------------------------------------

/// List every tracked game, optionally filtered by status.
pub async fn list_games(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GamesQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let filter = params
        .status
        .as_deref()
        .map(str::parse::<EntityStatus>)
        .transpose()
        .map_err(|e| ObserverError::InvalidQuery(format!("status: {e}")))?;

    let games: Vec<serde_json::Value> = state
        .store
        .list()
        .iter()
        .filter_map(|id| game_summary(&state, id))
        .filter(|game| {
            filter.is_none_or(|wanted| game["status"].as_str() == Some(wanted.as_str()))
        })
        .collect();

    Ok(Json(serde_json::json!({
        "count": games.len(),
        "games": games,
    })))
}

/// List live games with their latest prediction.
pub async fn live_games(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let games: Vec<serde_json::Value> = state
        .store
        .list_active()
        .iter()
        .filter_map(|id| game_summary(&state, id))
        .collect();

    Json(serde_json::json!({
        "count": games.len(),
        "games": games,
    }))
}

/// One game's snapshot and latest prediction.
pub async fn get_game(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let id = parse_id(&raw)?;
    game_summary(&state, &id)
        .map(Json)
        .ok_or_else(|| ObserverError::NotFound(format!("game {id}")))
}

/// A game's prediction history, oldest first.
pub async fn get_predictions(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
    Query(params): Query<PredictionsQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let id = parse_id(&raw)?;
    if params.limit == Some(0) {
        return Err(ObserverError::InvalidQuery("limit must be at least 1".to_owned()));
    }

    let predictions = state
        .store
        .history(&id, params.limit)
        .ok_or_else(|| ObserverError::NotFound(format!("game {id}")))?;

    Ok(Json(serde_json::json!({
        "id": id,
        "count": predictions.len(),
        "predictions": predictions,
    })))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn game_summary(state: &AppState, id: &EntityId) -> Option<serde_json::Value> {
    let view = state.store.latest(id, 0)?;
    Some(serde_json::json!({
        "id": id,
        "status": view.snapshot.status,
        "fields": view.snapshot.fields,
        "observed_at": view.snapshot.observed_at,
        "latest_prediction": view.latest_artifact,
    }))
}

/// Parse a game id from a path segment.
pub(crate) fn parse_id(raw: &str) -> Result<EntityId, ObserverError> {
    EntityId::parse(raw).ok_or_else(|| ObserverError::InvalidId(raw.to_owned()))
}
