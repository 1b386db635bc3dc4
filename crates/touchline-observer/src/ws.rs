//! `WebSocket` handler pushing per-game deliveries.
//!
//! Clients connect to `GET /ws/games/{id}?history=N` and receive the
//! game's current state straight away (if it is tracked), then a
//! JSON-encoded [`Delivery`] each time the poller publishes a change.
//! `history` asks for the last `N` predictions in every message and is
//! clamped to the store's history capacity.
//!
//! A client that falls behind skips the oldest queued deliveries; it
//! never slows the poller or other clients. The subscription is
//! removed as soon as the client disconnects or a send fails.
//!
//! [`Delivery`]: touchline_types::Delivery

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use touchline_types::{Delivery, EntityId};
use tracing::{debug, warn};

use crate::error::ObserverError;
use crate::handlers::parse_id;
use crate::state::AppState;

/// Query parameters for the `WebSocket` endpoint.
#[derive(Debug, Default, serde::Deserialize)]
pub struct WsQuery {
    /// Number of recent predictions to include in each delivery.
    pub history: Option<usize>,
}

/// Upgrade an HTTP request to a `WebSocket` streaming one game.
///
/// # Route
///
/// `GET /ws/games/{id}`
pub async fn ws_game(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
    Query(params): Query<WsQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let id = parse_id(&raw)?;
    let history_tail = history_tail(&params, state.store.history_capacity());
    Ok(ws.on_upgrade(move |socket| handle_ws(socket, state, id, history_tail)))
}

/// Requested history length, clamped to what the store can hold.
fn history_tail(params: &WsQuery, capacity: usize) -> usize {
    params.history.unwrap_or(0).min(capacity)
}

/// Handle the `WebSocket` lifecycle: subscribe, greet with the current
/// state, forward deliveries until either side closes, unsubscribe.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, id: EntityId, history_tail: usize) {
    let mut subscription = state.broadcaster.subscribe_with(id.clone(), history_tail);
    debug!(entity = %id, subscription = %subscription.id(), "WebSocket client connected");

    let greeted = match state.broadcaster.current(&id, history_tail) {
        Some(initial) => send_delivery(&mut socket, &initial).await,
        None => true,
    };

    if greeted {
        loop {
            tokio::select! {
                delivery = subscription.recv() => {
                    let Some(delivery) = delivery else {
                        debug!(entity = %id, "subscription closed");
                        break;
                    };
                    if !send_delivery(&mut socket, &delivery).await {
                        break;
                    }
                }
                msg = socket.recv() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(entity = %id, "WebSocket client disconnected");
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if socket.send(Message::Pong(data)).await.is_err() {
                                debug!(entity = %id, "WebSocket client disconnected (pong failed)");
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            debug!(entity = %id, "WebSocket error: {e}");
                            break;
                        }
                        // Clients have nothing to say on this channel.
                        _ => {}
                    }
                }
            }
        }
    }

    state.broadcaster.unsubscribe(&subscription);
}

/// Returns `false` if the client is gone.
async fn send_delivery(socket: &mut WebSocket, delivery: &Delivery) -> bool {
    let json = match serde_json::to_string(delivery) {
        Ok(j) => j,
        Err(e) => {
            // Skip this delivery; the next one may still serialize.
            warn!(entity = %delivery.entity_id, "Failed to serialize delivery: {e}");
            return true;
        }
    };
    if socket.send(Message::Text(json.into())).await.is_err() {
        debug!(entity = %delivery.entity_id, "WebSocket client disconnected (send failed)");
        return false;
    }
    true
}
