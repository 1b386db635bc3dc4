//! HTTP and `WebSocket` transport for the Touchline pipeline.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws/games/{id}`) that pushes a JSON
//!   [`Delivery`] every time the poller publishes a change to that game
//! - **REST endpoints** for reading tracked games, their latest
//!   prediction, and their prediction history
//! - **Status endpoints** (`GET /`, `GET /api/status`) reporting the
//!   poller state and counters
//!
//! # Architecture
//!
//! Handlers read straight from the shared [`StateStore`]; the store's
//! lock is never held across an await, so a slow client never blocks
//! the poller. Each `WebSocket` connection owns one [`Subscription`]
//! and unsubscribes when the connection ends.
//!
//! [`Delivery`]: touchline_types::Delivery
//! [`StateStore`]: touchline_core::store::StateStore
//! [`Subscription`]: touchline_core::broadcast::Subscription

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{start_server, ServerConfig, ServerError};
pub use state::AppState;
