//! Observer server startup helper for embedding in the engine.
//!
//! Provides [`spawn_observer`] which binds the port and launches the
//! observer HTTP + `WebSocket` server on a background Tokio task, so
//! the engine can run it alongside the poll loop.
//!
//! # Usage
//!
//! ```rust,ignore
//! use touchline_observer::startup::spawn_observer;
//!
//! let handle = spawn_observer(&config, state, Arc::clone(&shutdown)).await?;
//! // ... run the poller ...
//! shutdown.request();
//! handle.await?;
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use touchline_core::shutdown::Shutdown;

use crate::server::{self, ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the observer server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Spawn the observer HTTP server on a background Tokio task.
///
/// The port is bound before the task is spawned so that an address
/// already in use is reported to the caller rather than logged from the
/// background. The task ends once `shutdown` fires and in-flight
/// requests have completed.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the server cannot bind to the
/// requested address.
pub async fn spawn_observer(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: Arc<Shutdown>,
) -> Result<JoinHandle<()>, StartupError> {
    let listener = server::bind(config).await?;

    let handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state, shutdown).await {
            tracing::error!(error = %e, "Observer server exited with error");
        }
    });

    tracing::info!(host = %config.host, port = config.port, "Observer server spawned on background task");

    Ok(handle)
}
