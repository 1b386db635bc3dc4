//! Shared application state for the observer server.
//!
//! [`AppState`] hands every handler the store it reads from, the
//! broadcaster `WebSocket` connections subscribe through, and a watch
//! receiver mirroring the poller's status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use touchline_core::broadcast::Broadcaster;
use touchline_core::poller::PollerStatus;
use touchline_core::store::StateStore;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The authoritative game table.
    pub store: Arc<StateStore>,
    /// Fan-out registry for `WebSocket` subscribers.
    pub broadcaster: Arc<Broadcaster>,
    /// Latest poller status.
    pub poller: watch::Receiver<PollerStatus>,
    /// When this state was created.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create state backed by a running poller.
    pub fn new(
        store: Arc<StateStore>,
        broadcaster: Arc<Broadcaster>,
        poller: watch::Receiver<PollerStatus>,
    ) -> Self {
        Self {
            store,
            broadcaster,
            poller,
            started_at: Utc::now(),
        }
    }

    /// Create state with no poller attached.
    ///
    /// The reported poller status stays at its default.
    pub fn detached(store: Arc<StateStore>, broadcaster: Arc<Broadcaster>) -> Self {
        let (_, poller) = watch::channel(PollerStatus::default());
        Self::new(store, broadcaster, poller)
    }

    /// Copy of the poller's current status.
    pub fn poller_status(&self) -> PollerStatus {
        self.poller.borrow().clone()
    }
}
