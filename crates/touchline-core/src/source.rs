//! Snapshot source trait and an in-memory implementation.
//!
//! The poller pulls the full set of current snapshots from a
//! [`SnapshotSource`] once per tick. Sources do not retry: any failure
//! is reported as a [`SourceError`] and the poller decides when to try
//! again.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use touchline_types::EntitySnapshot;

/// Transient failure reported by a source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The upstream could not be reached or answered with an error status.
    #[error("source unreachable: {message}")]
    Unreachable {
        /// Description of the failure.
        message: String,
    },

    /// The upstream answered but the payload could not be understood.
    #[error("malformed source response: {message}")]
    Malformed {
        /// Description of the failure.
        message: String,
    },

    /// The upstream did not answer within the source's own deadline.
    #[error("source timed out after {timeout_ms}ms")]
    Timeout {
        /// The deadline in milliseconds.
        timeout_ms: u64,
    },
}

/// A provider of entity snapshots.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch every snapshot the source currently knows about.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on any network or parse problem.
    async fn fetch_snapshots(&self) -> Result<Vec<EntitySnapshot>, SourceError>;
}

/// A source that serves whatever snapshots were last handed to it.
///
/// Used for demos and tests, and as a push adapter when another task
/// already receives snapshots.
#[derive(Debug, Default)]
pub struct StaticSource {
    snapshots: Mutex<Vec<EntitySnapshot>>,
}

impl StaticSource {
    /// Create a source serving `snapshots`.
    pub const fn new(snapshots: Vec<EntitySnapshot>) -> Self {
        Self {
            snapshots: Mutex::new(snapshots),
        }
    }

    /// Replace the served snapshots.
    pub fn replace(&self, snapshots: Vec<EntitySnapshot>) {
        *self.snapshots.lock().unwrap_or_else(PoisonError::into_inner) = snapshots;
    }
}

#[async_trait]
impl SnapshotSource for StaticSource {
    async fn fetch_snapshots(&self) -> Result<Vec<EntitySnapshot>, SourceError> {
        Ok(self
            .snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
