//! Cooperative shutdown signal shared by the poller and the server.
//!
//! The flag is an [`AtomicBool`] so hot-path checks never take a lock;
//! waiters park on a [`Notify`] and are all woken when shutdown is
//! requested.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// One-shot shutdown request, typically held in an `Arc`.
#[derive(Debug, Default)]
pub struct Shutdown {
    requested: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    /// Create a signal that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake every waiter. Idempotent.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Whether shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Wait until shutdown is requested.
    ///
    /// Returns immediately if it already has been.
    pub async fn wait(&self) {
        loop {
            // Register before checking the flag so a request racing with
            // this call cannot be missed.
            let notified = self.notify.notified();
            if self.is_requested() {
                return;
            }
            notified.await;
        }
    }
}
