//! The poll loop that drives the pipeline.
//!
//! The [`Poller`] is a three-state machine:
//!
//! ```text
//!   Idle ──tick──▶ Polling ──ok──▶ Idle ──poll interval──▶ Polling ...
//!                     │
//!                     └──source error──▶ Backoff ──backoff interval──▶ Idle
//! ```
//!
//! One tick fetches every snapshot from the [`SnapshotSource`], writes
//! live entities to the [`StateStore`] together with a freshly generated
//! artifact, applies the single transition snapshot of entities that
//! left `live`, and finally asks the [`Broadcaster`] to publish each
//! entity that changed. Each entity is published at most once per tick.
//!
//! The loop never stops on error. Only a [`Shutdown`] request ends it,
//! and that request is raced against both the in-flight tick and the
//! wait between ticks.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use touchline_types::{EntityId, EntitySnapshot};
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::config::PipelineConfig;
use crate::generator::{ArtifactGenerator, Hints};
use crate::shutdown::Shutdown;
use crate::source::{SnapshotSource, SourceError};
use crate::store::StateStore;

// ---------------------------------------------------------------------------
// State and status
// ---------------------------------------------------------------------------

/// Where the poll loop currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollerState {
    /// Waiting for the next tick.
    #[default]
    Idle,
    /// A tick is in flight.
    Polling,
    /// The last tick failed; waiting out the backoff interval.
    Backoff,
}

impl fmt::Display for PollerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Polling => f.write_str("polling"),
            Self::Backoff => f.write_str("backoff"),
        }
    }
}

/// Current state plus cumulative counters, published on a watch channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollerStatus {
    /// Current loop state.
    pub state: PollerState,
    /// Ticks attempted, successful or not.
    pub ticks: u64,
    /// Ticks abandoned because the source failed.
    pub failures: u64,
    /// Failures since the last successful tick.
    pub consecutive_failures: u64,
    /// When the last successful tick finished.
    pub last_success: Option<DateTime<Utc>>,
    /// Message of the most recent source failure.
    pub last_error: Option<String>,
}

/// Errors that abandon a whole tick.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The source could not produce snapshots.
    #[error("source error: {source}")]
    Source {
        /// The underlying source error.
        #[from]
        source: SourceError,
    },
}

/// Summary of one successful tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Snapshots returned by the source.
    pub fetched: usize,
    /// Live snapshots written to the store.
    pub live: usize,
    /// Entities whose transition out of `live` was applied.
    pub retired: usize,
    /// Non-live snapshots skipped.
    pub ignored: usize,
    /// Artifacts appended to history.
    pub artifacts_recorded: usize,
    /// Live entities for which generation failed.
    pub generation_failures: usize,
    /// Entities published to subscribers, in id order.
    pub published: Vec<EntityId>,
}

// ---------------------------------------------------------------------------
// Callback
// ---------------------------------------------------------------------------

/// Observer of the poll loop.
pub trait PollCallback: Send {
    /// Called on every state transition.
    fn on_state(&mut self, state: PollerState);

    /// Called after a tick completes.
    fn on_tick(&mut self, report: &TickReport);

    /// Called when a tick is abandoned.
    fn on_failure(&mut self, error: &PollError);
}

/// A callback that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCallback;

impl PollCallback for NoOpCallback {
    fn on_state(&mut self, _state: PollerState) {}
    fn on_tick(&mut self, _report: &TickReport) {}
    fn on_failure(&mut self, _error: &PollError) {}
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// Periodically pulls snapshots and feeds the store and broadcaster.
///
/// The poller is the store's only writer.
pub struct Poller {
    source: Arc<dyn SnapshotSource>,
    generator: Arc<dyn ArtifactGenerator>,
    store: Arc<StateStore>,
    broadcaster: Arc<Broadcaster>,
    config: PipelineConfig,
    status: watch::Sender<PollerStatus>,
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("config", &self.config)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl Poller {
    /// Wire a poller to its collaborators.
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        generator: Arc<dyn ArtifactGenerator>,
        store: Arc<StateStore>,
        broadcaster: Arc<Broadcaster>,
        config: PipelineConfig,
    ) -> Self {
        let (status, _) = watch::channel(PollerStatus::default());
        Self {
            source,
            generator,
            store,
            broadcaster,
            config,
            status,
        }
    }

    /// Current loop state.
    pub fn state(&self) -> PollerState {
        self.status.borrow().state
    }

    /// Copy of the current status.
    pub fn status(&self) -> PollerStatus {
        self.status.borrow().clone()
    }

    /// A receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<PollerStatus> {
        self.status.subscribe()
    }

    /// Run one fetch-process-notify cycle.
    ///
    /// Does not touch the loop state; [`Poller::run`] owns transitions.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::Source`] if the source fails. The store is
    /// left exactly as it was.
    pub async fn tick(&self) -> Result<TickReport, PollError> {
        let tick = self.begin_tick();
        let snapshots = match self.source.fetch_snapshots().await {
            Ok(snapshots) => snapshots,
            Err(source) => {
                let error = PollError::from(source);
                self.record_failure(&error);
                return Err(error);
            }
        };

        let mut report = TickReport {
            tick,
            fetched: snapshots.len(),
            ..TickReport::default()
        };
        let mut changed: BTreeSet<EntityId> = BTreeSet::new();

        for snapshot in snapshots {
            let id = snapshot.id.clone();
            let publishable = if snapshot.status.is_live() {
                self.apply_live(snapshot, &mut report).await
            } else {
                self.apply_non_live(snapshot, &mut report)
            };
            if publishable {
                changed.insert(id);
            }
        }

        for id in &changed {
            let delivered = self.broadcaster.publish(id);
            debug!(tick, entity = %id, delivered, "published");
        }
        report.published = changed.into_iter().collect();

        self.status.send_modify(|status| {
            status.consecutive_failures = 0;
            status.last_success = Some(Utc::now());
            status.last_error = None;
        });
        debug!(
            tick,
            fetched = report.fetched,
            live = report.live,
            retired = report.retired,
            ignored = report.ignored,
            published = report.published.len(),
            "tick complete"
        );
        Ok(report)
    }

    /// Drive ticks until `shutdown` is requested.
    pub async fn run(&self, shutdown: &Shutdown, callback: &mut dyn PollCallback) {
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            backoff_interval_ms = self.config.backoff_interval_ms,
            "poller starting"
        );

        while !shutdown.is_requested() {
            self.transition(PollerState::Polling, callback);

            let outcome = tokio::select! {
                biased;
                () = shutdown.wait() => {
                    info!("shutdown during tick; tick abandoned");
                    break;
                }
                outcome = self.tick() => outcome,
            };

            let (next, wait) = match outcome {
                Ok(report) => {
                    callback.on_tick(&report);
                    (PollerState::Idle, self.config.poll_interval())
                }
                Err(error) => {
                    warn!(
                        error = %error,
                        backoff_ms = self.config.backoff_interval_ms,
                        "tick failed; backing off"
                    );
                    callback.on_failure(&error);
                    (PollerState::Backoff, self.config.backoff_interval())
                }
            };
            self.transition(next, callback);

            if !sleep_or_shutdown(wait, shutdown).await {
                break;
            }
            if next == PollerState::Backoff {
                self.transition(PollerState::Idle, callback);
            }
        }

        self.transition(PollerState::Idle, callback);
        let status = self.status();
        info!(
            ticks = status.ticks,
            failures = status.failures,
            "poller stopped"
        );
    }

    // -----------------------------------------------------------------------
    // Per-entity handling
    // -----------------------------------------------------------------------

    async fn apply_live(&self, snapshot: EntitySnapshot, report: &mut TickReport) -> bool {
        let id = snapshot.id.clone();
        let hints = Hints {
            context: self.config.hints.clone(),
            previous: self.store.latest(&id, 0).and_then(|view| view.latest_artifact),
        };

        let artifact = match self.generator.generate(&snapshot, &hints).await {
            Ok(artifact) => Some(artifact),
            Err(error) => {
                warn!(entity = %id, error = %error, "artifact generation failed");
                report.generation_failures = report.generation_failures.saturating_add(1);
                None
            }
        };

        let change = self.store.apply(snapshot, artifact);
        if change.inserted {
            info!(entity = %id, "tracking new live entity");
        }
        report.live = report.live.saturating_add(1);
        if change.artifact_recorded {
            report.artifacts_recorded = report.artifacts_recorded.saturating_add(1);
        }
        change.is_publishable()
    }

    fn apply_non_live(&self, snapshot: EntitySnapshot, report: &mut TickReport) -> bool {
        let id = snapshot.id.clone();
        match self.store.status(&id) {
            Some(current) if current.is_live() => {
                info!(entity = %id, status = %snapshot.status, "entity left live");
                let change = self.store.apply(snapshot, None);
                report.retired = report.retired.saturating_add(1);
                change.is_publishable()
            }
            _ => {
                report.ignored = report.ignored.saturating_add(1);
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Status bookkeeping
    // -----------------------------------------------------------------------

    fn begin_tick(&self) -> u64 {
        let mut tick = 0;
        self.status.send_modify(|status| {
            status.ticks = status.ticks.saturating_add(1);
            tick = status.ticks;
        });
        tick
    }

    fn record_failure(&self, error: &PollError) {
        self.status.send_modify(|status| {
            status.failures = status.failures.saturating_add(1);
            status.consecutive_failures = status.consecutive_failures.saturating_add(1);
            status.last_error = Some(error.to_string());
        });
    }

    fn transition(&self, next: PollerState, callback: &mut dyn PollCallback) {
        let changed = self.status.send_if_modified(|status| {
            if status.state == next {
                return false;
            }
            status.state = next;
            true
        });
        if changed {
            debug!(state = %next, "poller state");
            callback.on_state(next);
        }
    }
}

/// Returns `false` if shutdown fired first.
async fn sleep_or_shutdown(wait: Duration, shutdown: &Shutdown) -> bool {
    tokio::select! {
        biased;
        () = shutdown.wait() => false,
        () = tokio::time::sleep(wait) => true,
    }
}
