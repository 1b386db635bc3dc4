//! Poll callback that logs the pipeline's progress.

use touchline_core::poller::{PollCallback, PollError, PollerState, TickReport};
use tracing::{debug, info, warn};

/// Logs each tick report and every failure.
///
/// Quiet ticks (nothing fetched, nothing published) are logged at
/// debug level so an off-season deployment does not flood the log.
#[derive(Debug, Default)]
pub struct TickLog {
    quiet_ticks: u64,
}

impl TickLog {
    /// Create the callback.
    pub const fn new() -> Self {
        Self { quiet_ticks: 0 }
    }
}

impl PollCallback for TickLog {
    fn on_state(&mut self, state: PollerState) {
        debug!(%state, "poller transition");
    }

    fn on_tick(&mut self, report: &TickReport) {
        if report.live == 0 && report.published.is_empty() {
            self.quiet_ticks = self.quiet_ticks.saturating_add(1);
            debug!(
                tick = report.tick,
                fetched = report.fetched,
                quiet_ticks = self.quiet_ticks,
                "no live games"
            );
            return;
        }
        self.quiet_ticks = 0;
        info!(
            tick = report.tick,
            fetched = report.fetched,
            live = report.live,
            retired = report.retired,
            predictions = report.artifacts_recorded,
            generation_failures = report.generation_failures,
            published = report.published.len(),
            "tick complete"
        );
    }

    fn on_failure(&mut self, error: &PollError) {
        warn!(error = %error, "tick abandoned");
    }
}
