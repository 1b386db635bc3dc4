//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup.

use touchline_core::config::ConfigError;
use touchline_core::history::HistoryError;
use touchline_observer::startup::StartupError;

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The state store could not be created.
    #[error("store error: {source}")]
    Store {
        /// The underlying history error.
        #[from]
        source: HistoryError,
    },

    /// The scoreboard HTTP client could not be built.
    #[error("source error: {source}")]
    Source {
        /// The underlying client error.
        #[from]
        source: reqwest::Error,
    },

    /// Observer API server failed to start.
    #[error("observer error: {source}")]
    Observer {
        /// The underlying startup error.
        #[from]
        source: StartupError,
    },
}
