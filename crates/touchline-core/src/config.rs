//! Configuration loading and typed config structures for Touchline.
//!
//! The canonical configuration lives in `touchline-config.yaml`. This
//! module defines strongly-typed structs that mirror the YAML structure
//! and a loader that reads, overrides from the environment, and
//! validates the result. Every field has a default, so an empty file
//! (or no file at all) yields a working configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is not usable.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `touchline-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TouchlineConfig {
    /// Poller, history and fan-out settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Scoreboard source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Observer HTTP/WebSocket server settings.
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TouchlineConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override file values (see
    /// [`apply_env_overrides`](Self::apply_env_overrides)), then the
    /// result is validated.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML,
    /// or [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // serde_yml maps an empty document to unit, not to an empty map.
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override selected values with environment variables when set.
    ///
    /// - `SCOREBOARD_URL` overrides `source.url`
    /// - `OBSERVER_HOST` / `OBSERVER_PORT` override `observer.host` / `observer.port`
    /// - `POLL_INTERVAL_MS`, `BACKOFF_INTERVAL_MS`, `HISTORY_CAPACITY`
    ///   override the matching `pipeline` fields
    ///
    /// Numeric variables that do not parse are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SCOREBOARD_URL") {
            self.source.url = val;
        }
        if let Ok(val) = std::env::var("OBSERVER_HOST") {
            self.observer.host = val;
        }
        if let Some(port) = env_number("OBSERVER_PORT") {
            self.observer.port = port;
        }
        if let Some(ms) = env_number("POLL_INTERVAL_MS") {
            self.pipeline.poll_interval_ms = ms;
        }
        if let Some(ms) = env_number("BACKOFF_INTERVAL_MS") {
            self.pipeline.backoff_interval_ms = ms;
        }
        if let Some(capacity) = env_number("HISTORY_CAPACITY") {
            self.pipeline.history_capacity = capacity;
        }
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero interval, or for a
    /// capacity or subscriber buffer outside its accepted range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()
    }
}

fn env_number<T: core::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Largest accepted `pipeline.history_capacity`.
pub const MAX_HISTORY_CAPACITY: usize = 10_000;

/// Largest accepted `pipeline.subscriber_buffer`.
pub const MAX_SUBSCRIBER_BUFFER: usize = 1_024;

/// Pipeline configuration: poll cadence, retention and fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PipelineConfig {
    /// Milliseconds between successful ticks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Milliseconds to wait after a failed tick before returning to idle.
    #[serde(default = "default_backoff_interval_ms")]
    pub backoff_interval_ms: u64,

    /// Artifacts retained per entity.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Deliveries buffered per subscriber before the oldest is dropped.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Static context passed to the generator with every snapshot.
    #[serde(default = "default_hints")]
    pub hints: BTreeMap<String, String>,
}

impl PipelineConfig {
    /// The poll interval as a [`Duration`].
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// The backoff interval as a [`Duration`].
    pub const fn backoff_interval(&self) -> Duration {
        Duration::from_millis(self.backoff_interval_ms)
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let reason = if self.poll_interval_ms == 0 {
            "pipeline.poll_interval_ms must be at least 1".to_owned()
        } else if self.backoff_interval_ms == 0 {
            "pipeline.backoff_interval_ms must be at least 1".to_owned()
        } else if self.history_capacity == 0 {
            "pipeline.history_capacity must be at least 1".to_owned()
        } else if self.history_capacity > MAX_HISTORY_CAPACITY {
            format!("pipeline.history_capacity must be at most {MAX_HISTORY_CAPACITY}")
        } else if self.subscriber_buffer == 0 {
            "pipeline.subscriber_buffer must be at least 1".to_owned()
        } else if self.subscriber_buffer > MAX_SUBSCRIBER_BUFFER {
            format!("pipeline.subscriber_buffer must be at most {MAX_SUBSCRIBER_BUFFER}")
        } else {
            return Ok(());
        };
        Err(ConfigError::Invalid { reason })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            backoff_interval_ms: default_backoff_interval_ms(),
            history_capacity: default_history_capacity(),
            subscriber_buffer: default_subscriber_buffer(),
            hints: default_hints(),
        }
    }
}

/// Scoreboard source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    /// Scoreboard JSON endpoint.
    #[serde(default = "default_source_url")]
    pub url: String,

    /// Per-request timeout in milliseconds (owned by the source).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: default_source_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Observer server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObserverConfig {
    /// Address to bind.
    #[serde(default = "default_observer_host")]
    pub host: String,

    /// TCP port to listen on.
    #[serde(default = "default_observer_port")]
    pub port: u16,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            host: default_observer_host(),
            port: default_observer_port(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

const fn default_poll_interval_ms() -> u64 {
    30_000
}

const fn default_backoff_interval_ms() -> u64 {
    60_000
}

const fn default_history_capacity() -> usize {
    100
}

const fn default_subscriber_buffer() -> usize {
    16
}

fn default_hints() -> BTreeMap<String, String> {
    BTreeMap::from([("formation".to_owned(), "unknown".to_owned())])
}

fn default_source_url() -> String {
    "https://site.api.espn.com/apis/site/v2/sports/football/nfl/scoreboard".to_owned()
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_observer_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_observer_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_owned()
}
