//! Engine binary for the Touchline live-game pipeline.
//!
//! This is the main entry point that wires together the scoreboard
//! source, the prediction generator, the state store, the broadcaster,
//! the poller and the observer API. It runs until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `touchline-config.yaml` (or the path in
//!    `TOUCHLINE_CONFIG`), falling back to defaults if the file is absent
//! 2. Initialize structured logging (tracing)
//! 3. Create the state store and broadcaster
//! 4. Create the scoreboard source and the poller
//! 5. Start the observer API server
//! 6. Install the Ctrl-C handler
//! 7. Run the poll loop until shutdown
//! 8. Wait for the observer to drain

mod error;
mod scoreboard;
mod tick_log;

use std::path::PathBuf;
use std::sync::Arc;

use touchline_core::broadcast::Broadcaster;
use touchline_core::config::{LoggingConfig, TouchlineConfig};
use touchline_core::generator::DownDistanceGenerator;
use touchline_core::poller::Poller;
use touchline_core::shutdown::Shutdown;
use touchline_core::store::StateStore;
use touchline_observer::server::ServerConfig;
use touchline_observer::startup::spawn_observer;
use touchline_observer::state::AppState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::scoreboard::ScoreboardSource;
use crate::tick_log::TickLog;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "touchline-config.yaml";

/// Where the running configuration came from.
enum ConfigOrigin {
    File(PathBuf),
    Defaults(PathBuf),
}

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the observer cannot
/// bind its port, or the HTTP client cannot be built.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, origin) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("touchline-engine starting");
    match &origin {
        ConfigOrigin::File(path) => info!(path = %path.display(), "Configuration loaded"),
        ConfigOrigin::Defaults(path) => {
            warn!(path = %path.display(), "Config file not found, using defaults");
        }
    }
    info!(
        source_url = config.source.url,
        poll_interval_ms = config.pipeline.poll_interval_ms,
        backoff_interval_ms = config.pipeline.backoff_interval_ms,
        history_capacity = config.pipeline.history_capacity,
        "Pipeline configured"
    );

    // 3. State store and broadcaster.
    let store = Arc::new(StateStore::new(config.pipeline.history_capacity).map_err(EngineError::from)?);
    let broadcaster = Arc::new(Broadcaster::new(
        Arc::clone(&store),
        config.pipeline.subscriber_buffer,
    ));

    // 4. Source and poller.
    let source = ScoreboardSource::new(&config.source).map_err(EngineError::from)?;
    let poller = Poller::new(
        Arc::new(source),
        Arc::new(DownDistanceGenerator::new()),
        Arc::clone(&store),
        Arc::clone(&broadcaster),
        config.pipeline.clone(),
    );

    // 5. Observer API server.
    let shutdown = Arc::new(Shutdown::new());
    let app_state = Arc::new(AppState::new(store, broadcaster, poller.watch_status()));
    let observer = spawn_observer(
        &ServerConfig::from(&config.observer),
        app_state,
        Arc::clone(&shutdown),
    )
    .await
    .map_err(EngineError::from)?;

    // 6. Ctrl-C requests shutdown.
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received, shutting down");
                    shutdown.request();
                }
                Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
            }
        });
    }

    // 7. Run the poll loop.
    let mut callback = TickLog::new();
    poller.run(&shutdown, &mut callback).await;

    // 8. Let the observer finish in-flight requests.
    if let Err(e) = observer.await {
        warn!(error = %e, "Observer task did not exit cleanly");
    }

    let status = poller.status();
    info!(
        ticks = status.ticks,
        failures = status.failures,
        "touchline-engine shutdown complete"
    );
    Ok(())
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Load the configuration file named by `TOUCHLINE_CONFIG`, or the
/// default path. A missing file yields defaults plus environment
/// overrides; any other read or parse failure is an error.
fn load_config() -> Result<(TouchlineConfig, ConfigOrigin), EngineError> {
    let path = std::env::var_os("TOUCHLINE_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);

    if path.exists() {
        let config = TouchlineConfig::from_file(&path)?;
        Ok((config, ConfigOrigin::File(path)))
    } else {
        let config = TouchlineConfig::parse("")?;
        Ok((config, ConfigOrigin::Defaults(path)))
    }
}
