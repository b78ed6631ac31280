//! Logging setup for the offsync binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the application. Output goes to stderr so it never mixes with command
//! output on stdout.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::OffsyncError;

/// Environment variable holding a filter directive, e.g. `offsync=debug`.
pub const LOG_ENV: &str = "OFFSYNC_LOG";

/// Build the filter: `OFFSYNC_LOG` wins over the configured level.
///
/// # Errors
///
/// Returns an error if the configured level is not a valid directive.
pub fn filter(config: &LoggingConfig) -> Result<EnvFilter, OffsyncError> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| OffsyncError::Logging(format!("Invalid log level '{}': {e}", config.level)))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the level is invalid or a subscriber is already set.
pub fn init(config: &LoggingConfig) -> Result<(), OffsyncError> {
    let env_filter = filter(config)?;
    let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json())
            .try_init()
            .map_err(|e| OffsyncError::Logging(e.to_string()))
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| OffsyncError::Logging(e.to_string()))
    }
}
