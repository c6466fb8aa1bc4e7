//! Observability for Palisade.
//!
//! Structured logging through `tracing`, with JSON output for production
//! and a pretty format for development, plus the standard event names the
//! server emits.
//!
//! # Usage
//!
//! ```ignore
//! use palisade_telemetry::{LogFormat, TelemetryConfig};
//!
//! let config = TelemetryConfig::new()
//!     .with_log_level("info")
//!     .with_log_format(LogFormat::Pretty);
//!
//! palisade_telemetry::init(&config)?;
//! ```

pub mod config;
pub mod logging;

pub use config::{LogFormat, TelemetryConfig};
pub use logging::events;

use thiserror::Error;

/// Telemetry errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize logging.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),

    /// The log level is not a valid filter directive.
    #[error("invalid log filter {0}")]
    InvalidFilter(String),
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    logging::init_logging(config)
}
