//! Tracing bootstrap for binaries and tests.
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the process entry point through [`init_tracing`].

use crate::{SynapsedError, SynapsedResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Output format of the fmt subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human readable output
    #[default]
    Full,
    /// Single-line output
    Compact,
    /// Newline-delimited JSON
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, used when `RUST_LOG` is not set
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Include the event target (module path)
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Full,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Build the filter, preferring `RUST_LOG` over the configured level
    pub fn env_filter(&self) -> SynapsedResult<EnvFilter> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|e| SynapsedError::config(format!("Invalid log filter '{}': {e}", self.level)))
    }
}

/// Install a global fmt subscriber.
///
/// Returns `Ok` without touching anything when a global subscriber is
/// already in place, so tests and embedding binaries can call it freely.
pub fn init_tracing(config: &LoggingConfig) -> SynapsedResult<()> {
    if tracing::dispatcher::has_been_set() {
        tracing::debug!("global subscriber already installed");
        return Ok(());
    }

    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter()?)
        .with_target(config.with_target);

    let result = match config.format {
        LogFormat::Full => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|e| SynapsedError::config(format!("Failed to install tracing subscriber: {e}")))
}
