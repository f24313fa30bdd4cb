//! Telemetry module for logging setup
//!
//! Unified logging configuration: `RUST_LOG` wins when set, otherwise the
//! configured default level applies. Output is human-readable by default or
//! JSON when `LOG_FORMAT=json`.

use crate::config::ServerConfig;
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Primary log filter (RUST_LOG env var)
    pub log_filter: String,
    /// Fallback log level if RUST_LOG not set
    pub default_level: String,
    /// Log format ("human" or "json")
    pub log_format: LogFormat,
}

impl TelemetryConfig {
    /// Create telemetry config honoring the server's configured log level
    pub fn with_server_config(server_config: &ServerConfig) -> Self {
        Self::from_env_with_defaults(server_config.log_level.clone())
    }

    fn from_env_with_defaults(default_level: String) -> Self {
        Self {
            log_filter: env::var("RUST_LOG").unwrap_or_default(),
            default_level,
            log_format: match env::var("LOG_FORMAT")
                .unwrap_or_default()
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Human,
            },
        }
    }

    fn env_filter(&self) -> EnvFilter {
        if self.log_filter.is_empty() {
            EnvFilter::new(&self.default_level)
        } else {
            EnvFilter::new(&self.log_filter)
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::from_env_with_defaults("info".to_string())
    }
}

/// Initialize global logging.
///
/// Safe to call more than once; subsequent calls are no-ops (relevant for
/// tests sharing a process).
pub fn init_logging(config: &TelemetryConfig) {
    let filter = config.env_filter();

    let result = match config.log_format {
        LogFormat::Human => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("logging already initialized");
    }
}
