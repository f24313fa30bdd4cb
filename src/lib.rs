//! Sager artifact server
//!
//! An HTTP REST API serving precomputed geospatial entity-resolution
//! artifacts: CityJSON-style building geometry, per-building feature
//! vectors, and candidate-match predictions.
//!
//! # Features
//!
//! - Geometry file listing and per-building extraction
//! - Feature-map construction from parquet or legacy nested JSON
//! - Candidate-match lookup with a layered identifier resolver
//! - Two-tier caching (in-process + optional Redis) with TTL
//! - Background job dispatch for expensive artifact builds
//! - CORS support for browser-based viewers
//!
//! # Example
//!
//! ```ignore
//! use sager_server::{SagerServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let server = SagerServer::new(config).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod features;
pub mod geometry;
pub mod ident;
pub mod jobs;
pub mod predictions;
pub mod resolve;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use state::AppState;
pub use telemetry::{init_logging, TelemetryConfig};

use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Sager HTTP server
pub struct SagerServer {
    /// Application state
    state: Arc<AppState>,
    /// Configured router
    router: Router,
}

impl SagerServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Result<Self> {
        let telemetry_config = TelemetryConfig::with_server_config(&config);
        let state = Arc::new(AppState::new(config, telemetry_config)?);
        let router = routes::build_router(state.clone());

        Ok(Self { state, router })
    }

    /// Get a reference to the application state
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Get the router for testing
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server
    pub async fn run(self) -> std::result::Result<(), std::io::Error> {
        let addr = self.state.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;

        info!(
            addr = %addr,
            data_dir = %self.state.config.data_dir.display(),
            cache_mode = self.state.config.cache_mode_str(),
            "Sager server starting"
        );

        axum::serve(listener, self.router).await
    }
}

/// Builder for SagerServer with fluent API
pub struct SagerServerBuilder {
    config: ServerConfig,
}

impl SagerServerBuilder {
    /// Create a new builder with default config (local-only cache)
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<std::net::SocketAddr>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the data directory holding raw geometry files
    pub fn data_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    /// Set the results directory holding precomputed artifacts
    pub fn results_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.config.results_dir = dir.into();
        self
    }

    /// Configure a Redis URL for the distributed cache tier
    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.config.redis_url = Some(url.into());
        self
    }

    /// Set the distributed cache entry TTL in seconds
    pub fn cache_ttl_seconds(mut self, secs: u64) -> Self {
        self.config.cache_ttl_seconds = secs;
        self
    }

    /// Enable or disable CORS
    pub fn cors_enabled(mut self, enabled: bool) -> Self {
        self.config.cors_enabled = enabled;
        self
    }

    /// Build the server
    pub fn build(self) -> Result<SagerServer> {
        SagerServer::new(self.config)
    }
}

impl Default for SagerServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
