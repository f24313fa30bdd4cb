//! Server configuration

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Relative location of the flat feature table under the data directory
pub const FEATURES_PARQUET_REL: &str = "property_dicts/features.parquet";

/// Relative location of the legacy nested feature document
pub const FEATURES_LEGACY_REL: &str = "property_dicts/features_legacy.json";

/// Relative location of the prediction results under the results directory
pub const PREDICTIONS_REL: &str = "demo_inference/demo_detailed_results.json";

/// Server configuration (CLI + environment)
#[derive(Parser, Debug, Clone)]
#[command(name = "sager-server")]
#[command(about = "HTTP API for 3D geospatial entity-resolution artifacts")]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "SAGER_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,

    /// Root directory holding raw geometry data
    #[arg(long, env = "SAGER_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Root directory holding pipeline result artifacts
    #[arg(long, env = "SAGER_RESULTS_DIR", default_value = "results_demo")]
    pub results_dir: PathBuf,

    /// Nested source-data root under the data directory
    #[arg(
        long,
        env = "SAGER_NESTED_ROOT",
        default_value = "RawCitiesData/The Hague"
    )]
    pub nested_root: String,

    /// Redis URL for the distributed cache tier. When unset the server runs
    /// with a local-only cache and computes artifacts synchronously.
    #[arg(long, env = "SAGER_REDIS_URL")]
    pub redis_url: Option<String>,

    /// TTL in seconds for distributed cache entries
    #[arg(long, env = "SAGER_CACHE_TTL_SECONDS", default_value = "21600")]
    pub cache_ttl_seconds: u64,

    /// Override path to the prediction results document
    #[arg(long, env = "SAGER_PREDICTIONS_FILE")]
    pub predictions_file: Option<PathBuf>,

    /// Enable CORS (permissive; the viewer is served from another origin)
    #[arg(long, env = "SAGER_CORS_ENABLED", default_value = "true")]
    pub cors_enabled: bool,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "SAGER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl ServerConfig {
    /// Validate configuration at startup
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_ttl_seconds == 0 {
            return Err("cache_ttl_seconds must be greater than zero".to_string());
        }
        if self.nested_root.trim().is_empty() {
            return Err("nested_root must not be empty".to_string());
        }
        Ok(())
    }

    /// Path to the flat feature table
    pub fn features_parquet_path(&self) -> PathBuf {
        self.data_dir.join(FEATURES_PARQUET_REL)
    }

    /// Path to the legacy nested feature document
    pub fn features_legacy_path(&self) -> PathBuf {
        self.data_dir.join(FEATURES_LEGACY_REL)
    }

    /// Path to the prediction results document
    pub fn predictions_path(&self) -> PathBuf {
        self.predictions_file
            .clone()
            .unwrap_or_else(|| self.results_dir.join(PREDICTIONS_REL))
    }

    /// Short description of the cache topology (for logs/stats)
    pub fn cache_mode_str(&self) -> &'static str {
        if self.redis_url.is_some() {
            "local+distributed"
        } else {
            "local-only"
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".parse().expect("valid default addr"),
            data_dir: PathBuf::from("data"),
            results_dir: PathBuf::from("results_demo"),
            nested_root: "RawCitiesData/The Hague".to_string(),
            redis_url: None,
            cache_ttl_seconds: 21_600,
            predictions_file: None,
            cors_enabled: true,
            log_level: "info".to_string(),
        }
    }
}
