//! Sager server CLI
//!
//! Run with: `cargo run -- --help`

use clap::Parser;
use sager_server::{
    telemetry::{init_logging, TelemetryConfig},
    SagerServer, ServerConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::parse();

    let telemetry_config = TelemetryConfig::with_server_config(&config);
    init_logging(&telemetry_config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.listen_addr,
        data_dir = %config.data_dir.display(),
        results_dir = %config.results_dir.display(),
        cache_mode = config.cache_mode_str(),
        cache_ttl_seconds = config.cache_ttl_seconds,
        cors = config.cors_enabled,
        log_format = ?telemetry_config.log_format,
        "Starting Sager server"
    );

    let server = SagerServer::new(config)?;
    server.run().await.map_err(Into::into)
}
