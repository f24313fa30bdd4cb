//! Admin endpoints: /health, /api/stats

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    tracing::debug!("health check requested");
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Server statistics response
#[derive(Serialize)]
pub struct StatsResponse {
    /// Server uptime in seconds
    pub uptime_secs: u64,
    /// Cache topology ("local-only" or "local+distributed")
    pub cache_mode: &'static str,
    /// Entries currently held in the local cache tier
    pub local_cache_entries: usize,
    /// Jobs submitted since start
    pub jobs_total: usize,
    /// Jobs not yet in a terminal state
    pub jobs_active: usize,
    /// Server version
    pub version: &'static str,
}

/// Server statistics endpoint
///
/// GET /api/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    tracing::debug!("server stats requested");
    Json(StatsResponse {
        uptime_secs: state.uptime_secs(),
        cache_mode: state.config.cache_mode_str(),
        local_cache_entries: state.cache.local_len(),
        jobs_total: state.jobs.len(),
        jobs_active: state.jobs.active(),
        version: env!("CARGO_PKG_VERSION"),
    })
}
