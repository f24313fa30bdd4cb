//! HTTP route handlers and router configuration

mod admin;
mod files;
mod features;
mod geometry;
mod jobs;
mod predictions;

use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the main application router
pub fn build_router(state: Arc<AppState>) -> Router {
    let router = Router::new()
        // Health check
        .route("/health", get(admin::health))
        .route("/api/stats", get(admin::stats))
        // Geometry data
        .route("/api/data/files", get(files::list_files))
        .route("/api/data/file/*path", get(geometry::get_file))
        // Feature artifact
        .route("/api/features/compute", post(features::compute))
        .route(
            "/api/building/features/:building_id",
            get(features::building_features),
        )
        // Prediction artifact
        .route("/api/predictions/load", post(predictions::load))
        .route(
            "/api/building/matches/:building_id",
            get(predictions::building_matches),
        )
        .route("/api/buildings/status", get(predictions::buildings_status))
        .route(
            "/api/classifier/metrics/:file_name",
            get(predictions::file_metrics),
        )
        // Background jobs
        .route("/api/jobs/:job_id", get(jobs::poll));

    let mut router = router.with_state(state.clone());

    router = router.layer(TraceLayer::new_for_http());

    if state.config.cors_enabled {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}
