//! Geometry endpoints: whole-file and single-building fetches

use crate::error::{Result, ServerError};
use crate::geometry;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Query parameters for geometry fetches
#[derive(Deserialize)]
pub struct GeometryQuery {
    /// When set, the response is the single-building extraction instead of
    /// the whole document
    pub building: Option<String>,
}

/// Fetch a geometry file, whole or single-building-extracted
///
/// GET /api/data/file/*path[?building=<id>]
///
/// The path is tried against each known directory layout in order. A
/// missing building yields a 404 with an empty-collection-shaped body (the
/// viewer renders it as "nothing to draw" without special-casing).
pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(query): Query<GeometryQuery>,
) -> Result<Response> {
    let requested = path.trim_start_matches('/');
    let candidates =
        geometry::candidate_paths(&state.config.data_dir, &state.config.nested_root, requested);

    tracing::debug!(
        path = requested,
        candidates = candidates.len(),
        building = query.building.as_deref(),
        "geometry file requested"
    );

    let doc = geometry::load_geometry(&candidates)?;

    let Some(building) = query.building else {
        return Ok(Json(doc).into_response());
    };

    match geometry::extract_building(&doc, &building) {
        Ok(extracted) => Ok(Json(extracted).into_response()),
        Err(ServerError::NotFound(msg)) => {
            tracing::debug!(building, "building absent from geometry document");
            Ok((
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": msg,
                    "type": doc.doc_type,
                    "CityObjects": {},
                    "vertices": [],
                })),
            )
                .into_response())
        }
        Err(e) => Err(e),
    }
}
