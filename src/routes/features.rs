//! Feature endpoints: trigger computation, fetch per-building features

use crate::cache::CacheKey;
use crate::error::{Result, ServerError};
use crate::features::FeatureValue;
use crate::resolve;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Request body for feature computation
#[derive(Deserialize)]
pub struct ComputeRequest {
    /// Geometry file the features were computed for; becomes the cache
    /// key parameter
    pub file_path: Option<String>,
}

/// Trigger feature-map construction
///
/// POST /api/features/compute
///
/// With a distributed cache tier configured the build is dispatched as a
/// background job and a 202 with the job id is returned; otherwise the
/// build runs synchronously in-request.
pub async fn compute(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ComputeRequest>,
) -> Result<Response> {
    let Some(file_path) = request.file_path else {
        return Err(ServerError::bad_request("missing required field: file_path"));
    };

    let cache_key = CacheKey::features(&file_path).render();

    if state.cache.has_remote() {
        let job_state = state.clone();
        let job_param = file_path.clone();
        let job_key = cache_key.clone();
        let job_id = state.jobs.submit("calculate_features", async move {
            let map = job_state.feature_map(&job_param).await?;
            Ok(json!({
                "cache_key": job_key,
                "building_count": map.len(),
            }))
        });

        tracing::info!(job_id = %job_id, file = file_path, "feature computation dispatched");
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "job_id": job_id.to_string(), "status": "queued" })),
        )
            .into_response());
    }

    // No distributed tier: compute synchronously
    let map = state.feature_map(&file_path).await?;
    tracing::info!(file = file_path, buildings = map.len(), "features computed synchronously");
    Ok(Json(json!({
        "cache_key": cache_key,
        "building_count": map.len(),
    }))
    .into_response())
}

/// Query parameters for per-building feature lookup
#[derive(Deserialize)]
pub struct FeaturesQuery {
    /// Cache key parameter; defaults to the most recently computed one
    pub file: Option<String>,
}

/// Per-building feature response
#[derive(Serialize)]
pub struct BuildingFeaturesResponse {
    pub building_id: String,
    /// Artifact key the resolver matched, when it differs from the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_key: Option<String>,
    pub features: BTreeMap<String, FeatureValue>,
}

/// Fetch a building's feature vector
///
/// GET /api/building/features/:building_id[?file=<path>]
///
/// Unknown buildings and an absent feature artifact both answer 404 with an
/// empty features collection rather than a bare error.
pub async fn building_features(
    State(state): State<Arc<AppState>>,
    Path(building_id): Path<String>,
    Query(query): Query<FeaturesQuery>,
) -> Result<Response> {
    let param = state.features_param(query.file.as_deref());

    let map = match state.feature_map(&param).await {
        Ok(map) => map,
        Err(ServerError::NotFound(msg)) => {
            tracing::debug!(building = building_id, error = msg, "feature artifact unavailable");
            return Ok(empty_features(&building_id));
        }
        Err(e) => return Err(e),
    };

    let keys: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
    let Some((matched, step)) = resolve::resolve(&building_id, &keys) else {
        tracing::debug!(building = building_id, "no feature entry resolved");
        return Ok(empty_features(&building_id));
    };

    tracing::debug!(building = building_id, matched, step = ?step, "features resolved");
    let features = map[matched].clone();
    let matched_key = (matched != building_id).then(|| matched.to_string());

    Ok(Json(BuildingFeaturesResponse {
        building_id,
        matched_key,
        features,
    })
    .into_response())
}

fn empty_features(building_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(BuildingFeaturesResponse {
            building_id: building_id.to_string(),
            matched_key: None,
            features: BTreeMap::new(),
        }),
    )
        .into_response()
}
