//! Prediction endpoints: artifact load, per-building matches, status
//! overview, per-file classifier metrics

use crate::cache::CacheKey;
use crate::error::{Result, ServerError};
use crate::predictions::{self, BuildingStatus, MatchStatus};
use crate::resolve;
use crate::state::{AppState, PredictionByFile, PredictionFlat};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

fn load_summary(flat: &PredictionFlat, by_file: &PredictionByFile) -> serde_json::Value {
    json!({
        "cache_key_flat": CacheKey::predictions_flat().render(),
        "cache_key_by_file": CacheKey::predictions_by_file().render(),
        "total_pairs": predictions::count_pairs(by_file),
        "unique_candidates": flat.len(),
    })
}

/// Load the prediction artifact into the cache
///
/// POST /api/predictions/load
///
/// Dispatched as a background job when a distributed cache tier is
/// configured, otherwise loaded synchronously.
pub async fn load(State(state): State<Arc<AppState>>) -> Result<Response> {
    if state.cache.has_remote() {
        let job_state = state.clone();
        let job_id = state.jobs.submit("load_bkafi_results", async move {
            let flat = job_state.prediction_flat().await?;
            let by_file = job_state.prediction_by_file().await?;
            Ok(load_summary(&flat, &by_file))
        });

        tracing::info!(job_id = %job_id, "prediction load dispatched");
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "job_id": job_id.to_string(), "status": "queued" })),
        )
            .into_response());
    }

    let flat = state.prediction_flat().await?;
    let by_file = state.prediction_by_file().await?;
    tracing::info!(
        files = by_file.len(),
        buildings = flat.len(),
        "prediction artifact loaded synchronously"
    );
    Ok(Json(load_summary(&flat, &by_file)).into_response())
}

/// One candidate in the match response, keyed the way viewers expect
#[derive(Serialize)]
pub struct MatchView {
    /// Index-dataset building id of the candidate
    pub building_id: String,
    pub confidence: f64,
    pub predicted_label: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub true_label: Option<u8>,
}

/// Per-building match response
#[derive(Serialize)]
pub struct BuildingMatchesResponse {
    pub building_id: String,
    /// Artifact key the resolver matched, when it differs from the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_key: Option<String>,
    pub matches: Vec<MatchView>,
}

/// Fetch a building's candidate matches
///
/// GET /api/building/matches/:building_id
///
/// A building without pairs (or a missing artifact) answers 404 with an
/// empty match list.
pub async fn building_matches(
    State(state): State<Arc<AppState>>,
    Path(building_id): Path<String>,
) -> Result<Response> {
    let flat = match state.prediction_flat().await {
        Ok(flat) => flat,
        Err(ServerError::NotFound(msg)) => {
            tracing::debug!(building = building_id, error = msg, "prediction artifact unavailable");
            return Ok(empty_matches(&building_id));
        }
        Err(e) => return Err(e),
    };

    let keys: Vec<&str> = flat.keys().map(|k| k.as_str()).collect();
    let Some((matched, step)) = resolve::resolve(&building_id, &keys) else {
        tracing::debug!(building = building_id, "no match entry resolved");
        return Ok(empty_matches(&building_id));
    };

    tracing::debug!(building = building_id, matched, step = ?step, "matches resolved");
    let matches = flat[matched]
        .iter()
        .map(|pair| MatchView {
            building_id: pair.index_id.clone(),
            confidence: pair.confidence,
            predicted_label: pair.effective_predicted_label(),
            true_label: pair.true_label,
        })
        .collect();
    let matched_key = (matched != building_id).then(|| matched.to_string());

    Ok(Json(BuildingMatchesResponse {
        building_id,
        matched_key,
        matches,
    })
    .into_response())
}

fn empty_matches(building_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(BuildingMatchesResponse {
            building_id: building_id.to_string(),
            matched_key: None,
            matches: Vec::new(),
        }),
    )
        .into_response()
}

/// Query parameters for the status overview
#[derive(Deserialize)]
pub struct StatusQuery {
    /// Feature cache parameter; defaults to the most recently computed one
    pub file: Option<String>,
}

/// Overview counts alongside the per-building table
#[derive(Default, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub with_features: usize,
    pub with_pairs: usize,
    pub true_match: usize,
    pub false_positive: usize,
    pub no_match: usize,
    pub unlabeled: usize,
}

/// Status overview response
#[derive(Serialize)]
pub struct BuildingsStatusResponse {
    pub counts: StatusCounts,
    pub buildings: BTreeMap<String, BuildingStatus>,
}

/// Cross-artifact status for every known building
///
/// GET /api/buildings/status[?file=<path>]
///
/// Either artifact may be missing; the overview then covers the buildings
/// the available one knows about.
pub async fn buildings_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<BuildingsStatusResponse>> {
    let param = state.features_param(query.file.as_deref());

    let features = match state.feature_map(&param).await {
        Ok(map) => Some(map),
        Err(ServerError::NotFound(msg)) => {
            tracing::debug!(error = msg, "feature artifact unavailable for status overview");
            None
        }
        Err(e) => return Err(e),
    };
    let predictions = match state.prediction_flat().await {
        Ok(flat) => Some(flat),
        Err(ServerError::NotFound(msg)) => {
            tracing::debug!(error = msg, "prediction artifact unavailable for status overview");
            None
        }
        Err(e) => return Err(e),
    };

    let mut ids: Vec<&String> = Vec::new();
    if let Some(map) = features.as_deref() {
        ids.extend(map.keys());
    }
    if let Some(flat) = predictions.as_deref() {
        ids.extend(flat.keys());
    }
    ids.sort();
    ids.dedup();

    let mut counts = StatusCounts::default();
    let mut buildings = BTreeMap::new();
    for id in ids {
        let has_features = features
            .as_deref()
            .is_some_and(|map| map.contains_key(id));
        let pairs = predictions.as_deref().and_then(|flat| flat.get(id));
        let match_status =
            predictions::match_status(pairs.map(|p| p.as_slice()).unwrap_or(&[]));

        counts.total += 1;
        counts.with_features += usize::from(has_features);
        counts.with_pairs += usize::from(pairs.is_some());
        match match_status {
            MatchStatus::TrueMatch => counts.true_match += 1,
            MatchStatus::FalsePositive => counts.false_positive += 1,
            MatchStatus::NoMatch => counts.no_match += 1,
            MatchStatus::None => counts.unlabeled += 1,
        }

        buildings.insert(
            id.clone(),
            BuildingStatus {
                has_features,
                has_pairs: pairs.is_some(),
                match_status,
            },
        );
    }

    Ok(Json(BuildingsStatusResponse { counts, buildings }))
}

/// Classifier metrics for one result file
///
/// GET /api/classifier/metrics/:file_name
///
/// The file name is matched exactly against the by-file view.
pub async fn file_metrics(
    State(state): State<Arc<AppState>>,
    Path(file_name): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let by_file = state.prediction_by_file().await?;

    let metrics = predictions::classifier_metrics(&by_file, &file_name).ok_or_else(|| {
        ServerError::not_found(format!("no results for file {file_name}"))
    })?;

    Ok(Json(json!({
        "file_name": file_name,
        "metrics": metrics,
    })))
}
