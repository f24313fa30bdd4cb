//! Job polling endpoint

use crate::error::{Result, ServerError};
use crate::jobs::JobStatusReport;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

/// Poll a background job by id
///
/// GET /api/jobs/:job_id
pub async fn poll(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusReport>> {
    let id = Uuid::parse_str(&job_id)
        .map_err(|_| ServerError::bad_request(format!("invalid job id: {job_id}")))?;

    let report = state
        .jobs
        .poll(&id)
        .ok_or_else(|| ServerError::not_found(format!("unknown job {id}")))?;

    Ok(Json(report))
}
