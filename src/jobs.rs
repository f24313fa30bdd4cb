//! Background job dispatcher
//!
//! Expensive artifact builds are offloaded to asynchronous tasks when a
//! shared cache tier is available, so a request can return a job handle
//! immediately and the client polls for completion. Submission is
//! fire-and-forget: no retries, no backoff, no cancellation. A failed job
//! surfaces its error to the poller and is never resubmitted.
//!
//! Completed records are kept for the process lifetime; at demo scale the
//! registry stays small.

use crate::error::Result;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Lifecycle state of a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Started,
    Success,
    Failure,
}

impl JobState {
    /// Whether the job has finished, successfully or not
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Success | JobState::Failure)
    }
}

#[derive(Debug, Clone)]
struct JobRecord {
    name: String,
    state: JobState,
    result: Option<JsonValue>,
    error: Option<String>,
}

/// Snapshot of a job returned to pollers
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusReport {
    pub job_id: String,
    pub name: String,
    pub status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Dispatcher spawning artifact builds on the tokio runtime and tracking
/// their outcomes
#[derive(Default)]
pub struct JobDispatcher {
    jobs: Arc<RwLock<HashMap<Uuid, JobRecord>>>,
}

impl JobDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a named job. Returns immediately with the job id; the future
    /// runs on the tokio runtime and its outcome is recorded for polling.
    pub fn submit<F>(&self, name: impl Into<String>, fut: F) -> Uuid
    where
        F: Future<Output = Result<JsonValue>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let name = name.into();

        if let Ok(mut jobs) = self.jobs.write() {
            jobs.insert(
                id,
                JobRecord {
                    name: name.clone(),
                    state: JobState::Queued,
                    result: None,
                    error: None,
                },
            );
        }

        let jobs = self.jobs.clone();
        tokio::spawn(async move {
            set_state(&jobs, id, JobState::Started, None, None);
            tracing::info!(job_id = %id, job = %name, "job started");

            match fut.await {
                Ok(result) => {
                    tracing::info!(job_id = %id, job = %name, "job succeeded");
                    set_state(&jobs, id, JobState::Success, Some(result), None);
                }
                Err(e) => {
                    tracing::warn!(job_id = %id, job = %name, error = %e, "job failed");
                    set_state(&jobs, id, JobState::Failure, None, Some(e.to_string()));
                }
            }
        });

        id
    }

    /// Poll a job by id; `None` for unknown ids
    pub fn poll(&self, id: &Uuid) -> Option<JobStatusReport> {
        let jobs = self.jobs.read().ok()?;
        let record = jobs.get(id)?;
        Some(JobStatusReport {
            job_id: id.to_string(),
            name: record.name.clone(),
            status: record.state,
            result: record.result.clone(),
            error: record.error.clone(),
        })
    }

    /// Total jobs tracked (for stats)
    pub fn len(&self) -> usize {
        self.jobs.read().map(|j| j.len()).unwrap_or(0)
    }

    /// Whether no jobs have been submitted
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of jobs still running (for stats)
    pub fn active(&self) -> usize {
        self.jobs
            .read()
            .map(|jobs| {
                jobs.values()
                    .filter(|record| !record.state.is_terminal())
                    .count()
            })
            .unwrap_or(0)
    }
}

fn set_state(
    jobs: &RwLock<HashMap<Uuid, JobRecord>>,
    id: Uuid,
    state: JobState,
    result: Option<JsonValue>,
    error: Option<String>,
) {
    if let Ok(mut jobs) = jobs.write() {
        if let Some(record) = jobs.get_mut(&id) {
            record.state = state;
            if result.is_some() {
                record.result = result;
            }
            if error.is_some() {
                record.error = error;
            }
        }
    }
}
