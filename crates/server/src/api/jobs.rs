//! Job API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use forge_core::{Job, JobFilter, JobStatus, SchedulerError, Specification, Task};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::handlers::{api_error, ErrorResponse};
use crate::state::AppState;

/// Maximum allowed limit for job queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for job queries
const DEFAULT_LIMIT: i64 = 100;

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a job
#[derive(Debug, Deserialize)]
pub struct CreateJobBody {
    /// Who submits the job
    pub owner: Option<String>,
    /// One task is created per specification
    pub specifications: Vec<Specification>,
}

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Filter by status
    pub status: Option<String>,
    /// Filter by owner
    pub owner: Option<String>,
    /// Maximum number of jobs to return
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Request body for cancelling a job or task
#[derive(Debug, Deserialize)]
pub struct CancelBody {
    /// Optional reason for cancellation
    pub reason: Option<String>,
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Response for listing the tasks of a job
#[derive(Debug, Serialize)]
pub struct JobTasksResponse {
    pub job_id: String,
    pub tasks: Vec<Task>,
}

/// Response for cancelling a job
#[derive(Debug, Serialize)]
pub struct CancelJobResponse {
    pub job_id: String,
    pub cancelled: usize,
}

pub(crate) fn cancel_reason(body: Option<Json<CancelBody>>) -> String {
    body.and_then(|b| b.0.reason)
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "cancelled by operator".to_string())
}

fn find_job(state: &AppState, id: &str) -> ApiResult<Job> {
    match state.job_store().get(id) {
        Ok(Some(job)) => Ok(job),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Job not found: {}", id),
        )),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a new job
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateJobBody>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let owner = body
        .owner
        .filter(|o| !o.trim().is_empty())
        .unwrap_or_else(|| "anonymous".to_string());

    match state.scheduler().submit(&owner, body.specifications).await {
        Ok(job) => Ok((StatusCode::CREATED, Json(job))),
        Err(SchedulerError::EmptyJob) => Err(api_error(
            StatusCode::BAD_REQUEST,
            "A job needs at least one specification",
        )),
        Err(SchedulerError::NotRunning) => Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Scheduler is shutting down",
        )),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// Get a job by durable or public ID
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    find_job(&state, &id).map(Json)
}

/// List jobs with optional filters
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> ApiResult<Json<ListJobsResponse>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = JobFilter::new().with_limit(limit).with_offset(offset);

    if let Some(ref status) = params.status {
        match JobStatus::parse(status) {
            Some(status) => filter = filter.with_status(status),
            None => {
                return Err(api_error(
                    StatusCode::BAD_REQUEST,
                    format!("Unknown job status: {}", status),
                ))
            }
        }
    }

    if let Some(ref owner) = params.owner {
        filter = filter.with_owner(owner);
    }

    let jobs = state
        .job_store()
        .list(&filter)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    // Get total count (without pagination)
    let count_filter = JobFilter {
        limit: i64::MAX,
        offset: 0,
        ..filter.clone()
    };
    let total = state
        .job_store()
        .count(&count_filter)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(ListJobsResponse {
        jobs,
        total,
        limit,
        offset,
    }))
}

/// List the tasks of a job
pub async fn list_job_tasks(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobTasksResponse>> {
    let job = find_job(&state, &id)?;

    let tasks = state
        .task_store()
        .list_by_job(&job.id)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(JobTasksResponse {
        job_id: job.id,
        tasks,
    }))
}

/// Cancel every unfinished task of a job (DELETE endpoint)
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<CancelBody>>,
) -> ApiResult<Json<CancelJobResponse>> {
    let reason = cancel_reason(body);

    match state.scheduler().cancel_job(&id, &reason).await {
        Ok(cancelled) => {
            let job = find_job(&state, &id)?;
            Ok(Json(CancelJobResponse {
                job_id: job.id,
                cancelled,
            }))
        }
        Err(SchedulerError::JobNotFound(_)) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Job not found: {}", id),
        )),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}
