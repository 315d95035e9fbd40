//! Task API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use forge_core::{ArtifactRecord, FailureRecord, OutcomeRef, SchedulerError, Task};
use serde::Serialize;
use std::sync::Arc;

use super::handlers::{api_error, ErrorResponse};
use super::jobs::{cancel_reason, CancelBody};
use crate::state::AppState;

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

/// A task with the outcome record it points to
#[derive(Debug, Serialize)]
pub struct TaskDetailResponse {
    #[serde(flatten)]
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
}

/// Response for cancelling a task
#[derive(Debug, Serialize)]
pub struct CancelTaskResponse {
    pub task_id: String,
    pub cancelled: bool,
}

/// Get a task and its outcome by durable or public ID
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskDetailResponse>> {
    let task = match state.task_store().get(&id) {
        Ok(Some(task)) => task,
        Ok(None) => {
            return Err(api_error(
                StatusCode::NOT_FOUND,
                format!("Task not found: {}", id),
            ))
        }
        Err(e) => return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    };

    let outcome_err = |e: forge_core::OutcomeError| {
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    };

    let (artifact, failure) = match &task.outcome {
        Some(OutcomeRef::Success { artifact_id }) => (
            state
                .outcome_store()
                .get_artifact(artifact_id)
                .map_err(outcome_err)?,
            None,
        ),
        Some(OutcomeRef::Failure { failure_id, .. }) => (
            None,
            state
                .outcome_store()
                .get_failure(failure_id)
                .map_err(outcome_err)?,
        ),
        Some(OutcomeRef::Unrecorded { .. }) | None => (None, None),
    };

    Ok(Json(TaskDetailResponse {
        task,
        artifact,
        failure,
    }))
}

/// Cancel a running or queued task (DELETE endpoint)
///
/// Finished tasks are left untouched and answer with 409.
pub async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<CancelBody>>,
) -> ApiResult<Json<CancelTaskResponse>> {
    let reason = cancel_reason(body);

    match state.scheduler().cancel_task(&id, &reason).await {
        Ok(true) => Ok(Json(CancelTaskResponse {
            task_id: id,
            cancelled: true,
        })),
        Ok(false) => Err(api_error(
            StatusCode::CONFLICT,
            format!("Task {} is not running", id),
        )),
        Err(SchedulerError::TaskNotFound(_)) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Task not found: {}", id),
        )),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}
