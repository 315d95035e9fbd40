//! Progress event query handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use forge_core::progress::{ProgressFilter, ProgressRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::handlers::{api_error, ErrorResponse};
use crate::state::AppState;

/// Maximum allowed limit for event queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for event queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for listing progress events
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Filter by job (durable or public ID)
    pub job_id: Option<String>,
    /// Filter by task (durable or public ID)
    pub task_id: Option<String>,
    /// Filter by event type, e.g. `task_finished`
    pub event_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<ProgressRecord>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// List persisted progress events in emission order
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);

    let mut filter = ProgressFilter::new().with_limit(limit).with_offset(offset);

    // Events are keyed by durable IDs; resolve public IDs first
    if let Some(ref job_id) = query.job_id {
        let resolved = match state.job_store().get(job_id) {
            Ok(Some(job)) => job.id,
            Ok(None) => job_id.clone(),
            Err(e) => return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
        };
        filter = filter.with_job(resolved);
    }

    if let Some(ref task_id) = query.task_id {
        let resolved = match state.task_store().get(task_id) {
            Ok(Some(task)) => task.id,
            Ok(None) => task_id.clone(),
            Err(e) => return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
        };
        filter = filter.with_task(resolved);
    }

    if let Some(ref event_type) = query.event_type {
        filter = filter.with_event_type(event_type);
    }

    let events = state
        .progress_store()
        .query(&filter)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let count_filter = ProgressFilter {
        limit: i64::MAX,
        offset: 0,
        ..filter.clone()
    };
    let total = state
        .progress_store()
        .count(&count_filter)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(EventsResponse {
        events,
        total,
        limit,
        offset,
    }))
}
