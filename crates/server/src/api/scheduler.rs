use axum::{extract::State, Json};
use forge_core::SchedulerStatus;
use std::sync::Arc;

use crate::state::AppState;

/// Scheduler and concurrency limiter status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<SchedulerStatus> {
    Json(state.scheduler().status().await)
}
