use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{events, handlers, jobs, middleware::metrics_middleware, scheduler, tasks};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Jobs
        .route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job).delete(jobs::cancel_job))
        .route("/jobs/{id}/tasks", get(jobs::list_job_tasks))
        // Tasks
        .route("/tasks/{id}", get(tasks::get_task).delete(tasks::cancel_task))
        // Progress events
        .route("/events", get(events::list_events))
        // Scheduler
        .route("/scheduler/status", get(scheduler::get_status));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
