use std::sync::Arc;

use forge_core::{
    Config, JobStore, OutcomeStore, ProgressStore, SanitizedConfig, TaskScheduler, TaskStore,
};

/// Shared application state
pub struct AppState {
    config: Config,
    scheduler: Arc<TaskScheduler>,
    job_store: Arc<dyn JobStore>,
    task_store: Arc<dyn TaskStore>,
    outcome_store: Arc<dyn OutcomeStore>,
    progress_store: Arc<dyn ProgressStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        scheduler: Arc<TaskScheduler>,
        job_store: Arc<dyn JobStore>,
        task_store: Arc<dyn TaskStore>,
        outcome_store: Arc<dyn OutcomeStore>,
        progress_store: Arc<dyn ProgressStore>,
    ) -> Self {
        Self {
            config,
            scheduler,
            job_store,
            task_store,
            outcome_store,
            progress_store,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        self.scheduler.as_ref()
    }

    pub fn job_store(&self) -> &dyn JobStore {
        self.job_store.as_ref()
    }

    pub fn task_store(&self) -> &dyn TaskStore {
        self.task_store.as_ref()
    }

    pub fn outcome_store(&self) -> &dyn OutcomeStore {
        self.outcome_store.as_ref()
    }

    pub fn progress_store(&self) -> &dyn ProgressStore {
        self.progress_store.as_ref()
    }
}
