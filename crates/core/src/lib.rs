pub mod config;
mod db;
pub mod engine;
pub mod job;
pub mod metrics;
pub mod outcome;
pub mod progress;
pub mod scheduler;
pub mod stages;
pub mod task;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use engine::{EngineOutcome, FailureReport, RefinementEngine, TaskReporter};
pub use job::{Job, JobCounters, JobError, JobFilter, JobStatus, JobStore, SqliteJobStore};
pub use outcome::{
    ArtifactRecord, FailureCategory, FailureRecord, OutcomeError, OutcomeStore,
    SqliteOutcomeStore,
};
pub use progress::{
    create_progress_system, ProgressEvent, ProgressHandle, ProgressStore, SqliteProgressStore,
};
pub use scheduler::{SchedulerError, SchedulerStatus, SchedulerStores, TaskScheduler};
pub use stages::{HttpStageClient, Specification, StageSet};
pub use task::{OutcomeRef, SqliteTaskStore, Task, TaskError, TaskFilter, TaskStatus, TaskStore};
