//! Testing utilities and mock implementations.
//!
//! Provides mock stage collaborators and helpers so the engine, scheduler
//! and server can be exercised end to end without a stage service.
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_core::testing::{fixtures, MockStages};
//!
//! let stages = Arc::new(MockStages::new().never_approve());
//! let (scheduler, stores) = fixtures::scheduler(stages.clone(), 2, 3);
//!
//! let job = scheduler.submit("alice", fixtures::specifications(3)).await?;
//! ```

mod mock_stages;
mod recording_reporter;

pub use mock_stages::MockStages;
pub use recording_reporter::RecordingReporter;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::sync::Arc;

    use crate::config::{EngineConfig, SchedulerConfig};
    use crate::engine::RefinementEngine;
    use crate::job::{JobStore, SqliteJobStore};
    use crate::outcome::{OutcomeStore, SqliteOutcomeStore};
    use crate::progress::{create_progress_system, ProgressStore, SqliteProgressStore};
    use crate::scheduler::{SchedulerStores, TaskScheduler};
    use crate::stages::{AllStages, Specification, StageSet};
    use crate::task::{SqliteTaskStore, TaskStore};

    /// Create a specification with the given description.
    pub fn specification(description: &str) -> Specification {
        Specification::new(description)
            .with_input("a text file")
            .with_output("a JSON document")
    }

    /// Create `count` distinct specifications.
    pub fn specifications(count: usize) -> Vec<Specification> {
        (0..count)
            .map(|i| specification(&format!("Tool number {}", i)))
            .collect()
    }

    /// Engine settings with a short stage timeout.
    pub fn engine_config(max_iterations: u32) -> EngineConfig {
        EngineConfig {
            max_iterations,
            stage_timeout_secs: 5,
            summary_max_chars: 2000,
        }
    }

    /// In-memory stores shared by a test scheduler.
    #[derive(Clone)]
    pub struct TestStores {
        pub jobs: Arc<SqliteJobStore>,
        pub tasks: Arc<SqliteTaskStore>,
        pub outcomes: Arc<SqliteOutcomeStore>,
        pub progress: Arc<SqliteProgressStore>,
    }

    impl TestStores {
        pub fn in_memory() -> Self {
            Self {
                jobs: Arc::new(SqliteJobStore::in_memory().unwrap()),
                tasks: Arc::new(SqliteTaskStore::in_memory().unwrap()),
                outcomes: Arc::new(SqliteOutcomeStore::in_memory().unwrap()),
                progress: Arc::new(SqliteProgressStore::in_memory().unwrap()),
            }
        }

        pub fn scheduler_stores(&self) -> SchedulerStores {
            SchedulerStores {
                jobs: self.jobs.clone() as Arc<dyn JobStore>,
                tasks: self.tasks.clone() as Arc<dyn TaskStore>,
                outcomes: self.outcomes.clone() as Arc<dyn OutcomeStore>,
            }
        }
    }

    /// Build a scheduler over in-memory stores with a running progress writer.
    pub fn scheduler<S: AllStages + 'static>(
        stages: Arc<S>,
        max_concurrent: usize,
        max_iterations: u32,
    ) -> (Arc<TaskScheduler>, TestStores) {
        let stores = TestStores::in_memory();
        let (progress, writer) =
            create_progress_system(stores.progress.clone() as Arc<dyn ProgressStore>, 1000);
        tokio::spawn(writer.run());

        let engine = Arc::new(RefinementEngine::new(
            StageSet::uniform(stages),
            engine_config(max_iterations),
        ));
        let scheduler = TaskScheduler::new(
            stores.scheduler_stores(),
            engine,
            &SchedulerConfig { max_concurrent },
            Some(progress),
        );
        (Arc::new(scheduler), stores)
    }
}
