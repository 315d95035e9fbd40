//! Task reporter that records what the engine reported.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::engine::TaskReporter;
use crate::task::TaskStatus;

/// Records status changes and iteration starts for assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    statuses: Mutex<Vec<TaskStatus>>,
    iterations: Mutex<Vec<u32>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses in the order they were reported.
    pub fn statuses(&self) -> Vec<TaskStatus> {
        self.statuses.lock().unwrap().clone()
    }

    /// Iterations in the order they were started.
    pub fn iterations(&self) -> Vec<u32> {
        self.iterations.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskReporter for RecordingReporter {
    async fn status_changed(&self, status: TaskStatus) {
        let mut statuses = self.statuses.lock().unwrap();
        // Repeated phases within the loop are collapsed.
        if !statuses.contains(&status) {
            statuses.push(status);
        }
    }

    async fn iteration_started(&self, iteration: u32, _max_iterations: u32) {
        self.iterations.lock().unwrap().push(iteration);
    }
}
