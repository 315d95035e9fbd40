//! Atomic job counter updates and the single completion transition.

use std::sync::Arc;

use tracing::{debug, info};

use crate::job::{CounterDelta, JobCounters, JobError, JobStatus, JobStore};
use crate::metrics::JOBS_COMPLETED;
use crate::progress::{self, ProgressEvent, ProgressHandle};

/// Folds task outcomes into their job.
///
/// Every update is a single conditional write in the job store, so
/// concurrent callers never lose increments and exactly one caller
/// observes the transition to `Completed`.
pub struct JobAggregator {
    jobs: Arc<dyn JobStore>,
    progress: Option<ProgressHandle>,
}

impl JobAggregator {
    pub fn new(jobs: Arc<dyn JobStore>, progress: Option<ProgressHandle>) -> Self {
        Self { jobs, progress }
    }

    /// Count a task run as launched.
    pub async fn increment_in_progress(&self, job_id: &str) -> Result<JobCounters, JobError> {
        self.apply(job_id, CounterDelta::Started).await
    }

    /// Count a success outcome and complete the job if it was the last one.
    pub async fn record_success(&self, job_id: &str) -> Result<JobCounters, JobError> {
        let counters = self.apply(job_id, CounterDelta::Succeeded).await?;
        self.check_completion(job_id).await?;
        Ok(counters)
    }

    /// Count a failure outcome and complete the job if it was the last one.
    pub async fn record_failure(&self, job_id: &str) -> Result<JobCounters, JobError> {
        let counters = self.apply(job_id, CounterDelta::Failed).await?;
        self.check_completion(job_id).await?;
        Ok(counters)
    }

    /// Complete the job if every task reported.
    ///
    /// Returns true only for the call that performed the transition.
    pub async fn check_completion(&self, job_id: &str) -> Result<bool, JobError> {
        if !self.jobs.try_complete(job_id)? {
            return Ok(false);
        }

        let job = self
            .jobs
            .get(job_id)?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

        JOBS_COMPLETED.inc();
        info!(
            "Job {} completed: {} succeeded, {} failed",
            job.public_id, job.counters.completed, job.counters.failed
        );

        progress::emit(
            &self.progress,
            ProgressEvent::JobStatusChanged {
                job_id: job.id.clone(),
                from_status: JobStatus::Processing.as_str().to_string(),
                to_status: JobStatus::Completed.as_str().to_string(),
                reason: Some(format!(
                    "{} succeeded, {} failed",
                    job.counters.completed, job.counters.failed
                )),
            },
        )
        .await;

        Ok(true)
    }

    async fn apply(&self, job_id: &str, delta: CounterDelta) -> Result<JobCounters, JobError> {
        let counters = self.jobs.apply_counter(job_id, delta)?;
        debug!(
            "Job {} counters after {}: {}/{} done, {} in progress",
            job_id,
            delta.as_str(),
            counters.reported(),
            counters.total,
            counters.in_progress
        );

        progress::emit(
            &self.progress,
            ProgressEvent::JobCountersChanged {
                job_id: job_id.to_string(),
                total: counters.total,
                completed: counters.completed,
                failed: counters.failed,
                in_progress: counters.in_progress,
            },
        )
        .await;

        Ok(counters)
    }
}
