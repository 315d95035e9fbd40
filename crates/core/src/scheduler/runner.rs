//! Task scheduler implementation.
//!
//! Turns a submitted job into one supervised run per specification:
//! - Runs wait on the concurrency limiter, then drive the refinement engine
//! - Each run ends in exactly one persisted outcome, whatever happens
//! - Outcomes are folded into the job by the aggregator

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::engine::{EngineOutcome, FailureReport, RefinementEngine, TaskReporter};
use crate::job::{CreateJobRequest, Job, JobStatus};
use crate::metrics::{JOBS_SUBMITTED, TASKS_FINISHED, TASK_DURATION, TASK_ITERATIONS};
use crate::outcome::{FailureCategory, NewArtifact, NewFailure, OutcomeError};
use crate::progress::{self, ProgressEvent, ProgressHandle};
use crate::stages::Specification;
use crate::task::{CreateTaskRequest, OutcomeRef, Task, TaskError, TaskStatus, TaskStore};

use super::aggregator::JobAggregator;
use super::limiter::ConcurrencyLimiter;
use super::types::{SchedulerError, SchedulerStatus, SchedulerStores};

/// Persists engine progress to the task store and publishes it.
struct StoreReporter {
    task_id: String,
    job_id: String,
    public_id: String,
    tasks: Arc<dyn TaskStore>,
    progress: Option<ProgressHandle>,
    /// Last reported status and iteration.
    state: Mutex<(TaskStatus, u32)>,
}

impl StoreReporter {
    fn new(task: &Task, tasks: Arc<dyn TaskStore>, progress: Option<ProgressHandle>) -> Self {
        Self {
            task_id: task.id.clone(),
            job_id: task.job_id.clone(),
            public_id: task.public_id.clone(),
            tasks,
            progress,
            state: Mutex::new((task.status, task.iteration)),
        }
    }

    fn current(&self) -> (TaskStatus, u32) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl TaskReporter for StoreReporter {
    async fn status_changed(&self, status: TaskStatus) {
        let (from, iteration) = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.0 == status {
                return;
            }
            let from = state.0;
            state.0 = status;
            (from, state.1)
        };

        if let Err(e) = self.tasks.update_status(&self.task_id, status) {
            warn!(
                "Failed to update status of task {} to {}: {}",
                self.public_id,
                status.as_str(),
                e
            );
        }

        progress::emit(
            &self.progress,
            ProgressEvent::TaskStatusChanged {
                job_id: self.job_id.clone(),
                task_id: self.task_id.clone(),
                from_status: from.as_str().to_string(),
                to_status: status.as_str().to_string(),
                iteration,
            },
        )
        .await;
    }

    async fn iteration_started(&self, iteration: u32, max_iterations: u32) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .1 = iteration;

        if let Err(e) = self.tasks.set_iteration(&self.task_id, iteration) {
            warn!(
                "Failed to record iteration {} of task {}: {}",
                iteration, self.public_id, e
            );
        }

        progress::emit(
            &self.progress,
            ProgressEvent::TaskIterationStarted {
                job_id: self.job_id.clone(),
                task_id: self.task_id.clone(),
                iteration,
                max_iterations,
            },
        )
        .await;
    }
}

/// Cancellation handle of a spawned run.
struct ActiveTask {
    job_id: String,
    token: CancellationToken,
    /// First cancellation reason wins.
    reason: Arc<OnceLock<String>>,
}

/// Everything one supervised run needs, owned by its spawned future.
struct TaskRun {
    task: Task,
    engine: Arc<RefinementEngine>,
    limiter: Arc<ConcurrencyLimiter>,
    aggregator: Arc<JobAggregator>,
    stores: SchedulerStores,
    progress: Option<ProgressHandle>,
    active: Arc<RwLock<HashMap<String, ActiveTask>>>,
}

impl TaskRun {
    async fn run(self, token: CancellationToken, reason: Arc<OnceLock<String>>) {
        let started = Instant::now();
        let reporter = StoreReporter::new(
            &self.task,
            self.stores.tasks.clone(),
            self.progress.clone(),
        );

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => {
                let reason = reason
                    .get()
                    .cloned()
                    .unwrap_or_else(|| "service shutting down".to_string());
                info!("Task {} cancelled: {}", self.task.public_id, reason);
                EngineOutcome::Failed(
                    FailureReport::new(FailureCategory::Cancelled, format!("Cancelled: {}", reason))
                        .after(reporter.current().1),
                )
            }
            outcome = self.execute(&reporter) => outcome,
        };

        // Past this point the run can no longer be cancelled.
        self.active.write().await.remove(&self.task.id);
        self.finalize(outcome, &reporter, started).await;
    }

    /// Wait for a slot, then run the engine with panics turned into failures.
    async fn execute(&self, reporter: &StoreReporter) -> EngineOutcome {
        let _slot = match self.limiter.acquire().await {
            Ok(slot) => slot,
            Err(_) => {
                return EngineOutcome::Failed(FailureReport::new(
                    FailureCategory::Cancelled,
                    "Cancelled: scheduler is shutting down",
                ))
            }
        };
        debug!("Task {} acquired a slot", self.task.public_id);

        match AssertUnwindSafe(self.engine.run(&self.task.specification, reporter))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Task {} panicked: {}", self.task.public_id, message);
                EngineOutcome::Failed(
                    FailureReport::new(
                        FailureCategory::InternalError,
                        format!("Task run panicked: {}", message),
                    )
                    .after(reporter.current().1),
                )
            }
        }
    }

    /// Persist the outcome, attach it to the task and count it in the job.
    async fn finalize(&self, outcome: EngineOutcome, reporter: &StoreReporter, started: Instant) {
        let task = &self.task;
        let iterations = outcome.iterations();

        let outcome_ref = match self.persist(outcome) {
            Ok(outcome_ref) => outcome_ref,
            Err(e) => {
                error!("Failed to persist outcome of task {}: {}", task.public_id, e);
                let message = format!("Failed to persist outcome: {}", e);
                let fallback = FailureReport::new(FailureCategory::InternalError, message.clone())
                    .after(iterations);
                match self.persist_failure(fallback) {
                    Ok(outcome_ref) => outcome_ref,
                    Err(e) => {
                        error!(
                            "Failed to persist failure record of task {}: {}",
                            task.public_id, e
                        );
                        OutcomeRef::Unrecorded {
                            category: FailureCategory::InternalError,
                            message,
                        }
                    }
                }
            }
        };

        let outcome_ref = match self.stores.tasks.set_outcome(&task.id, outcome_ref) {
            Ok(updated) => match updated.outcome {
                Some(outcome_ref) => outcome_ref,
                None => OutcomeRef::Unrecorded {
                    category: FailureCategory::InternalError,
                    message: "Task finished without an outcome".to_string(),
                },
            },
            Err(TaskError::InvalidState { .. }) => {
                // Already finalized; counting it again would break the job totals.
                warn!("Task {} already has an outcome", task.public_id);
                return;
            }
            Err(e) => {
                error!("Failed to attach outcome to task {}: {}", task.public_id, e);
                let message = format!("Failed to attach outcome: {}", e);
                match self.stores.tasks.fail_unrecorded(&task.id, &message) {
                    Ok(_) => {}
                    Err(TaskError::InvalidState { .. }) => {
                        warn!("Task {} already has an outcome", task.public_id);
                        return;
                    }
                    Err(e) => error!("Failed to mark task {} as failed: {}", task.public_id, e),
                }
                OutcomeRef::Unrecorded {
                    category: FailureCategory::InternalError,
                    message,
                }
            }
        };

        let success = outcome_ref.is_success();
        let (category, message) = match outcome_ref.failure() {
            Some((category, message)) => (Some(category), Some(message.to_string())),
            None => (None, None),
        };

        let to_status = if success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        let (from_status, last_iteration) = reporter.current();
        progress::emit(
            &self.progress,
            ProgressEvent::TaskStatusChanged {
                job_id: task.job_id.clone(),
                task_id: task.id.clone(),
                from_status: from_status.as_str().to_string(),
                to_status: to_status.as_str().to_string(),
                iteration: last_iteration,
            },
        )
        .await;
        progress::emit(
            &self.progress,
            ProgressEvent::TaskFinished {
                job_id: task.job_id.clone(),
                task_id: task.id.clone(),
                success,
                iterations,
                category,
                message,
            },
        )
        .await;

        let result = if success { "success" } else { "failure" };
        TASKS_FINISHED
            .with_label_values(&[result, category.map(|c| c.as_str()).unwrap_or("")])
            .inc();
        TASK_ITERATIONS
            .with_label_values(&[result])
            .observe(iterations as f64);
        TASK_DURATION
            .with_label_values(&[result])
            .observe(started.elapsed().as_secs_f64());

        info!(
            "Task {} finished: {} after {} iteration(s)",
            task.public_id,
            category.map(|c| c.as_str()).unwrap_or("approved"),
            iterations
        );

        let counted = if success {
            self.aggregator.record_success(&task.job_id).await
        } else {
            self.aggregator.record_failure(&task.job_id).await
        };
        if let Err(e) = counted {
            error!(
                "Failed to record outcome of task {} in job {}: {}",
                task.public_id, task.job_id, e
            );
        }
    }

    fn persist(&self, outcome: EngineOutcome) -> Result<OutcomeRef, OutcomeError> {
        match outcome {
            EngineOutcome::Approved {
                candidate,
                verification,
                iterations,
                ..
            } => {
                let artifact = self.stores.outcomes.save_artifact(NewArtifact {
                    candidate,
                    verification,
                    iterations,
                    task_id: self.task.id.clone(),
                    job_id: self.task.job_id.clone(),
                })?;
                Ok(OutcomeRef::Success {
                    artifact_id: artifact.id,
                })
            }
            EngineOutcome::Failed(report) => self.persist_failure(report),
        }
    }

    fn persist_failure(&self, report: FailureReport) -> Result<OutcomeRef, OutcomeError> {
        let record = self.stores.outcomes.save_failure(NewFailure {
            task_id: self.task.id.clone(),
            job_id: self.task.job_id.clone(),
            specification: self.task.specification.clone(),
            category: report.category,
            message: report.message,
            stage: report.stage,
            iterations: report.iterations,
            partial: report.partial,
        })?;
        Ok(OutcomeRef::Failure {
            failure_id: record.id,
            category: record.category,
            message: record.message,
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs every task of every submitted job under a shared concurrency bound.
pub struct TaskScheduler {
    stores: SchedulerStores,
    engine: Arc<RefinementEngine>,
    limiter: Arc<ConcurrencyLimiter>,
    aggregator: Arc<JobAggregator>,
    progress: Option<ProgressHandle>,

    // Runtime state
    running: Arc<AtomicBool>,
    active: Arc<RwLock<HashMap<String, ActiveTask>>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl TaskScheduler {
    /// Create a scheduler. It accepts jobs immediately.
    pub fn new(
        stores: SchedulerStores,
        engine: Arc<RefinementEngine>,
        config: &SchedulerConfig,
        progress: Option<ProgressHandle>,
    ) -> Self {
        let aggregator = Arc::new(JobAggregator::new(stores.jobs.clone(), progress.clone()));

        Self {
            stores,
            engine,
            limiter: Arc::new(ConcurrencyLimiter::new(config.max_concurrent)),
            aggregator,
            progress,
            running: Arc::new(AtomicBool::new(true)),
            active: Arc::new(RwLock::new(HashMap::new())),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Create a job with one task per specification and launch every task.
    ///
    /// Returns once all runs are spawned; outcomes arrive asynchronously.
    pub async fn submit(
        &self,
        owner: &str,
        specifications: Vec<Specification>,
    ) -> Result<Job, SchedulerError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }
        if specifications.is_empty() {
            return Err(SchedulerError::EmptyJob);
        }

        let job = self.stores.jobs.create(CreateJobRequest {
            owner: owner.to_string(),
            specifications,
        })?;
        JOBS_SUBMITTED.inc();
        info!(
            "Job {} submitted by {} with {} task(s)",
            job.public_id, job.owner, job.counters.total
        );

        progress::emit(
            &self.progress,
            ProgressEvent::JobCreated {
                job_id: job.id.clone(),
                public_id: job.public_id.clone(),
                owner: job.owner.clone(),
                total: job.counters.total,
            },
        )
        .await;

        if let Err(e) = self.launch(&job).await {
            error!("Failed to launch job {}: {}", job.public_id, e);
            let message = format!("Failed to launch tasks: {}", e);
            match self
                .stores
                .jobs
                .update_status(&job.id, JobStatus::Failed, Some(message.clone()))
            {
                Ok(failed) => {
                    progress::emit(
                        &self.progress,
                        ProgressEvent::JobStatusChanged {
                            job_id: failed.id.clone(),
                            from_status: job.status.as_str().to_string(),
                            to_status: JobStatus::Failed.as_str().to_string(),
                            reason: Some(message),
                        },
                    )
                    .await;
                }
                Err(e) => error!("Failed to mark job {} as failed: {}", job.public_id, e),
            }
            return Err(e);
        }

        self.stores
            .jobs
            .get(&job.id)?
            .ok_or_else(|| SchedulerError::JobNotFound(job.id.clone()))
    }

    async fn launch(&self, job: &Job) -> Result<(), SchedulerError> {
        let job = self
            .stores
            .jobs
            .update_status(&job.id, JobStatus::Processing, None)?;
        progress::emit(
            &self.progress,
            ProgressEvent::JobStatusChanged {
                job_id: job.id.clone(),
                from_status: JobStatus::Pending.as_str().to_string(),
                to_status: JobStatus::Processing.as_str().to_string(),
                reason: None,
            },
        )
        .await;

        for specification in &job.specifications {
            // Counted before the run exists so its outcome can never be applied first.
            self.aggregator.increment_in_progress(&job.id).await?;

            match self.stores.tasks.create(CreateTaskRequest {
                job_id: job.id.clone(),
                specification: specification.clone(),
            }) {
                Ok(task) => self.spawn_task(task).await,
                Err(e) => {
                    error!("Failed to create task for job {}: {}", job.public_id, e);
                    self.aggregator.record_failure(&job.id).await?;
                }
            }
        }

        Ok(())
    }

    async fn spawn_task(&self, task: Task) {
        let token = self.shutdown.child_token();
        let reason = Arc::new(OnceLock::new());

        self.active.write().await.insert(
            task.id.clone(),
            ActiveTask {
                job_id: task.job_id.clone(),
                token: token.clone(),
                reason: reason.clone(),
            },
        );

        debug!("Spawning run for task {}", task.public_id);
        let run = TaskRun {
            task,
            engine: self.engine.clone(),
            limiter: self.limiter.clone(),
            aggregator: self.aggregator.clone(),
            stores: self.stores.clone(),
            progress: self.progress.clone(),
            active: self.active.clone(),
        };
        self.tracker.spawn(run.run(token, reason));
    }

    /// Cancel a running or queued task. Accepts the task id or public id.
    ///
    /// Returns false if the task already finished.
    pub async fn cancel_task(&self, id: &str, reason: &str) -> Result<bool, SchedulerError> {
        let task = self
            .stores
            .tasks
            .get(id)?
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))?;

        if task.status.is_terminal() {
            return Ok(false);
        }

        let active = self.active.read().await;
        match active.get(&task.id) {
            Some(entry) => {
                let _ = entry.reason.set(reason.to_string());
                entry.token.cancel();
                info!("Cancelling task {}: {}", task.public_id, reason);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Cancel every unfinished task of a job. Returns how many were cancelled.
    pub async fn cancel_job(&self, id: &str, reason: &str) -> Result<usize, SchedulerError> {
        let job = self
            .stores
            .jobs
            .get(id)?
            .ok_or_else(|| SchedulerError::JobNotFound(id.to_string()))?;

        let active = self.active.read().await;
        let mut cancelled = 0;
        for entry in active.values().filter(|entry| entry.job_id == job.id) {
            if entry.token.is_cancelled() {
                continue;
            }
            let _ = entry.reason.set(reason.to_string());
            entry.token.cancel();
            cancelled += 1;
        }

        info!(
            "Cancelling {} task(s) of job {}: {}",
            cancelled, job.public_id, reason
        );
        Ok(cancelled)
    }

    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.running.load(Ordering::SeqCst),
            active_tasks: self.active.read().await.len(),
            limiter: self.limiter.status(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop accepting jobs, cancel every unfinished run and wait for all of
    /// them to record their outcome.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Scheduler already stopped");
            return;
        }

        info!("Stopping task scheduler");
        self.shutdown.cancel();
        self.limiter.close();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Task scheduler stopped");
    }
}
