//! The per-task refinement state machine.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::types::{EngineOutcome, FailureReport, IterationContext, TaskReporter};
use crate::config::EngineConfig;
use crate::metrics::{STAGE_DURATION, STAGE_ERRORS};
use crate::outcome::FailureCategory;
use crate::stages::{Review, Specification, StageError, StageKind, StageSet};
use crate::task::TaskStatus;

/// A stage call that did not produce a usable result.
#[derive(Debug)]
struct StageFailure {
    stage: StageKind,
    error: StageError,
}

impl StageFailure {
    fn into_report(self, iterations: u32) -> FailureReport {
        FailureReport::new(
            FailureCategory::StageError,
            format!("{} stage failed: {}", self.stage, self.error),
        )
        .at_stage(self.stage)
        .after(iterations)
    }
}

/// Drives one specification through intake, search, plan and the bounded
/// implement/verify/review loop.
///
/// The engine holds no per-task state; one instance serves every task.
pub struct RefinementEngine {
    stages: StageSet,
    config: EngineConfig,
}

impl RefinementEngine {
    pub fn new(stages: StageSet, config: EngineConfig) -> Self {
        Self { stages, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.config.stage_timeout_secs)
    }

    /// Call a stage with the configured timeout, recording latency and errors.
    async fn call<T, F>(&self, stage: StageKind, fut: F) -> Result<T, StageFailure>
    where
        F: Future<Output = Result<T, StageError>>,
    {
        let timeout = self.stage_timeout();
        let start = Instant::now();

        let result = match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StageError::Timeout(timeout)),
        };

        STAGE_DURATION
            .with_label_values(&[stage.as_str()])
            .observe(start.elapsed().as_secs_f64());

        result.map_err(|error| {
            let kind = match error {
                StageError::Failed(_) => "failed",
                StageError::Malformed(_) => "malformed",
                StageError::Timeout(_) => "timeout",
                StageError::Transport(_) => "transport",
            };
            STAGE_ERRORS.with_label_values(&[stage.as_str(), kind]).inc();
            warn!("Stage {} failed: {}", stage, error);
            StageFailure { stage, error }
        })
    }

    /// Run the pipeline to a terminal outcome.
    ///
    /// Never returns an error: every failure mode becomes `EngineOutcome::Failed`.
    /// Dropping the returned future cancels any in-flight stage call.
    pub async fn run(&self, spec: &Specification, reporter: &dyn TaskReporter) -> EngineOutcome {
        // One-shot prefix: any failure here is fatal and spends no iteration.
        reporter.status_changed(TaskStatus::Planning).await;

        let intake = match self
            .call(StageKind::Intake, self.stages.intake.intake(spec))
            .await
        {
            Ok(intake) => intake,
            Err(failure) => return EngineOutcome::Failed(failure.into_report(0)),
        };

        if !intake.valid {
            let message = intake
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| "Specification rejected by intake".to_string());
            info!("Specification rejected at intake: {}", message);
            return EngineOutcome::Failed(
                FailureReport::new(FailureCategory::InvalidSpecification, message)
                    .at_stage(StageKind::Intake),
            );
        }
        let normalized = intake.normalized.unwrap_or_else(|| spec.clone());

        reporter.status_changed(TaskStatus::Searching).await;

        let exploration = match self
            .call(StageKind::Search, self.stages.search.search(&normalized))
            .await
        {
            Ok(exploration) => exploration,
            Err(failure) => return EngineOutcome::Failed(failure.into_report(0)),
        };

        let plan = match self
            .call(
                StageKind::Plan,
                self.stages.plan.plan(&normalized, &exploration),
            )
            .await
        {
            Ok(plan) => plan,
            Err(failure) => return EngineOutcome::Failed(failure.into_report(0)),
        };
        drop(exploration);

        let max_iterations = self.config.max_iterations.max(1);
        let mut ctx = IterationContext::first();
        let mut partial = None;

        loop {
            let iteration = ctx.iteration;
            debug!("Starting iteration {}/{}", iteration, max_iterations);
            reporter.iteration_started(iteration, max_iterations).await;
            reporter.status_changed(TaskStatus::Implementing).await;

            // Always from the plan; the previous candidate is never fed back.
            let candidate = match self
                .call(
                    StageKind::Implement,
                    async {
                        let candidate = self
                            .stages
                            .implement
                            .implement(&plan, ctx.feedback.as_ref())
                            .await?;
                        candidate.check()?;
                        Ok::<_, StageError>(candidate)
                    },
                )
                .await
            {
                Ok(candidate) => candidate,
                Err(failure) => {
                    return EngineOutcome::Failed(
                        failure.into_report(iteration).with_partial(partial),
                    )
                }
            };
            partial = Some(candidate.clone());
            ctx.candidate = Some(candidate.clone());

            reporter.status_changed(TaskStatus::Executing).await;

            let verification = match self
                .call(StageKind::Verify, self.stages.verify.verify(&candidate))
                .await
            {
                Ok(verification) => verification,
                Err(failure) => {
                    return EngineOutcome::Failed(
                        failure.into_report(iteration).with_partial(partial),
                    )
                }
            };
            ctx.verification = Some(verification.clone());

            let review = if verification.total() == 0 {
                debug!("Verification executed no checks, rejecting without review");
                Review::no_checks_executed()
            } else {
                match self
                    .call(
                        StageKind::Review,
                        self.stages.review.review(&candidate, &verification),
                    )
                    .await
                {
                    Ok(review) => review,
                    Err(failure) => {
                        return EngineOutcome::Failed(
                            failure.into_report(iteration).with_partial(partial),
                        )
                    }
                }
            };
            ctx.review = Some(review.clone());

            if review.approved {
                info!(
                    "Candidate '{}' approved on iteration {}",
                    candidate.name, iteration
                );
                return EngineOutcome::Approved {
                    candidate,
                    verification,
                    review,
                    iterations: iteration,
                };
            }

            if iteration >= max_iterations {
                let message = format!(
                    "No approved artifact after {} iterations. Last review: {}",
                    iteration,
                    review_digest(&review)
                );
                info!("{}", message);
                return EngineOutcome::Failed(
                    FailureReport::new(FailureCategory::MaxIterationsExceeded, message)
                        .at_stage(StageKind::Review)
                        .after(iteration)
                        .with_partial(partial),
                );
            }

            let feedback = match self
                .call(
                    StageKind::Summarize,
                    self.stages
                        .summarize
                        .summarize(iteration, &verification, &review),
                )
                .await
            {
                Ok(feedback) => feedback.clamp(self.config.summary_max_chars),
                Err(failure) => {
                    return EngineOutcome::Failed(
                        failure.into_report(iteration).with_partial(partial),
                    )
                }
            };

            debug!(
                "Iteration {} rejected, carrying {} chars of feedback",
                iteration,
                feedback.char_len()
            );
            ctx = ctx.advance(feedback);
        }
    }
}

/// One-line account of a rejection for failure messages.
fn review_digest(review: &Review) -> String {
    if !review.summary.trim().is_empty() {
        return review.summary.clone();
    }
    if !review.issues.is_empty() {
        return review.issues.join("; ");
    }
    "rejected without a summary".to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{MockStages, RecordingReporter};

    fn engine(stages: Arc<MockStages>, max_iterations: u32) -> RefinementEngine {
        RefinementEngine::new(
            StageSet::uniform(stages),
            EngineConfig {
                max_iterations,
                stage_timeout_secs: 5,
                summary_max_chars: 200,
            },
        )
    }

    fn spec() -> Specification {
        Specification::new("Convert CSV to JSON")
    }

    #[tokio::test]
    async fn test_always_reject_uses_exactly_max_iterations() {
        let stages = Arc::new(MockStages::new().never_approve());
        let reporter = RecordingReporter::new();

        let outcome = engine(stages.clone(), 3).run(&spec(), &reporter).await;

        assert_eq!(stages.calls(StageKind::Implement), 3);
        assert_eq!(stages.calls(StageKind::Summarize), 2);
        match outcome {
            EngineOutcome::Failed(report) => {
                assert_eq!(report.category, FailureCategory::MaxIterationsExceeded);
                assert_eq!(report.iterations, 3);
                assert!(report.message.contains("Rejected on iteration 3"));
                assert!(report.partial.is_some());
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_approve_on_second_iteration() {
        let stages = Arc::new(MockStages::new().approve_on(2));
        let reporter = RecordingReporter::new();

        let outcome = engine(stages.clone(), 3).run(&spec(), &reporter).await;

        assert_eq!(stages.calls(StageKind::Implement), 2);
        match outcome {
            EngineOutcome::Approved {
                iterations,
                candidate,
                ..
            } => {
                assert_eq!(iterations, 2);
                assert_eq!(candidate.metadata["iteration"], 2);
            }
            other => panic!("expected approval, got {:?}", other),
        }
        assert_eq!(reporter.iterations(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_feedback_only_from_second_iteration() {
        let stages = Arc::new(MockStages::new().approve_on(3));
        let reporter = RecordingReporter::new();

        engine(stages.clone(), 3).run(&spec(), &reporter).await;

        let feedback = stages.implement_feedback();
        assert_eq!(feedback.len(), 3);
        assert!(feedback[0].is_none());
        assert_eq!(feedback[1].as_ref().unwrap().iteration, 1);
        assert_eq!(feedback[2].as_ref().unwrap().iteration, 2);
    }

    #[tokio::test]
    async fn test_feedback_is_clamped() {
        let stages = Arc::new(MockStages::new().approve_on(2).with_summary_len(10_000));
        let reporter = RecordingReporter::new();

        engine(stages.clone(), 3).run(&spec(), &reporter).await;

        let feedback = stages.implement_feedback();
        assert!(feedback[1].as_ref().unwrap().char_len() <= 200);
    }

    #[tokio::test]
    async fn test_invalid_intake_spends_no_iteration() {
        let stages = Arc::new(MockStages::new().reject_intake("out of domain"));
        let reporter = RecordingReporter::new();

        let outcome = engine(stages.clone(), 3).run(&spec(), &reporter).await;

        assert_eq!(stages.calls(StageKind::Implement), 0);
        assert_eq!(stages.calls(StageKind::Search), 0);
        match outcome {
            EngineOutcome::Failed(report) => {
                assert_eq!(report.category, FailureCategory::InvalidSpecification);
                assert_eq!(report.iterations, 0);
                assert_eq!(report.message, "out of domain");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(reporter.statuses(), vec![TaskStatus::Planning]);
    }

    #[tokio::test]
    async fn test_prefix_stage_error_is_fatal() {
        let stages = Arc::new(
            MockStages::new().fail_stage(StageKind::Plan, StageError::Failed("no plan".into())),
        );
        let reporter = RecordingReporter::new();

        let outcome = engine(stages.clone(), 3).run(&spec(), &reporter).await;

        assert_eq!(stages.calls(StageKind::Plan), 1);
        assert_eq!(stages.calls(StageKind::Implement), 0);
        match outcome {
            EngineOutcome::Failed(report) => {
                assert_eq!(report.category, FailureCategory::StageError);
                assert_eq!(report.stage, Some(StageKind::Plan));
                assert_eq!(report.iterations, 0);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_loop_stage_error_consumes_iteration_and_stops() {
        let stages = Arc::new(MockStages::new().never_approve().fail_stage(
            StageKind::Verify,
            StageError::Transport("connection reset".into()),
        ));
        let reporter = RecordingReporter::new();

        let outcome = engine(stages.clone(), 3).run(&spec(), &reporter).await;

        assert_eq!(stages.calls(StageKind::Implement), 1);
        assert_eq!(stages.calls(StageKind::Review), 0);
        match outcome {
            EngineOutcome::Failed(report) => {
                assert_eq!(report.category, FailureCategory::StageError);
                assert_eq!(report.stage, Some(StageKind::Verify));
                assert_eq!(report.iterations, 1);
                assert!(report.partial.is_some());
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_checks_is_rejection_without_review() {
        let stages = Arc::new(MockStages::new().approve_on(1).with_zero_checks());
        let reporter = RecordingReporter::new();

        let outcome = engine(stages.clone(), 2).run(&spec(), &reporter).await;

        assert_eq!(stages.calls(StageKind::Review), 0);
        assert_eq!(stages.calls(StageKind::Implement), 2);
        match outcome {
            EngineOutcome::Failed(report) => {
                assert_eq!(report.category, FailureCategory::MaxIterationsExceeded);
                assert!(report.message.contains("No verification checks"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_candidate_is_stage_error() {
        let stages = Arc::new(MockStages::new().approve_on(1).with_empty_candidates());
        let reporter = RecordingReporter::new();

        let outcome = engine(stages.clone(), 3).run(&spec(), &reporter).await;

        assert_eq!(stages.calls(StageKind::Verify), 0);
        match outcome {
            EngineOutcome::Failed(report) => {
                assert_eq!(report.category, FailureCategory::StageError);
                assert_eq!(report.stage, Some(StageKind::Implement));
                assert!(report.message.contains("malformed"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_timeout_is_stage_error() {
        let stages = Arc::new(MockStages::new().approve_on(1).block_verify());
        let reporter = RecordingReporter::new();

        let outcome = engine(stages.clone(), 3).run(&spec(), &reporter).await;

        match outcome {
            EngineOutcome::Failed(report) => {
                assert_eq!(report.category, FailureCategory::StageError);
                assert_eq!(report.stage, Some(StageKind::Verify));
                assert!(report.message.contains("timed out"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_sequence() {
        let stages = Arc::new(MockStages::new().approve_on(1));
        let reporter = RecordingReporter::new();

        engine(stages, 3).run(&spec(), &reporter).await;

        assert_eq!(
            reporter.statuses(),
            vec![
                TaskStatus::Planning,
                TaskStatus::Searching,
                TaskStatus::Implementing,
                TaskStatus::Executing,
            ]
        );
    }

    #[test]
    fn test_review_digest_fallbacks() {
        let review = Review {
            approved: false,
            summary: String::new(),
            issues: vec!["a".to_string(), "b".to_string()],
            required_changes: vec![],
        };
        assert_eq!(review_digest(&review), "a; b");
        assert_eq!(
            review_digest(&Review::default()),
            "rejected without a summary"
        );
    }
}
