//! Types for the refinement engine.

use async_trait::async_trait;

use crate::outcome::FailureCategory;
use crate::stages::{Candidate, FeedbackSummary, Review, StageKind, Verification};
use crate::task::TaskStatus;

/// Receives status changes from an engine run.
///
/// Implementations persist or publish the progress; they must not fail the run.
#[async_trait]
pub trait TaskReporter: Send + Sync {
    /// The run entered a new pipeline phase.
    async fn status_changed(&self, status: TaskStatus);

    /// A refinement iteration is starting (1-based).
    async fn iteration_started(&self, iteration: u32, max_iterations: u32);
}

/// State of the iteration currently being executed.
///
/// Only the feedback summary survives `advance`; the candidate, verification
/// and review of a rejected iteration are dropped.
#[derive(Debug, Clone, Default)]
pub struct IterationContext {
    pub iteration: u32,
    pub candidate: Option<Candidate>,
    pub verification: Option<Verification>,
    pub review: Option<Review>,
    pub feedback: Option<FeedbackSummary>,
}

impl IterationContext {
    /// Context for iteration 1.
    pub fn first() -> Self {
        Self {
            iteration: 1,
            ..Default::default()
        }
    }

    /// Context for the next iteration, carrying forward only `feedback`.
    pub fn advance(self, feedback: FeedbackSummary) -> Self {
        Self {
            iteration: self.iteration + 1,
            candidate: None,
            verification: None,
            review: None,
            feedback: Some(feedback),
        }
    }
}

/// Why a run failed.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub category: FailureCategory,
    pub message: String,
    /// Stage responsible for the failure, if any.
    pub stage: Option<StageKind>,
    /// Iterations consumed (0 when the one-shot prefix failed).
    pub iterations: u32,
    /// Last candidate produced before the failure.
    pub partial: Option<Candidate>,
}

impl FailureReport {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            stage: None,
            iterations: 0,
            partial: None,
        }
    }

    pub fn at_stage(mut self, stage: StageKind) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn after(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_partial(mut self, partial: Option<Candidate>) -> Self {
        self.partial = partial;
        self
    }
}

/// Terminal result of one engine run.
#[derive(Debug, Clone)]
pub enum EngineOutcome {
    Approved {
        candidate: Candidate,
        verification: Verification,
        review: Review,
        iterations: u32,
    },
    Failed(FailureReport),
}

impl EngineOutcome {
    pub fn iterations(&self) -> u32 {
        match self {
            EngineOutcome::Approved { iterations, .. } => *iterations,
            EngineOutcome::Failed(report) => report.iterations,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, EngineOutcome::Approved { .. })
    }
}
