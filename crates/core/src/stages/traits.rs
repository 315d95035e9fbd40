//! Stage collaborator traits.
//!
//! Each stage is an independent async trait so that collaborators can be
//! swapped one at a time (e.g. a local verifier with a remote reviewer).

use std::sync::Arc;

use async_trait::async_trait;

use super::types::{
    Candidate, Exploration, FeedbackSummary, IntakeResult, Plan, Review, Specification,
    StageError, Verification,
};

/// Validates and normalizes a specification.
#[async_trait]
pub trait IntakeStage: Send + Sync {
    async fn intake(&self, spec: &Specification) -> Result<IntakeResult, StageError>;
}

/// Gathers context relevant to a normalized specification.
#[async_trait]
pub trait SearchStage: Send + Sync {
    async fn search(&self, spec: &Specification) -> Result<Exploration, StageError>;
}

/// Turns a specification and its exploration into an implementation plan.
#[async_trait]
pub trait PlanStage: Send + Sync {
    async fn plan(
        &self,
        spec: &Specification,
        exploration: &Exploration,
    ) -> Result<Plan, StageError>;
}

/// Produces a candidate artifact from the plan and, on retries, the prior feedback.
#[async_trait]
pub trait ImplementStage: Send + Sync {
    async fn implement(
        &self,
        plan: &Plan,
        feedback: Option<&FeedbackSummary>,
    ) -> Result<Candidate, StageError>;
}

/// Runs checks against a candidate.
#[async_trait]
pub trait VerifyStage: Send + Sync {
    async fn verify(&self, candidate: &Candidate) -> Result<Verification, StageError>;
}

/// Approves or rejects a verified candidate.
#[async_trait]
pub trait ReviewStage: Send + Sync {
    async fn review(
        &self,
        candidate: &Candidate,
        verification: &Verification,
    ) -> Result<Review, StageError>;
}

/// Compresses a rejected iteration into feedback for the next one.
#[async_trait]
pub trait SummarizeStage: Send + Sync {
    async fn summarize(
        &self,
        iteration: u32,
        verification: &Verification,
        review: &Review,
    ) -> Result<FeedbackSummary, StageError>;
}

/// A collaborator implementing every stage.
pub trait AllStages:
    IntakeStage
    + SearchStage
    + PlanStage
    + ImplementStage
    + VerifyStage
    + ReviewStage
    + SummarizeStage
{
}

impl<T> AllStages for T where
    T: IntakeStage
        + SearchStage
        + PlanStage
        + ImplementStage
        + VerifyStage
        + ReviewStage
        + SummarizeStage
{
}

/// The collaborators used by the refinement engine, one per stage.
#[derive(Clone)]
pub struct StageSet {
    pub intake: Arc<dyn IntakeStage>,
    pub search: Arc<dyn SearchStage>,
    pub plan: Arc<dyn PlanStage>,
    pub implement: Arc<dyn ImplementStage>,
    pub verify: Arc<dyn VerifyStage>,
    pub review: Arc<dyn ReviewStage>,
    pub summarize: Arc<dyn SummarizeStage>,
}

impl StageSet {
    /// Use one collaborator for every stage.
    pub fn uniform<S: AllStages + 'static>(stages: Arc<S>) -> Self {
        Self {
            intake: stages.clone(),
            search: stages.clone(),
            plan: stages.clone(),
            implement: stages.clone(),
            verify: stages.clone(),
            review: stages.clone(),
            summarize: stages,
        }
    }

    /// Replace the verification collaborator.
    pub fn with_verify(mut self, verify: Arc<dyn VerifyStage>) -> Self {
        self.verify = verify;
        self
    }

    /// Replace the review collaborator.
    pub fn with_review(mut self, review: Arc<dyn ReviewStage>) -> Self {
        self.review = review;
        self
    }
}
