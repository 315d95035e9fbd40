//! Mock stage collaborators for testing.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::stages::{
    Candidate, Exploration, FeedbackSummary, ImplementStage, IntakeResult, IntakeStage, Plan,
    PlanStage, Review, ReviewStage, SearchStage, Specification, StageError, StageKind,
    SummarizeStage, Verification, VerifyStage,
};

/// Mock implementation of every stage.
///
/// Behaviour is configured up front with builder methods:
/// - Approve on a given iteration, or never
/// - Reject or panic for specifications whose description contains a marker
/// - Fail any stage with a fixed error
/// - Report zero checks, empty candidates or oversized summaries
/// - Delay or block verification
///
/// The review decision is derived from the iteration recorded in the
/// candidate's metadata, so one instance can serve many tasks at once.
///
/// # Example
///
/// ```rust,ignore
/// use forge_core::testing::MockStages;
///
/// let stages = Arc::new(MockStages::new().approve_on(2));
/// let engine = RefinementEngine::new(StageSet::uniform(stages.clone()), config);
///
/// engine.run(&spec, &reporter).await;
/// assert_eq!(stages.calls(StageKind::Implement), 2);
/// ```
pub struct MockStages {
    /// Iteration on which review approves. `None` never approves.
    approve_on: Option<u32>,
    /// Intake rejects every specification with this message.
    intake_error: Option<String>,
    /// Intake rejects descriptions containing this marker.
    reject_marker: Option<String>,
    /// Review never approves descriptions containing this marker.
    never_marker: Option<String>,
    /// Implement panics for descriptions containing this marker.
    panic_marker: Option<String>,
    /// Stages that always fail with the given error.
    failures: HashMap<StageKind, StageError>,
    zero_checks: bool,
    empty_candidates: bool,
    summary_len: usize,
    verify_delay: Option<Duration>,
    /// Verification never returns for descriptions containing this marker.
    block_marker: Option<String>,
    /// Signalled each time verification starts.
    verify_entered: Arc<Notify>,
    calls: Mutex<HashMap<StageKind, u32>>,
    feedback: Mutex<Vec<Option<FeedbackSummary>>>,
    verify_in_flight: AtomicUsize,
    verify_max_in_flight: AtomicUsize,
}

impl std::fmt::Debug for MockStages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStages")
            .field("approve_on", &self.approve_on)
            .field("failures", &self.failures)
            .field("zero_checks", &self.zero_checks)
            .field("block_marker", &self.block_marker)
            .finish()
    }
}

impl Default for MockStages {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStages {
    /// Create mock stages that approve the first candidate.
    pub fn new() -> Self {
        Self {
            approve_on: Some(1),
            intake_error: None,
            reject_marker: None,
            never_marker: None,
            panic_marker: None,
            failures: HashMap::new(),
            zero_checks: false,
            empty_candidates: false,
            summary_len: 40,
            verify_delay: None,
            block_marker: None,
            verify_entered: Arc::new(Notify::new()),
            calls: Mutex::new(HashMap::new()),
            feedback: Mutex::new(Vec::new()),
            verify_in_flight: AtomicUsize::new(0),
            verify_max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn approve_on(mut self, iteration: u32) -> Self {
        self.approve_on = Some(iteration);
        self
    }

    pub fn never_approve(mut self) -> Self {
        self.approve_on = None;
        self
    }

    pub fn reject_intake(mut self, error: impl Into<String>) -> Self {
        self.intake_error = Some(error.into());
        self
    }

    pub fn reject_intake_containing(mut self, marker: impl Into<String>) -> Self {
        self.reject_marker = Some(marker.into());
        self
    }

    pub fn never_approve_containing(mut self, marker: impl Into<String>) -> Self {
        self.never_marker = Some(marker.into());
        self
    }

    pub fn panic_containing(mut self, marker: impl Into<String>) -> Self {
        self.panic_marker = Some(marker.into());
        self
    }

    pub fn fail_stage(mut self, stage: StageKind, error: StageError) -> Self {
        self.failures.insert(stage, error);
        self
    }

    pub fn with_zero_checks(mut self) -> Self {
        self.zero_checks = true;
        self
    }

    pub fn with_empty_candidates(mut self) -> Self {
        self.empty_candidates = true;
        self
    }

    /// Length of each text field produced by summarize.
    pub fn with_summary_len(mut self, len: usize) -> Self {
        self.summary_len = len;
        self
    }

    pub fn with_verify_delay(mut self, delay: Duration) -> Self {
        self.verify_delay = Some(delay);
        self
    }

    /// Verification never returns.
    pub fn block_verify(self) -> Self {
        self.block_verify_containing("")
    }

    /// Verification never returns for descriptions containing `marker`.
    pub fn block_verify_containing(mut self, marker: impl Into<String>) -> Self {
        self.block_marker = Some(marker.into());
        self
    }

    /// Notified whenever a verification call starts.
    pub fn verify_entered(&self) -> Arc<Notify> {
        self.verify_entered.clone()
    }

    /// Number of calls made to a stage.
    pub fn calls(&self, stage: StageKind) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(&stage)
            .copied()
            .unwrap_or(0)
    }

    /// Feedback passed to each implement call, in call order.
    pub fn implement_feedback(&self) -> Vec<Option<FeedbackSummary>> {
        self.feedback.lock().unwrap().clone()
    }

    /// Highest number of concurrent verification calls observed.
    pub fn max_verify_in_flight(&self) -> usize {
        self.verify_max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, stage: StageKind) -> Result<(), StageError> {
        *self.calls.lock().unwrap().entry(stage).or_insert(0) += 1;
        match self.failures.get(&stage) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn matches(marker: &Option<String>, description: &str) -> bool {
        marker
            .as_deref()
            .map(|m| description.contains(m))
            .unwrap_or(false)
    }

    fn approves(&self, candidate: &Candidate) -> bool {
        let description = candidate.metadata["description"].as_str().unwrap_or("");
        if Self::matches(&self.never_marker, description) {
            return false;
        }
        let iteration = candidate.metadata["iteration"].as_u64().unwrap_or(0) as u32;
        self.approve_on.map(|n| iteration >= n).unwrap_or(false)
    }
}

#[async_trait]
impl IntakeStage for MockStages {
    async fn intake(&self, spec: &Specification) -> Result<IntakeResult, StageError> {
        self.record(StageKind::Intake)?;
        if let Some(error) = &self.intake_error {
            return Ok(IntakeResult::rejected(error.clone()));
        }
        if Self::matches(&self.reject_marker, &spec.description) {
            return Ok(IntakeResult::rejected("Specification is out of scope"));
        }
        Ok(IntakeResult::accepted(spec.clone()))
    }
}

#[async_trait]
impl SearchStage for MockStages {
    async fn search(&self, spec: &Specification) -> Result<Exploration, StageError> {
        self.record(StageKind::Search)?;
        Ok(Exploration(json!({ "related": [], "query": spec.description })))
    }
}

#[async_trait]
impl PlanStage for MockStages {
    async fn plan(
        &self,
        spec: &Specification,
        _exploration: &Exploration,
    ) -> Result<Plan, StageError> {
        self.record(StageKind::Plan)?;
        Ok(Plan(json!({
            "description": spec.description,
            "steps": ["parse input", "transform", "emit output"],
        })))
    }
}

#[async_trait]
impl ImplementStage for MockStages {
    async fn implement(
        &self,
        plan: &Plan,
        feedback: Option<&FeedbackSummary>,
    ) -> Result<Candidate, StageError> {
        self.feedback.lock().unwrap().push(feedback.cloned());
        self.record(StageKind::Implement)?;

        let description = plan.0["description"].as_str().unwrap_or("").to_string();
        if Self::matches(&self.panic_marker, &description) {
            panic!("mock implement panicked for '{}'", description);
        }

        let iteration = feedback.map(|f| f.iteration + 1).unwrap_or(1);
        if self.empty_candidates {
            return Ok(Candidate {
                name: String::new(),
                description,
                content: String::new(),
                metadata: json!({ "iteration": iteration }),
            });
        }

        let name = description
            .split_whitespace()
            .take(3)
            .collect::<Vec<_>>()
            .join("_")
            .to_lowercase();
        Ok(Candidate {
            name: if name.is_empty() { "tool".to_string() } else { name },
            content: format!("// attempt {}\nfn run() {{}}\n", iteration),
            metadata: json!({ "iteration": iteration, "description": description }),
            description,
        })
    }
}

#[async_trait]
impl VerifyStage for MockStages {
    async fn verify(&self, candidate: &Candidate) -> Result<Verification, StageError> {
        self.record(StageKind::Verify)?;
        self.verify_entered.notify_one();

        let current = self.verify_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.verify_max_in_flight.fetch_max(current, Ordering::SeqCst);

        let description = candidate.metadata["description"].as_str().unwrap_or("");
        if Self::matches(&self.block_marker, description) {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.verify_delay {
            tokio::time::sleep(delay).await;
        }
        self.verify_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.zero_checks {
            return Ok(Verification::default());
        }
        if self.approves(candidate) {
            Ok(Verification {
                passed: 3,
                failed: 0,
                errors: 0,
                details: vec![],
            })
        } else {
            Ok(Verification {
                passed: 2,
                failed: 1,
                errors: 0,
                details: vec!["edge case: empty input".to_string()],
            })
        }
    }
}

#[async_trait]
impl ReviewStage for MockStages {
    async fn review(
        &self,
        candidate: &Candidate,
        _verification: &Verification,
    ) -> Result<Review, StageError> {
        self.record(StageKind::Review)?;
        let iteration = candidate.metadata["iteration"].as_u64().unwrap_or(0);
        if self.approves(candidate) {
            Ok(Review {
                approved: true,
                summary: format!("Approved on iteration {}", iteration),
                issues: vec![],
                required_changes: vec![],
            })
        } else {
            Ok(Review {
                approved: false,
                summary: format!("Rejected on iteration {}", iteration),
                issues: vec!["fails on empty input".to_string()],
                required_changes: vec!["handle empty input".to_string()],
            })
        }
    }
}

#[async_trait]
impl SummarizeStage for MockStages {
    async fn summarize(
        &self,
        iteration: u32,
        _verification: &Verification,
        _review: &Review,
    ) -> Result<FeedbackSummary, StageError> {
        self.record(StageKind::Summarize)?;
        let len = self.summary_len;
        Ok(FeedbackSummary {
            iteration,
            what_failed: "f".repeat(len),
            what_changed: "c".repeat(len),
            why_changed: "w".repeat(len),
            next_focus: "n".repeat(len),
        })
    }
}
