//! Values exchanged with stage collaborators.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single requested artifact, as described by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specification {
    /// What the artifact should do.
    pub description: String,
    /// Natural language description of the expected input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Natural language description of the expected output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Specification {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            input: None,
            output: None,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}

/// Result of the intake/validation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeResult {
    pub valid: bool,
    /// Normalized specification. Falls back to the submitted one when absent.
    #[serde(default)]
    pub normalized: Option<Specification>,
    /// Why the specification was rejected.
    #[serde(default)]
    pub error: Option<String>,
}

impl IntakeResult {
    pub fn accepted(normalized: Specification) -> Self {
        Self {
            valid: true,
            normalized: Some(normalized),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            normalized: None,
            error: Some(error.into()),
        }
    }
}

/// Opaque output of the search stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Exploration(pub Value);

/// Opaque output of the planning stage. Every implementation round starts from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan(pub Value);

/// A generated artifact awaiting verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Artifact name. Success records are deduplicated by it.
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
}

impl Candidate {
    /// Reject candidates that cannot be stored or verified.
    pub fn check(&self) -> Result<(), StageError> {
        if self.name.trim().is_empty() {
            return Err(StageError::Malformed("candidate has no name".to_string()));
        }
        if self.content.is_empty() {
            return Err(StageError::Malformed(format!(
                "candidate '{}' has no content",
                self.name
            )));
        }
        Ok(())
    }
}

/// Structured outcome of the verification stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub passed: u32,
    pub failed: u32,
    pub errors: u32,
    #[serde(default)]
    pub details: Vec<String>,
}

impl Verification {
    /// Number of checks that actually ran.
    pub fn total(&self) -> u32 {
        self.passed + self.failed + self.errors
    }

    pub fn all_passed(&self) -> bool {
        self.total() > 0 && self.failed == 0 && self.errors == 0
    }
}

/// Decision of the review stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub approved: bool,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub required_changes: Vec<String>,
}

impl Review {
    /// Rejection issued without consulting the reviewer when nothing was verified.
    pub fn no_checks_executed() -> Self {
        Self {
            approved: false,
            summary: "No verification checks were executed".to_string(),
            issues: vec!["verification reported zero executed checks".to_string()],
            required_changes: vec![
                "Make the artifact verifiable so at least one check runs".to_string(),
            ],
        }
    }
}

/// Compressed, fixed-shape feedback carried from one iteration to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub iteration: u32,
    #[serde(default)]
    pub what_failed: String,
    #[serde(default)]
    pub what_changed: String,
    #[serde(default)]
    pub why_changed: String,
    #[serde(default)]
    pub next_focus: String,
}

impl FeedbackSummary {
    /// Total characters across the text fields.
    pub fn char_len(&self) -> usize {
        self.fields().iter().map(|f| f.chars().count()).sum()
    }

    /// Shrink the summary so that `char_len() <= max_chars`.
    ///
    /// The budget is split evenly across the four fields; slack left by
    /// short fields is handed to the remaining ones in order.
    pub fn clamp(mut self, max_chars: usize) -> Self {
        if self.char_len() <= max_chars {
            return self;
        }

        let mut remaining = max_chars;
        let mut fields_left = 4;
        for field in [
            &mut self.what_failed,
            &mut self.what_changed,
            &mut self.why_changed,
            &mut self.next_focus,
        ] {
            let share = remaining / fields_left;
            let len = field.chars().count();
            if len > share {
                *field = truncate_chars(field, share);
            }
            remaining -= field.chars().count();
            fields_left -= 1;
        }
        self
    }

    fn fields(&self) -> [&str; 4] {
        [
            &self.what_failed,
            &self.what_changed,
            &self.why_changed,
            &self.next_focus,
        ]
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let count = s.chars().count();
    if count <= max {
        return s.to_string();
    }
    // Reserve one char for the ellipsis marker.
    let mut out: String = s.chars().take(max - 1).collect();
    out.push('…');
    out
}

/// Identifies a stage for logging, metrics and failure records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Intake,
    Search,
    Plan,
    Implement,
    Verify,
    Review,
    Summarize,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Intake => "intake",
            StageKind::Search => "search",
            StageKind::Plan => "plan",
            StageKind::Implement => "implement",
            StageKind::Verify => "verify",
            StageKind::Review => "review",
            StageKind::Summarize => "summarize",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by stage collaborators.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StageError {
    #[error("stage failed: {0}")]
    Failed(String),

    #[error("malformed stage response: {0}")]
    Malformed(String),

    #[error("stage timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}
