//! Stage collaborators for the refinement engine.
//!
//! The engine never inspects what a stage produces beyond the structured
//! fields it needs to drive the state machine (validity, check counts,
//! approval). Everything else is opaque and passed through.

mod http;
mod traits;
mod types;

pub use http::HttpStageClient;
pub use traits::{
    AllStages, ImplementStage, IntakeStage, PlanStage, ReviewStage, SearchStage, StageSet,
    SummarizeStage, VerifyStage,
};
pub use types::{
    Candidate, Exploration, FeedbackSummary, IntakeResult, Plan, Review, Specification,
    StageError, StageKind, Verification,
};
