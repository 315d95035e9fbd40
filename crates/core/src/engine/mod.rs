//! Iterative refinement engine.
//!
//! Runs the fixed stage sequence for a single task:
//! - **Prefix** (once): intake, search, plan. Any failure is fatal.
//! - **Loop** (at most `max_iterations`): implement, verify, review, then
//!   summarize the rejection into bounded feedback for the next round.

mod runner;
mod types;

pub use runner::RefinementEngine;
pub use types::{EngineOutcome, FailureReport, IterationContext, TaskReporter};
