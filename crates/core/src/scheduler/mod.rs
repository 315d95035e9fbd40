//! Task scheduler for job execution.
//!
//! The scheduler drives every task of a job to an outcome:
//! - **Launch**: one supervised run per specification, counted before it starts
//! - **Limit**: a FIFO semaphore bounds how many runs execute at once
//! - **Aggregate**: outcomes update job counters atomically; the last one completes the job

mod aggregator;
mod limiter;
mod runner;
mod types;

pub use aggregator::JobAggregator;
pub use limiter::{ConcurrencyLimiter, LimiterClosed, LimiterStatus, SlotGuard};
pub use runner::TaskScheduler;
pub use types::{SchedulerError, SchedulerStatus, SchedulerStores};
