//! Jobs: batches of independent artifact requests and their progress counters.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteJobStore;
pub use store::{CreateJobRequest, JobError, JobFilter, JobStore};
pub use types::{new_public_job_id, CounterDelta, Job, JobCounters, JobStatus};
