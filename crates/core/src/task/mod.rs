//! Tasks: one specification driven through the refinement pipeline.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteTaskStore;
pub use store::{CreateTaskRequest, TaskError, TaskFilter, TaskStore};
pub use types::{new_public_task_id, OutcomeRef, Task, TaskStatus};
