//! Best-effort progress events for jobs and tasks.
//!
//! Events flow through a bounded channel into a background writer. Nothing
//! on the emitting side depends on delivery.

mod events;
mod handle;
mod sqlite;
mod store;
mod writer;

pub use events::*;
pub use handle::*;
pub use sqlite::*;
pub use store::*;
pub use writer::*;

pub(crate) use handle::emit;
