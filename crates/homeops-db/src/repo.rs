//! Repository traits and implementations.

pub mod instance;
pub mod task;
pub mod update_history;

pub use instance::{InstanceRecord, InstanceRepo, SqliteInstanceRepo};
pub use task::{SqliteTaskRepo, TaskLogRecord, TaskRecord, TaskRepo};
pub use update_history::{SqliteUpdateHistoryRepo, UpdateHistoryRecord, UpdateHistoryRepo};
