//! Task scheduling for homeops.
//!
//! Wraps the task repository with notifications and runs the background
//! sweep that returns abandoned tasks to the queue.

pub mod notify;
pub mod queue;
pub mod sweeper;

pub use notify::{
    EventSender, LogNotifier, Notifier, TaskEvent, WebhookNotifier, dispatch, event_channel,
};
pub use queue::TaskQueue;
pub use sweeper::StaleSweeper;
