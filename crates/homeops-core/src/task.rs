//! Task queue types.
//!
//! Tasks are submitted by people, claimed by worker instances and moved
//! through a small state machine:
//!
//! ```text
//! pending ──claim──▶ in_progress ──complete──▶ completed
//!    │                   │  │
//!    │ cancel            │  └──fail──▶ failed
//!    ▼                   │
//! cancelled              └──reset / release──▶ pending
//! ```

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::Error;

/// Database-assigned task identifier.
pub type TaskId = i64;

/// Task priority. Lower rank is served first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[display("high")]
    High,
    #[default]
    #[display("medium")]
    Medium,
    #[display("low")]
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Position in the queue ordering: high=1, medium=2, low=3.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(Error::InvalidInput(format!("unknown priority '{}'", other))),
        }
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[display("pending")]
    Pending,
    #[display("in_progress")]
    InProgress,
    #[display("completed")]
    Completed,
    #[display("failed")]
    Failed,
    #[display("cancelled")]
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether a task may move from `self` to `next`.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Pending)
        )
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(Error::InvalidInput(format!("unknown task status '{}'", other))),
        }
    }
}

/// Filter for listing tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    /// Tasks in one state, in queue order.
    Only(TaskStatus),
    /// The most recent tasks regardless of state, newest first.
    All,
}

impl Default for StatusFilter {
    fn default() -> Self {
        StatusFilter::Only(TaskStatus::Pending)
    }
}

impl FromStr for StatusFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            Ok(StatusFilter::All)
        } else {
            s.parse().map(StatusFilter::Only)
        }
    }
}

/// A queued unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub instance_id: Option<String>,
    pub instance_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub submitted_by: Option<String>,
}

/// A new task as submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    pub submitted_by: Option<String>,
}

impl NewTask {
    pub fn validate(&self) -> crate::Result<()> {
        if self.description.trim().is_empty() {
            return Err(Error::InvalidInput("description is required".to_string()));
        }
        Ok(())
    }
}

/// A worker's change to a task: new notes, a new status, or both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub instance_id: Option<String>,
    pub notes: Option<String>,
    pub status: Option<TaskStatus>,
}

impl TaskUpdate {
    pub fn validate(&self) -> crate::Result<()> {
        if self.notes.is_none() && self.status.is_none() {
            return Err(Error::InvalidInput(
                "at least one of notes or status is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// The worker instance acting on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRef {
    pub id: String,
    pub name: String,
}

impl InstanceRef {
    /// Build a reference, falling back to `unknown` for the id and to the
    /// id for the display name.
    pub fn new(id: Option<String>, name: Option<String>) -> Self {
        let id = id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        let name = name.filter(|s| !s.trim().is_empty()).unwrap_or_else(|| id.clone());
        Self { id, name }
    }
}

/// Audit actions recorded in the task log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    #[display("created")]
    Created,
    #[display("claimed")]
    Claimed,
    #[display("updated")]
    Updated,
    #[display("completed")]
    Completed,
    #[display("failed")]
    Failed,
    #[display("cancelled")]
    Cancelled,
    #[display("priority_changed")]
    PriorityChanged,
    #[display("reset")]
    Reset,
    #[display("released")]
    Released,
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskAction::Created => "created",
            TaskAction::Claimed => "claimed",
            TaskAction::Updated => "updated",
            TaskAction::Completed => "completed",
            TaskAction::Failed => "failed",
            TaskAction::Cancelled => "cancelled",
            TaskAction::PriorityChanged => "priority_changed",
            TaskAction::Reset => "reset",
            TaskAction::Released => "released",
        }
    }
}

/// One entry of a task's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLogEntry {
    pub id: i64,
    pub task_id: TaskId,
    pub action: String,
    pub details: Option<String>,
    pub instance_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate queue counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
    pub completed_last_24h: i64,
    pub active_instances: i64,
}

/// Result of completing a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub task: Task,
    /// The new head of the pending queue, if any.
    pub next_task: Option<Task>,
}

/// Truncate a description for one-line display.
pub fn summarize(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_rank_orders_high_first() {
        let mut priorities = vec![Priority::Low, Priority::High, Priority::Medium];
        priorities.sort_by_key(|p| p.rank());
        assert_eq!(priorities, vec![Priority::High, Priority::Medium, Priority::Low]);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(" low ".parse::<Priority>().unwrap(), Priority::Low);
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_status_transitions() {
        use TaskStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Failed));
        assert!(InProgress.can_transition_to(Pending));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(Cancelled));
        for terminal in [Completed, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for next in [Pending, InProgress, Completed, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_status_string_forms_agree() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(status.to_string(), status.as_str());
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn test_status_filter_parse() {
        assert_eq!("all".parse::<StatusFilter>().unwrap(), StatusFilter::All);
        assert_eq!(
            "in_progress".parse::<StatusFilter>().unwrap(),
            StatusFilter::Only(TaskStatus::InProgress)
        );
        assert!("done".parse::<StatusFilter>().is_err());
        assert_eq!(
            StatusFilter::default(),
            StatusFilter::Only(TaskStatus::Pending)
        );
    }

    #[test]
    fn test_new_task_requires_description() {
        let task = NewTask {
            description: "   ".to_string(),
            priority: Priority::High,
            submitted_by: None,
        };
        assert!(matches!(task.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_new_task_priority_defaults_to_medium() {
        let task: NewTask = serde_json::from_str(r#"{"description":"fix dns"}"#).unwrap();
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.submitted_by.is_none());
    }

    #[test]
    fn test_task_update_requires_a_change() {
        assert!(TaskUpdate::default().validate().is_err());
        let update: TaskUpdate =
            serde_json::from_str(r#"{"instance_id":"w1","status":"failed"}"#).unwrap();
        assert_eq!(update.status, Some(TaskStatus::Failed));
        assert!(update.validate().is_ok());
    }

    #[test]
    fn test_instance_ref_fallbacks() {
        let anon = InstanceRef::new(None, None);
        assert_eq!(anon.id, "unknown");
        assert_eq!(anon.name, "unknown");

        let named = InstanceRef::new(Some("worker-1".to_string()), Some(String::new()));
        assert_eq!(named.name, "worker-1");
    }

    #[test]
    fn test_summarize() {
        assert_eq!(summarize("short", 10), "short");
        assert_eq!(summarize("abcdefghij", 4), "abcd...");
    }
}
