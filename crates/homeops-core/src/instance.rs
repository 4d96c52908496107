//! Worker instance registry types.

use chrono::{DateTime, Duration, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::Error;
use crate::task::TaskId;

/// Instances seen within this many minutes are reported as active.
pub const ACTIVE_THRESHOLD_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    #[display("idle")]
    Idle,
    #[display("working")]
    Working,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Idle => "idle",
            InstanceStatus::Working => "working",
        }
    }
}

impl FromStr for InstanceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(InstanceStatus::Idle),
            "working" => Ok(InstanceStatus::Working),
            other => Err(Error::InvalidInput(format!("unknown instance status '{}'", other))),
        }
    }
}

/// A worker that has checked in with the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub current_task_id: Option<TaskId>,
    pub status: InstanceStatus,
}

impl Instance {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now - self.last_seen < Duration::minutes(ACTIVE_THRESHOLD_MINUTES)
    }

    pub fn minutes_since_seen(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_seen).num_minutes().max(0)
    }
}

/// An instance joined with the description of the task it works on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceView {
    #[serde(flatten)]
    pub instance: Instance,
    pub task_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(now: DateTime<Utc>, seen_minutes_ago: i64) -> Instance {
        Instance {
            id: "worker-1".to_string(),
            name: None,
            last_seen: now - Duration::minutes(seen_minutes_ago),
            current_task_id: None,
            status: InstanceStatus::Idle,
        }
    }

    #[test]
    fn test_activity_window() {
        let now = Utc::now();
        assert!(instance(now, 1).is_active(now));
        assert!(!instance(now, 10).is_active(now));
        assert_eq!(instance(now, 10).minutes_since_seen(now), 10);
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let mut inst = instance(Utc::now(), 0);
        assert_eq!(inst.display_name(), "worker-1");
        inst.name = Some("Desktop".to_string());
        assert_eq!(inst.display_name(), "Desktop");
    }
}
