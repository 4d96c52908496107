//! Update job types.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    #[display("running")]
    Running,
    #[display("success")]
    Success,
    #[display("failed")]
    Failed,
}

impl UpdateStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UpdateStatus::Running)
    }
}

/// A pull-and-recreate run for one service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateJob {
    pub id: ResourceId,
    pub service: String,
    pub status: UpdateStatus,
    pub started: DateTime<Utc>,
    pub output: String,
    pub completed: Option<DateTime<Utc>>,
}

impl UpdateJob {
    pub fn start(service: &str) -> Self {
        Self {
            id: ResourceId::new(),
            service: service.to_string(),
            status: UpdateStatus::Running,
            started: Utc::now(),
            output: String::new(),
            completed: None,
        }
    }

    pub fn log(&mut self, line: impl AsRef<str>) {
        self.output.push_str(line.as_ref());
        self.output.push('\n');
    }

    pub fn finish(&mut self, status: UpdateStatus) {
        self.status = status;
        self.completed = Some(Utc::now());
    }

    /// Whether the job finished before `cutoff`.
    pub fn finished_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.completed.is_some_and(|done| done < cutoff)
    }
}

/// A finished update as persisted in the history table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub id: String,
    pub service: String,
    pub host: Option<String>,
    pub status: String,
    /// Who or what started the update, e.g. `api` or `cli`.
    pub triggered_by: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: String,
}
