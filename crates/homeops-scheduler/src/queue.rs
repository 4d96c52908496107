//! The task queue service.

use chrono::{DateTime, Utc};
use homeops_config::QueueConfig;
use homeops_core::instance::{Instance, InstanceView};
use homeops_core::task::{
    Completion, InstanceRef, NewTask, Priority, QueueStats, StatusFilter, Task, TaskId,
    TaskLogEntry, TaskStatus, TaskUpdate,
};
use homeops_core::{Error, Result};
use homeops_db::{InstanceRepo, TaskRepo};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::notify::{EventSender, TaskEvent};

/// Task queue operations with notifications.
pub struct TaskQueue {
    tasks: Arc<dyn TaskRepo>,
    instances: Arc<dyn InstanceRepo>,
    events: EventSender,
    config: QueueConfig,
}

impl TaskQueue {
    pub fn new(
        tasks: Arc<dyn TaskRepo>,
        instances: Arc<dyn InstanceRepo>,
        events: EventSender,
        config: QueueConfig,
    ) -> Self {
        Self {
            tasks,
            instances,
            events,
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub async fn submit(&self, new: NewTask) -> Result<Task> {
        new.validate()?;
        let task = self.tasks.create(&new).await?;
        info!(task_id = task.id, priority = %task.priority, "Task submitted");
        self.events.emit(TaskEvent::Created { task: task.clone() });
        Ok(task)
    }

    pub async fn get(&self, id: TaskId) -> Result<Task> {
        Ok(self.tasks.get(id).await?)
    }

    pub async fn list(&self, filter: StatusFilter) -> Result<Vec<Task>> {
        Ok(self.tasks.list(filter, self.config.recent_limit).await?)
    }

    pub async fn active(&self) -> Result<Vec<Task>> {
        Ok(self.tasks.active().await?)
    }

    pub async fn peek_next(&self) -> Result<Option<Task>> {
        Ok(self.tasks.peek_next().await?)
    }

    pub async fn claim(&self, id: TaskId, instance: &InstanceRef) -> Result<Task> {
        let task = self.tasks.claim(id, instance).await?;
        info!(task_id = id, instance_id = %instance.id, "Task claimed");
        self.events.emit(TaskEvent::Claimed { task: task.clone() });
        Ok(task)
    }

    pub async fn claim_next(&self, instance: &InstanceRef) -> Result<Option<Task>> {
        let task = self.tasks.claim_next(instance).await?;
        if let Some(task) = &task {
            info!(task_id = task.id, instance_id = %instance.id, "Claimed next task");
            self.events.emit(TaskEvent::Claimed { task: task.clone() });
        }
        Ok(task)
    }

    pub async fn update(&self, id: TaskId, change: TaskUpdate) -> Result<Task> {
        change.validate()?;
        let task = self.tasks.update(id, &change).await?;
        info!(task_id = id, status = %task.status, "Task updated");
        Ok(task)
    }

    /// Complete an in-progress task and report what is next in line.
    pub async fn complete(
        &self,
        id: TaskId,
        instance_id: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Completion> {
        let task = self
            .tasks
            .finish(id, TaskStatus::Completed, instance_id, notes)
            .await?;
        // The task is already committed; a failed lookup only loses the hint.
        let next_task = match self.tasks.peek_next().await {
            Ok(next) => next,
            Err(e) => {
                warn!(task_id = id, error = %e, "Failed to look up next task");
                None
            }
        };
        info!(task_id = id, next_task_id = ?next_task.as_ref().map(|t| t.id), "Task completed");
        self.events.emit(TaskEvent::Completed {
            task: task.clone(),
            next: next_task.clone(),
        });
        Ok(Completion { task, next_task })
    }

    pub async fn fail(
        &self,
        id: TaskId,
        instance_id: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Task> {
        let task = self
            .tasks
            .finish(id, TaskStatus::Failed, instance_id, notes)
            .await?;
        warn!(task_id = id, notes = notes.unwrap_or(""), "Task failed");
        Ok(task)
    }

    pub async fn cancel(&self, id: TaskId, actor: &str) -> Result<Task> {
        let task = self.tasks.cancel(id, actor).await?;
        info!(task_id = id, actor, "Task cancelled");
        Ok(task)
    }

    pub async fn set_priority(&self, id: TaskId, priority: Priority, actor: &str) -> Result<Task> {
        let task = self.tasks.set_priority(id, priority, actor).await?;
        info!(task_id = id, priority = %priority, "Task priority changed");
        Ok(task)
    }

    pub async fn heartbeat(&self, instance: &InstanceRef) -> Result<Instance> {
        Ok(self.instances.heartbeat(instance).await?)
    }

    /// Instances seen within `window`, or within the configured active window.
    pub async fn instances(&self, window: Option<Duration>) -> Result<Vec<InstanceView>> {
        let since = ago(window.unwrap_or(self.config.active_window))?;
        Ok(self.instances.list_active(since).await?)
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let completed_since = ago(Duration::from_secs(24 * 60 * 60))?;
        let seen_since = ago(self.config.active_window)?;
        Ok(self.tasks.stats(completed_since, seen_since).await?)
    }

    pub async fn history(&self, id: TaskId) -> Result<Vec<TaskLogEntry>> {
        Ok(self.tasks.history(id).await?)
    }

    /// Return tasks held longer than the stale timeout to the queue.
    pub async fn reset_stale(&self) -> Result<Vec<Task>> {
        let cutoff = ago(self.config.stale_timeout)?;
        let reset = self.tasks.reset_stale(cutoff).await?;
        if !reset.is_empty() {
            info!(count = reset.len(), "Reset stale tasks");
            self.events.emit(TaskEvent::StaleReset { count: reset.len() });
        }
        Ok(reset)
    }
}

fn ago(window: Duration) -> Result<DateTime<Utc>> {
    let window = chrono::Duration::from_std(window)
        .map_err(|_| Error::InvalidInput(format!("window too large: {:?}", window)))?;
    Utc::now()
        .checked_sub_signed(window)
        .ok_or_else(|| Error::InvalidInput(format!("window too large: {:?}", window)))
}
