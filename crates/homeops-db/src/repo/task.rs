//! Task queue repository.
//!
//! Every state change runs in a transaction together with its audit log
//! entry and the matching instance bookkeeping. Writes are guarded by the
//! status the row was read with, so two callers racing on the same task
//! cannot both succeed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use homeops_core::task::{
    InstanceRef, NewTask, Priority, QueueStats, StatusFilter, Task, TaskAction, TaskId,
    TaskLogEntry, TaskStatus, TaskUpdate,
};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::debug;

use super::instance::{mark_working, release_task, touch_instance};
use crate::{DbError, DbResult};

/// Priority rank, then age, then id.
const QUEUE_ORDER: &str =
    "CASE priority WHEN 'high' THEN 1 WHEN 'medium' THEN 2 ELSE 3 END, created_at ASC, id ASC";

/// A task row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TaskRecord {
    pub id: i64,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub instance_id: Option<String>,
    pub instance_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub submitted_by: Option<String>,
}

impl TryFrom<TaskRecord> for Task {
    type Error = DbError;

    fn try_from(record: TaskRecord) -> DbResult<Self> {
        let status = record
            .status
            .parse()
            .map_err(|_| DbError::Corrupt(format!("task {} status {}", record.id, record.status)))?;
        let priority = record.priority.parse().map_err(|_| {
            DbError::Corrupt(format!("task {} priority {}", record.id, record.priority))
        })?;
        Ok(Task {
            id: record.id,
            description: record.description,
            status,
            priority,
            instance_id: record.instance_id,
            instance_name: record.instance_name,
            created_at: record.created_at,
            claimed_at: record.claimed_at,
            completed_at: record.completed_at,
            notes: record.notes,
            submitted_by: record.submitted_by,
        })
    }
}

/// A task audit log row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TaskLogRecord {
    pub id: i64,
    pub task_id: i64,
    pub action: String,
    pub details: Option<String>,
    pub instance_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<TaskLogRecord> for TaskLogEntry {
    fn from(record: TaskLogRecord) -> Self {
        TaskLogEntry {
            id: record.id,
            task_id: record.task_id,
            action: record.action,
            details: record.details,
            instance_id: record.instance_id,
            timestamp: record.timestamp,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatsRecord {
    pending: i64,
    in_progress: i64,
    completed: i64,
    failed: i64,
    cancelled: i64,
    completed_recently: i64,
    active_instances: i64,
}

#[async_trait]
pub trait TaskRepo: Send + Sync {
    async fn create(&self, task: &NewTask) -> DbResult<Task>;
    async fn get(&self, id: TaskId) -> DbResult<Task>;
    /// Tasks in one status in queue order, or the `limit` newest tasks.
    async fn list(&self, filter: StatusFilter, limit: i64) -> DbResult<Vec<Task>>;
    /// Pending and in-progress tasks in queue order.
    async fn active(&self) -> DbResult<Vec<Task>>;
    /// Head of the pending queue.
    async fn peek_next(&self) -> DbResult<Option<Task>>;
    async fn claim(&self, id: TaskId, instance: &InstanceRef) -> DbResult<Task>;
    /// Claim the head of the pending queue, if any.
    async fn claim_next(&self, instance: &InstanceRef) -> DbResult<Option<Task>>;
    async fn update(&self, id: TaskId, change: &TaskUpdate) -> DbResult<Task>;
    /// Move an in-progress task to `completed` or `failed`.
    async fn finish(
        &self,
        id: TaskId,
        outcome: TaskStatus,
        instance_id: Option<&str>,
        notes: Option<&str>,
    ) -> DbResult<Task>;
    async fn cancel(&self, id: TaskId, actor: &str) -> DbResult<Task>;
    async fn set_priority(&self, id: TaskId, priority: Priority, actor: &str) -> DbResult<Task>;
    /// Return in-progress tasks claimed before `claimed_before` to the queue.
    async fn reset_stale(&self, claimed_before: DateTime<Utc>) -> DbResult<Vec<Task>>;
    async fn history(&self, id: TaskId) -> DbResult<Vec<TaskLogEntry>>;
    async fn stats(
        &self,
        completed_since: DateTime<Utc>,
        seen_since: DateTime<Utc>,
    ) -> DbResult<QueueStats>;
}

/// SQLite implementation of TaskRepo.
pub struct SqliteTaskRepo {
    pool: SqlitePool,
}

impl SqliteTaskRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Start a transaction that holds the write lock from its first
    /// statement, so a read-then-write never has to upgrade a snapshot.
    async fn begin_write(&self) -> DbResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }
}

#[async_trait]
impl TaskRepo for SqliteTaskRepo {
    async fn create(&self, task: &NewTask) -> DbResult<Task> {
        let now = Utc::now();
        let mut tx = self.begin_write().await?;

        let record = sqlx::query_as::<_, TaskRecord>(
            r#"
            INSERT INTO tasks (description, status, priority, created_at, submitted_by)
            VALUES (?, 'pending', ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(task.description.trim())
        .bind(task.priority.as_str())
        .bind(now)
        .bind(&task.submitted_by)
        .fetch_one(&mut *tx)
        .await?;

        let details = format!("Priority: {}", task.priority);
        insert_log(
            &mut tx,
            record.id,
            TaskAction::Created,
            Some(&details),
            task.submitted_by.as_deref(),
            now,
        )
        .await?;
        tx.commit().await?;

        record.try_into()
    }

    async fn get(&self, id: TaskId) -> DbResult<Task> {
        let mut conn = self.pool.acquire().await?;
        fetch_task(&mut conn, id).await
    }

    async fn list(&self, filter: StatusFilter, limit: i64) -> DbResult<Vec<Task>> {
        let records = match filter {
            StatusFilter::Only(status) => {
                let sql = format!("SELECT * FROM tasks WHERE status = ? ORDER BY {}", QUEUE_ORDER);
                sqlx::query_as::<_, TaskRecord>(&sql)
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            StatusFilter::All => {
                sqlx::query_as::<_, TaskRecord>(
                    "SELECT * FROM tasks ORDER BY created_at DESC, id DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        records.into_iter().map(Task::try_from).collect()
    }

    async fn active(&self) -> DbResult<Vec<Task>> {
        let sql = format!(
            "SELECT * FROM tasks WHERE status IN ('pending', 'in_progress') ORDER BY {}",
            QUEUE_ORDER
        );
        let records = sqlx::query_as::<_, TaskRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;
        records.into_iter().map(Task::try_from).collect()
    }

    async fn peek_next(&self) -> DbResult<Option<Task>> {
        let mut conn = self.pool.acquire().await?;
        next_pending(&mut conn).await
    }

    async fn claim(&self, id: TaskId, instance: &InstanceRef) -> DbResult<Task> {
        let now = Utc::now();
        let mut tx = self.begin_write().await?;

        let current = fetch_task(&mut tx, id).await?;
        if current.status != TaskStatus::Pending {
            return Err(DbError::Conflict(format!(
                "task {} is {}, not pending",
                id, current.status
            )));
        }

        let record = sqlx::query_as::<_, TaskRecord>(
            r#"
            UPDATE tasks
            SET status = 'in_progress', instance_id = ?, instance_name = ?, claimed_at = ?
            WHERE id = ? AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(&instance.id)
        .bind(&instance.name)
        .bind(now)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            DbError::Conflict(format!("task {} was claimed by another instance", id))
        })?;

        mark_working(&mut tx, instance, id, now).await?;
        let details = format!("Claimed by {}", instance.name);
        insert_log(&mut tx, id, TaskAction::Claimed, Some(&details), Some(&instance.id), now)
            .await?;
        tx.commit().await?;

        record.try_into()
    }

    async fn claim_next(&self, instance: &InstanceRef) -> DbResult<Option<Task>> {
        let now = Utc::now();
        let mut tx = self.begin_write().await?;

        let sql = format!(
            r#"
            UPDATE tasks
            SET status = 'in_progress', instance_id = ?, instance_name = ?, claimed_at = ?
            WHERE id = (SELECT id FROM tasks WHERE status = 'pending' ORDER BY {} LIMIT 1)
              AND status = 'pending'
            RETURNING *
            "#,
            QUEUE_ORDER
        );
        let Some(record) = sqlx::query_as::<_, TaskRecord>(&sql)
            .bind(&instance.id)
            .bind(&instance.name)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        mark_working(&mut tx, instance, record.id, now).await?;
        let details = format!("Claimed by {} (next in queue)", instance.name);
        insert_log(
            &mut tx,
            record.id,
            TaskAction::Claimed,
            Some(&details),
            Some(&instance.id),
            now,
        )
        .await?;
        tx.commit().await?;

        Task::try_from(record).map(Some)
    }

    async fn update(&self, id: TaskId, change: &TaskUpdate) -> DbResult<Task> {
        if change.notes.is_none() && change.status.is_none() {
            return Err(DbError::InvalidInput(
                "at least one of notes or status is required".to_string(),
            ));
        }

        let now = Utc::now();
        let mut tx = self.begin_write().await?;
        let current = fetch_task(&mut tx, id).await?;
        let mut next = current.clone();

        if let Some(status) = change.status.filter(|s| *s != current.status) {
            if !current.status.can_transition_to(status) {
                return Err(DbError::Conflict(format!(
                    "task {} cannot move from {} to {}",
                    id, current.status, status
                )));
            }
            apply_status(&mut next, status, change.instance_id.as_deref(), now);
        }
        if let Some(notes) = &change.notes {
            next.notes = Some(notes.clone());
        }

        write_task(&mut tx, &next, current.status).await?;
        sync_instance(&mut tx, &current, &next, now).await?;

        let action = match (current.status, next.status) {
            (TaskStatus::InProgress, TaskStatus::Pending) => TaskAction::Released,
            _ => TaskAction::Updated,
        };
        let details = serde_json::json!({
            "status": change.status,
            "notes": change.notes,
        })
        .to_string();
        insert_log(
            &mut tx,
            id,
            action,
            Some(&details),
            change.instance_id.as_deref(),
            now,
        )
        .await?;
        tx.commit().await?;

        Ok(next)
    }

    async fn finish(
        &self,
        id: TaskId,
        outcome: TaskStatus,
        instance_id: Option<&str>,
        notes: Option<&str>,
    ) -> DbResult<Task> {
        let action = match outcome {
            TaskStatus::Completed => TaskAction::Completed,
            TaskStatus::Failed => TaskAction::Failed,
            other => {
                return Err(DbError::InvalidInput(format!(
                    "{} is not a finishing status",
                    other
                )));
            }
        };

        let now = Utc::now();
        let mut tx = self.begin_write().await?;
        let current = fetch_task(&mut tx, id).await?;

        if current.status != TaskStatus::InProgress {
            return Err(DbError::Conflict(format!(
                "task {} is {}, not in_progress",
                id, current.status
            )));
        }
        if let Some(caller) = instance_id {
            if current.instance_id.as_deref() != Some(caller) {
                return Err(DbError::Conflict(format!(
                    "task {} is claimed by {}, not {}",
                    id,
                    current.instance_id.as_deref().unwrap_or("nobody"),
                    caller
                )));
            }
        }

        let mut next = current.clone();
        apply_status(&mut next, outcome, None, now);
        if let Some(notes) = notes {
            next.notes = Some(notes.to_string());
        }

        write_task(&mut tx, &next, current.status).await?;
        release_task(&mut tx, id).await?;
        let actor = instance_id.or(current.instance_id.as_deref());
        if let Some(actor) = actor {
            touch_instance(&mut tx, actor, now).await?;
        }
        insert_log(&mut tx, id, action, notes, actor, now).await?;
        tx.commit().await?;

        Ok(next)
    }

    async fn cancel(&self, id: TaskId, actor: &str) -> DbResult<Task> {
        let now = Utc::now();
        let mut tx = self.begin_write().await?;
        let current = fetch_task(&mut tx, id).await?;

        if current.status != TaskStatus::Pending {
            return Err(DbError::Conflict(format!(
                "only pending tasks can be cancelled; task {} is {}",
                id, current.status
            )));
        }

        let mut next = current.clone();
        apply_status(&mut next, TaskStatus::Cancelled, None, now);
        write_task(&mut tx, &next, current.status).await?;

        let details = format!("Cancelled by {}", actor);
        insert_log(&mut tx, id, TaskAction::Cancelled, Some(&details), Some(actor), now).await?;
        tx.commit().await?;

        Ok(next)
    }

    async fn set_priority(&self, id: TaskId, priority: Priority, actor: &str) -> DbResult<Task> {
        let now = Utc::now();
        let mut tx = self.begin_write().await?;
        let current = fetch_task(&mut tx, id).await?;

        if current.status.is_terminal() {
            return Err(DbError::Conflict(format!(
                "cannot change priority of {} task {}",
                current.status, id
            )));
        }

        let mut next = current.clone();
        next.priority = priority;
        write_task(&mut tx, &next, current.status).await?;

        let details = format!("{} -> {}", current.priority, priority);
        insert_log(
            &mut tx,
            id,
            TaskAction::PriorityChanged,
            Some(&details),
            Some(actor),
            now,
        )
        .await?;
        tx.commit().await?;

        Ok(next)
    }

    async fn reset_stale(&self, claimed_before: DateTime<Utc>) -> DbResult<Vec<Task>> {
        let now = Utc::now();
        let mut tx = self.begin_write().await?;

        let stale = sqlx::query_as::<_, TaskRecord>(
            "SELECT * FROM tasks WHERE status = 'in_progress' AND claimed_at < ? ORDER BY id",
        )
        .bind(claimed_before)
        .fetch_all(&mut *tx)
        .await?;

        let mut reset = Vec::with_capacity(stale.len());
        for record in stale {
            let current = Task::try_from(record)?;
            let mut next = current.clone();
            apply_status(&mut next, TaskStatus::Pending, None, now);

            write_task(&mut tx, &next, current.status).await?;
            release_task(&mut tx, current.id).await?;

            let details = format!(
                "Stale reset (was claimed by {})",
                current
                    .instance_name
                    .as_deref()
                    .or(current.instance_id.as_deref())
                    .unwrap_or("unknown")
            );
            insert_log(
                &mut tx,
                current.id,
                TaskAction::Reset,
                Some(&details),
                current.instance_id.as_deref(),
                now,
            )
            .await?;
            debug!(task_id = current.id, "Reset stale task");
            reset.push(next);
        }

        tx.commit().await?;
        Ok(reset)
    }

    async fn history(&self, id: TaskId) -> DbResult<Vec<TaskLogEntry>> {
        let mut conn = self.pool.acquire().await?;
        fetch_task(&mut conn, id).await?;

        let records = sqlx::query_as::<_, TaskLogRecord>(
            "SELECT * FROM task_logs WHERE task_id = ? ORDER BY id ASC",
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(records.into_iter().map(TaskLogEntry::from).collect())
    }

    async fn stats(
        &self,
        completed_since: DateTime<Utc>,
        seen_since: DateTime<Utc>,
    ) -> DbResult<QueueStats> {
        let record = sqlx::query_as::<_, StatsRecord>(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) AS pending,
                COALESCE(SUM(CASE WHEN status = 'in_progress' THEN 1 ELSE 0 END), 0) AS in_progress,
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed,
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS failed,
                COALESCE(SUM(CASE WHEN status = 'cancelled' THEN 1 ELSE 0 END), 0) AS cancelled,
                COALESCE(SUM(CASE WHEN status = 'completed' AND completed_at >= ? THEN 1 ELSE 0 END), 0)
                    AS completed_recently,
                (SELECT COUNT(*) FROM instances WHERE last_seen >= ?) AS active_instances
            FROM tasks
            "#,
        )
        .bind(completed_since)
        .bind(seen_since)
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueStats {
            pending: record.pending,
            in_progress: record.in_progress,
            completed: record.completed,
            failed: record.failed,
            cancelled: record.cancelled,
            completed_last_24h: record.completed_recently,
            active_instances: record.active_instances,
        })
    }
}

async fn fetch_task(conn: &mut SqliteConnection, id: TaskId) -> DbResult<Task> {
    sqlx::query_as::<_, TaskRecord>("SELECT * FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("task {}", id)))?
        .try_into()
}

async fn next_pending(conn: &mut SqliteConnection) -> DbResult<Option<Task>> {
    let sql = format!(
        "SELECT * FROM tasks WHERE status = 'pending' ORDER BY {} LIMIT 1",
        QUEUE_ORDER
    );
    sqlx::query_as::<_, TaskRecord>(&sql)
        .fetch_optional(&mut *conn)
        .await?
        .map(Task::try_from)
        .transpose()
}

/// Set `status` and the fields that go with it.
fn apply_status(task: &mut Task, status: TaskStatus, instance_id: Option<&str>, now: DateTime<Utc>) {
    task.status = status;
    match status {
        TaskStatus::Pending => {
            task.instance_id = None;
            task.instance_name = None;
            task.claimed_at = None;
        }
        TaskStatus::InProgress => {
            let instance = InstanceRef::new(instance_id.map(str::to_string), None);
            task.instance_id = Some(instance.id);
            task.instance_name = Some(instance.name);
            task.claimed_at = Some(now);
        }
        TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {
            task.completed_at = Some(now);
        }
    }
}

/// Persist `task`, provided the row still has status `expected`.
async fn write_task(conn: &mut SqliteConnection, task: &Task, expected: TaskStatus) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET status = ?, priority = ?, instance_id = ?, instance_name = ?,
            claimed_at = ?, completed_at = ?, notes = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(task.status.as_str())
    .bind(task.priority.as_str())
    .bind(&task.instance_id)
    .bind(&task.instance_name)
    .bind(task.claimed_at)
    .bind(task.completed_at)
    .bind(&task.notes)
    .bind(task.id)
    .bind(expected.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::Conflict(format!(
            "task {} changed concurrently",
            task.id
        )));
    }
    Ok(())
}

/// Keep the instance registry in step with a status change.
async fn sync_instance(
    conn: &mut SqliteConnection,
    before: &Task,
    after: &Task,
    now: DateTime<Utc>,
) -> DbResult<()> {
    match (before.status, after.status) {
        (TaskStatus::InProgress, s) if s != TaskStatus::InProgress => release_task(conn, after.id).await,
        (s, TaskStatus::InProgress) if s != TaskStatus::InProgress => {
            let instance = InstanceRef::new(after.instance_id.clone(), after.instance_name.clone());
            mark_working(conn, &instance, after.id, now).await
        }
        _ => Ok(()),
    }
}

async fn insert_log(
    conn: &mut SqliteConnection,
    task_id: TaskId,
    action: TaskAction,
    details: Option<&str>,
    instance_id: Option<&str>,
    at: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO task_logs (task_id, action, details, instance_id, timestamp) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(task_id)
    .bind(action.as_str())
    .bind(details)
    .bind(instance_id)
    .bind(at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
