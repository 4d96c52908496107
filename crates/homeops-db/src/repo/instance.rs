//! Worker instance repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use homeops_core::instance::{Instance, InstanceView};
use homeops_core::task::{InstanceRef, TaskId};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{DbError, DbResult};

/// An instance row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InstanceRecord {
    pub id: String,
    pub name: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub current_task_id: Option<i64>,
    pub status: String,
}

impl TryFrom<InstanceRecord> for Instance {
    type Error = DbError;

    fn try_from(record: InstanceRecord) -> DbResult<Self> {
        let status = record
            .status
            .parse()
            .map_err(|_| DbError::Corrupt(format!("instance {} status {}", record.id, record.status)))?;
        Ok(Instance {
            id: record.id,
            name: record.name,
            last_seen: record.last_seen,
            current_task_id: record.current_task_id,
            status,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InstanceViewRecord {
    #[sqlx(flatten)]
    instance: InstanceRecord,
    task_description: Option<String>,
}

#[async_trait]
pub trait InstanceRepo: Send + Sync {
    /// Record that an instance is alive. Keeps its current task.
    async fn heartbeat(&self, instance: &InstanceRef) -> DbResult<Instance>;
    async fn get(&self, id: &str) -> DbResult<Instance>;
    /// Instances seen at or after `seen_since`, most recent first.
    async fn list_active(&self, seen_since: DateTime<Utc>) -> DbResult<Vec<InstanceView>>;
}

/// SQLite implementation of InstanceRepo.
pub struct SqliteInstanceRepo {
    pool: SqlitePool,
}

impl SqliteInstanceRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InstanceRepo for SqliteInstanceRepo {
    async fn heartbeat(&self, instance: &InstanceRef) -> DbResult<Instance> {
        let record = sqlx::query_as::<_, InstanceRecord>(
            r#"
            INSERT INTO instances (id, name, last_seen, status)
            VALUES (?, ?, ?, 'idle')
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                last_seen = excluded.last_seen
            RETURNING *
            "#,
        )
        .bind(&instance.id)
        .bind(&instance.name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        record.try_into()
    }

    async fn get(&self, id: &str) -> DbResult<Instance> {
        sqlx::query_as::<_, InstanceRecord>("SELECT * FROM instances WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("instance {}", id)))?
            .try_into()
    }

    async fn list_active(&self, seen_since: DateTime<Utc>) -> DbResult<Vec<InstanceView>> {
        let records = sqlx::query_as::<_, InstanceViewRecord>(
            r#"
            SELECT i.id, i.name, i.last_seen, i.current_task_id, i.status,
                   t.description AS task_description
            FROM instances i
            LEFT JOIN tasks t ON t.id = i.current_task_id
            WHERE i.last_seen >= ?
            ORDER BY i.last_seen DESC
            "#,
        )
        .bind(seen_since)
        .fetch_all(&self.pool)
        .await?;

        records
            .into_iter()
            .map(|r| {
                Ok(InstanceView {
                    instance: r.instance.try_into()?,
                    task_description: r.task_description,
                })
            })
            .collect()
    }
}

/// Point an instance at the task it just claimed.
pub(crate) async fn mark_working(
    conn: &mut SqliteConnection,
    instance: &InstanceRef,
    task_id: TaskId,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO instances (id, name, last_seen, current_task_id, status)
        VALUES (?, ?, ?, ?, 'working')
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            last_seen = excluded.last_seen,
            current_task_id = excluded.current_task_id,
            status = 'working'
        "#,
    )
    .bind(&instance.id)
    .bind(&instance.name)
    .bind(now)
    .bind(task_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Idle every instance still pointing at `task_id`.
pub(crate) async fn release_task(conn: &mut SqliteConnection, task_id: TaskId) -> DbResult<()> {
    sqlx::query(
        "UPDATE instances SET status = 'idle', current_task_id = NULL WHERE current_task_id = ?",
    )
    .bind(task_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Record activity from an instance without touching its task.
pub(crate) async fn touch_instance(
    conn: &mut SqliteConnection,
    instance_id: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query("UPDATE instances SET last_seen = ? WHERE id = ?")
        .bind(now)
        .bind(instance_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
