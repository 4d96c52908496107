//! Container update history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use homeops_core::update::UpdateRecord;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::DbResult;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UpdateHistoryRecord {
    pub id: String,
    pub service: String,
    pub host: Option<String>,
    pub status: String,
    pub triggered_by: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: String,
}

impl From<UpdateHistoryRecord> for UpdateRecord {
    fn from(r: UpdateHistoryRecord) -> Self {
        UpdateRecord {
            id: r.id,
            service: r.service,
            host: r.host,
            status: r.status,
            triggered_by: r.triggered_by,
            started_at: r.started_at,
            completed_at: r.completed_at,
            output: r.output,
        }
    }
}

#[async_trait]
pub trait UpdateHistoryRepo: Send + Sync {
    async fn record(&self, update: &UpdateRecord) -> DbResult<()>;
    /// Most recent updates first, optionally for one service.
    async fn recent(&self, service: Option<&str>, limit: i64) -> DbResult<Vec<UpdateRecord>>;
}

/// SQLite implementation of UpdateHistoryRepo.
pub struct SqliteUpdateHistoryRepo {
    pool: SqlitePool,
}

impl SqliteUpdateHistoryRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UpdateHistoryRepo for SqliteUpdateHistoryRepo {
    async fn record(&self, update: &UpdateRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO update_history
                (id, service, host, status, triggered_by, started_at, completed_at, output)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                completed_at = excluded.completed_at,
                output = excluded.output
            "#,
        )
        .bind(&update.id)
        .bind(&update.service)
        .bind(&update.host)
        .bind(&update.status)
        .bind(&update.triggered_by)
        .bind(update.started_at)
        .bind(update.completed_at)
        .bind(&update.output)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(&self, service: Option<&str>, limit: i64) -> DbResult<Vec<UpdateRecord>> {
        let records = match service {
            Some(service) => {
                sqlx::query_as::<_, UpdateHistoryRecord>(
                    "SELECT * FROM update_history WHERE service = ? ORDER BY started_at DESC LIMIT ?",
                )
                .bind(service)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, UpdateHistoryRecord>(
                    "SELECT * FROM update_history ORDER BY started_at DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(records.into_iter().map(UpdateRecord::from).collect())
    }
}
