//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for homeops_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => homeops_core::Error::NotFound(msg),
            DbError::Conflict(msg) => homeops_core::Error::Conflict(msg),
            DbError::InvalidInput(msg) => homeops_core::Error::InvalidInput(msg),
            other => homeops_core::Error::Internal(other.to_string()),
        }
    }
}
