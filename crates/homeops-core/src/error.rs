//! Error type shared by the homeops crates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The caller is known but the action is not allowed, e.g. updating a
    /// blacklisted service.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The resource is not in a state that allows the action: a task that
    /// is no longer pending, or an update already running.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A remote command or outbound request could not be carried out.
    #[error("command failed: {0}")]
    ExecutionFailed(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
