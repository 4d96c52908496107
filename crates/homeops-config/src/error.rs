//! Service registry errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("registry is not valid KDL: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("cannot read registry: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("{0} is defined more than once")]
    Duplicate(String),

    #[error("service '{service}' uses unknown category '{category}'")]
    UnknownCategory { service: String, category: String },

    /// A blacklist entry that names no service.
    #[error("blacklist names unknown service '{0}'")]
    UnknownService(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
