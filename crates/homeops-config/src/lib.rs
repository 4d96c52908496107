//! Configuration for homeops.
//!
//! This crate handles:
//! - Parsing the service registry (services.kdl)
//! - Runtime settings for the queue, the updater and SSH access

pub mod error;
pub mod registry;
pub mod settings;

pub use error::{ConfigError, ConfigResult};
pub use registry::{load_registry, parse_registry};
pub use settings::{QueueConfig, ServerConfig, SshConfig, UpdaterConfig};
