//! Runtime settings.
//!
//! Values come from flags and environment in the server binary; the
//! defaults below are the production timings.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub database_url: String,
    /// Key for the task endpoints. `None` leaves them open.
    pub api_key: Option<String>,
    /// Key for triggering container updates. `None` disables triggers.
    pub update_api_key: Option<String>,
    pub services_path: Option<PathBuf>,
    pub webhook_url: Option<String>,
    pub queue: QueueConfig,
    pub updater: UpdaterConfig,
    pub ssh: SshConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5051".to_string(),
            database_url: "sqlite://data/tasks.db".to_string(),
            api_key: None,
            update_api_key: None,
            services_path: None,
            webhook_url: None,
            queue: QueueConfig::default(),
            updater: UpdaterConfig::default(),
            ssh: SshConfig::default(),
        }
    }
}

/// Task queue timings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// In-progress tasks claimed longer ago than this go back to pending.
    pub stale_timeout: Duration,
    pub sweep_interval: Duration,
    /// Instances seen within this window count as active.
    pub active_window: Duration,
    /// Rows returned by an unfiltered listing.
    pub recent_limit: i64,
    /// Capacity of the notification channel.
    pub event_buffer: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            stale_timeout: Duration::from_secs(2 * 60 * 60),
            sweep_interval: Duration::from_secs(30 * 60),
            active_window: Duration::from_secs(60 * 60),
            recent_limit: 50,
            event_buffer: 100,
        }
    }
}

/// Update coordinator timings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdaterConfig {
    /// How long a registry digest is reused before asking again.
    pub registry_ttl: Duration,
    pub health_interval: Duration,
    pub version_interval: Duration,
    pub version_initial_delay: Duration,
    pub cleanup_interval: Duration,
    /// Finished jobs are kept this long for status polling.
    pub job_retention: Duration,
    pub health_timeout: Duration,
    pub registry_timeout: Duration,
    pub inspect_timeout: Duration,
    pub pull_timeout: Duration,
    pub recreate_timeout: Duration,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            registry_ttl: Duration::from_secs(6 * 3600),
            health_interval: Duration::from_secs(55),
            version_interval: Duration::from_secs(3600),
            version_initial_delay: Duration::from_secs(10),
            cleanup_interval: Duration::from_secs(600),
            job_retention: Duration::from_secs(3600),
            health_timeout: Duration::from_secs(5),
            registry_timeout: Duration::from_secs(10),
            inspect_timeout: Duration::from_secs(15),
            pull_timeout: Duration::from_secs(300),
            recreate_timeout: Duration::from_secs(180),
        }
    }
}

/// How container hosts are reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    pub user: String,
    pub key_path: Option<PathBuf>,
    pub connect_timeout: Duration,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            key_path: None,
            connect_timeout: Duration::from_secs(5),
        }
    }
}
