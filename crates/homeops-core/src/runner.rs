//! Remote command execution.
//!
//! Container hosts are reached through a `RemoteRunner`. The production
//! implementation shells out to `ssh`; tests substitute scripted runners.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::Result;

/// Output of a finished remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs shell commands on a remote host.
#[async_trait]
pub trait RemoteRunner: Send + Sync {
    /// Name of this runner.
    fn name(&self) -> &'static str;

    /// Run `command` on `host`, failing with `Error::Timeout` if it does
    /// not finish within `timeout`.
    async fn run(&self, host: &str, command: &str, timeout: Duration) -> Result<CommandOutput>;
}
