//! `RemoteRunner` over the `ssh` binary.

use async_trait::async_trait;
use homeops_config::SshConfig;
use homeops_core::runner::{CommandOutput, RemoteRunner};
use homeops_core::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Runs commands on container hosts via `ssh user@host command`.
pub struct SshRunner {
    config: SshConfig,
}

impl SshRunner {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// Arguments passed to `ssh`, ending with the remote command.
    fn args(&self, host: &str, command: &str) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(key) = &self.config.key_path {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args.extend([
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            format!("{}@{}", self.config.user, host),
            command.to_string(),
        ]);
        args
    }
}

#[async_trait]
impl RemoteRunner for SshRunner {
    fn name(&self) -> &'static str {
        "ssh"
    }

    async fn run(&self, host: &str, command: &str, timeout: Duration) -> Result<CommandOutput> {
        debug!(host, command, "Running remote command");

        let child = Command::new("ssh")
            .args(self.args(host, command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExecutionFailed(format!("failed to spawn ssh: {}", e)))?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "command on {} exceeded {}s",
                    host,
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::ExecutionFailed(format!("ssh to {} failed: {}", host, e)))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_args_with_key() {
        let runner = SshRunner::new(SshConfig {
            user: "hermes-admin".to_string(),
            key_path: Some(PathBuf::from("/root/.ssh/homelab_ed25519")),
            connect_timeout: Duration::from_secs(5),
        });

        let args = runner.args("192.168.40.11", "docker ps");
        assert_eq!(
            args,
            vec![
                "-i",
                "/root/.ssh/homelab_ed25519",
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "ConnectTimeout=5",
                "-o",
                "BatchMode=yes",
                "hermes-admin@192.168.40.11",
                "docker ps",
            ]
        );
    }

    #[test]
    fn test_args_without_key() {
        let runner = SshRunner::new(SshConfig::default());
        let args = runner.args("host", "uptime");
        assert_eq!(args[0], "-o");
        assert_eq!(args[args.len() - 2], "root@host");
        assert_eq!(args[args.len() - 1], "uptime");
    }

    #[tokio::test]
    #[ignore]
    async fn test_run_against_localhost() {
        let runner = SshRunner::new(SshConfig::default());
        let output = runner
            .run("localhost", "echo hello", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "hello");
    }
}
