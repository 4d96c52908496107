//! Service health checks.

use homeops_config::UpdaterConfig;
use homeops_core::runner::RemoteRunner;
use homeops_core::service::{HealthStatus, ServiceDef};
use homeops_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Checks a health URL when one is configured, otherwise asks Docker
/// whether the container is running.
pub struct HealthChecker {
    client: reqwest::Client,
    insecure_client: reqwest::Client,
    runner: Arc<dyn RemoteRunner>,
    inspect_timeout: Duration,
}

impl HealthChecker {
    pub fn new(runner: Arc<dyn RemoteRunner>, config: &UpdaterConfig) -> Result<Self> {
        let build = |insecure: bool| {
            reqwest::Client::builder()
                .timeout(config.health_timeout)
                .redirect(reqwest::redirect::Policy::limited(10))
                .danger_accept_invalid_certs(insecure)
                .build()
                .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))
        };
        Ok(Self {
            client: build(false)?,
            insecure_client: build(true)?,
            runner,
            inspect_timeout: config.inspect_timeout,
        })
    }

    pub async fn check(&self, service: &ServiceDef) -> HealthStatus {
        if let Some(url) = &service.health_url {
            return self.check_url(url, service.health_insecure).await;
        }
        match service.container() {
            Some((host, container)) => self.check_container(host, container).await,
            None => HealthStatus::Unknown,
        }
    }

    /// Anything below 500 counts as up; auth walls still prove the app answers.
    async fn check_url(&self, url: &str, insecure: bool) -> HealthStatus {
        let client = if insecure {
            &self.insecure_client
        } else {
            &self.client
        };
        match client.get(url).send().await {
            Ok(response) if response.status().as_u16() < 500 => HealthStatus::Online,
            Ok(response) => {
                debug!(url, status = %response.status(), "Health check returned server error");
                HealthStatus::Offline
            }
            Err(e) => {
                debug!(url, error = %e, "Health check failed");
                HealthStatus::Offline
            }
        }
    }

    async fn check_container(&self, host: &str, container: &str) -> HealthStatus {
        let command = format!(
            "docker inspect --format={{{{.State.Status}}}} {} 2>/dev/null",
            container
        );
        match self.runner.run(host, &command, self.inspect_timeout).await {
            Ok(output) if output.stdout.trim() == "running" => HealthStatus::Online,
            Ok(_) => HealthStatus::Offline,
            Err(e) => {
                debug!(host, container, error = %e, "Container state check failed");
                HealthStatus::Offline
            }
        }
    }
}
