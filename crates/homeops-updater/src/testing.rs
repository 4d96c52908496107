//! Test doubles shared by this crate's tests.

use async_trait::async_trait;
use homeops_core::runner::{CommandOutput, RemoteRunner};
use homeops_core::service::{Category, ServiceDef, ServiceKind, ServiceRegistry};
use homeops_core::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::registry::DigestSource;

/// Answers commands by substring match. Unmatched commands exit 1.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Vec<(String, std::result::Result<CommandOutput, String>)>,
    holds: Vec<(String, Arc<Notify>)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, pattern: &str, exit_code: i32, stdout: &str) -> Self {
        self.responses.push((
            pattern.to_string(),
            Ok(CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code,
            }),
        ));
        self
    }

    pub fn time_out(mut self, pattern: &str) -> Self {
        self.responses
            .push((pattern.to_string(), Err(format!("{} timed out", pattern))));
        self
    }

    /// Block matching commands until `gate` is notified.
    pub fn hold(mut self, pattern: &str, gate: Arc<Notify>) -> Self {
        self.holds.push((pattern.to_string(), gate));
        self
    }

    /// Every command run so far as `host: command`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RemoteRunner for ScriptedRunner {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn run(&self, host: &str, command: &str, _timeout: Duration) -> Result<CommandOutput> {
        self.calls.lock().push(format!("{}: {}", host, command));
        if let Some((_, gate)) = self.holds.iter().find(|(p, _)| command.contains(p.as_str())) {
            gate.notified().await;
        }
        match self
            .responses
            .iter()
            .find(|(p, _)| command.contains(p.as_str()))
        {
            Some((_, Ok(output))) => Ok(output.clone()),
            Some((_, Err(message))) => Err(Error::Timeout(message.clone())),
            None => Ok(CommandOutput {
                exit_code: 1,
                ..CommandOutput::default()
            }),
        }
    }
}

/// Fixed upstream digests keyed by image reference.
#[derive(Default)]
pub struct StaticDigests(pub HashMap<String, String>);

#[async_trait]
impl DigestSource for StaticDigests {
    async fn latest_digest(&self, image_ref: &str) -> Option<String> {
        self.0.get(image_ref).cloned()
    }
}

pub fn service(name: &str, kind: ServiceKind) -> ServiceDef {
    let containerized = kind != ServiceKind::HttpOnly;
    ServiceDef {
        name: name.to_string(),
        display_name: name.to_string(),
        category: "media".to_string(),
        icon: name.to_string(),
        kind,
        host: containerized.then(|| "10.0.0.5".to_string()),
        compose_dir: containerized.then(|| format!("/opt/{}", name)),
        container_name: containerized.then(|| name.to_string()),
        compose_service: None,
        health_url: None,
        health_insecure: false,
        web_url: Some(format!("https://{}.home.example", name)),
    }
}

/// `media`: radarr, sonarr (blacklisted), bot (local); `network`: pihole.
pub fn registry() -> ServiceRegistry {
    let mut pihole = service("pihole", ServiceKind::HttpOnly);
    pihole.category = "network".to_string();
    ServiceRegistry {
        categories: vec![
            Category {
                key: "media".to_string(),
                display_name: "Media Stack".to_string(),
            },
            Category {
                key: "network".to_string(),
                display_name: "Network".to_string(),
            },
        ],
        services: vec![
            service("radarr", ServiceKind::Docker),
            service("sonarr", ServiceKind::Docker),
            service("bot", ServiceKind::Local),
            pihole,
        ],
        blacklist: ["sonarr".to_string()].into_iter().collect(),
    }
}
