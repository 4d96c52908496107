//! Task notifications.
//!
//! The queue never waits on a notifier. Events go into a bounded channel
//! and a dispatcher task forwards them; a full channel drops the event.

use async_trait::async_trait;
use homeops_core::task::{Task, summarize};
use homeops_core::{Error, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Something worth telling people about.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Created { task: Task },
    Claimed { task: Task },
    Completed { task: Task, next: Option<Task> },
    StaleReset { count: usize },
}

impl TaskEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskEvent::Created { .. } => "created",
            TaskEvent::Claimed { .. } => "claimed",
            TaskEvent::Completed { .. } => "completed",
            TaskEvent::StaleReset { .. } => "stale_reset",
        }
    }

    /// Chat-formatted message text.
    pub fn message(&self) -> String {
        match self {
            TaskEvent::Created { task } => format!(
                "**New Task #{}** ({})\n{}",
                task.id,
                task.priority,
                summarize(&task.description, 200)
            ),
            TaskEvent::Claimed { task } => format!(
                "**Task #{}** claimed by `{}`",
                task.id,
                task.instance_name.as_deref().unwrap_or("unknown")
            ),
            TaskEvent::Completed { task, next } => {
                let mut msg = format!(
                    "**Task #{} completed** by `{}`\n{}",
                    task.id,
                    task.instance_name.as_deref().unwrap_or("unknown"),
                    summarize(&task.description, 200)
                );
                match next {
                    Some(next) => msg.push_str(&format!(
                        "\nNext: #{} [{}] {}",
                        next.id,
                        next.priority,
                        summarize(&next.description, 100)
                    )),
                    None => msg.push_str("\nQueue is empty."),
                }
                msg
            }
            TaskEvent::StaleReset { count } => {
                format!("Reset {} stale task(s) to pending status.", count)
            }
        }
    }
}

/// Delivers task events somewhere people will see them.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn notify(&self, event: &TaskEvent) -> Result<()>;
}

/// Writes events to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, event: &TaskEvent) -> Result<()> {
        info!(event = event.kind(), "{}", event.message());
        Ok(())
    }
}

/// Posts events to a chat incoming webhook as `{"content": ...}`.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, event: &TaskEvent) -> Result<()> {
        self.client
            .post(&self.url)
            .json(&json!({ "content": event.message() }))
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| Error::ExecutionFailed(format!("webhook delivery failed: {}", e)))?;
        Ok(())
    }
}

/// Sending half of the event channel. Never blocks.
#[derive(Clone, Default)]
pub struct EventSender {
    tx: Option<mpsc::Sender<TaskEvent>>,
}

impl EventSender {
    /// A sender that drops every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: TaskEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(event) {
            match e {
                mpsc::error::TrySendError::Full(event) => {
                    warn!(event = event.kind(), "Notification channel full, dropping event")
                }
                mpsc::error::TrySendError::Closed(_) => {}
            }
        }
    }
}

/// Create a bounded event channel.
pub fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<TaskEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender { tx: Some(tx) }, rx)
}

/// Forward events to `notifier` until every sender is dropped.
pub async fn dispatch(mut rx: mpsc::Receiver<TaskEvent>, notifier: Arc<dyn Notifier>) {
    info!(notifier = notifier.name(), "Starting notification dispatcher");
    while let Some(event) = rx.recv().await {
        if let Err(e) = notifier.notify(&event).await {
            warn!(notifier = notifier.name(), event = event.kind(), error = %e, "Notification failed");
        }
    }
    info!("Notification dispatcher stopped");
}
