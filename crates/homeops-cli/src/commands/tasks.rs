//! Task queue and worker commands.

use anyhow::Result;
use chrono::{DateTime, Utc};
use homeops_core::instance::{Instance, InstanceView};
use homeops_core::task::{QueueStats, Task, TaskId, TaskLogEntry, summarize};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use super::{ApiClient, Worker, send};

#[derive(Debug, Deserialize)]
struct TaskList {
    tasks: Vec<Task>,
    count: usize,
}

#[derive(Debug, Deserialize)]
struct TaskAction {
    status: String,
    task: Task,
}

#[derive(Debug, Deserialize)]
struct NextTask {
    task: Option<Task>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Completed {
    task: Task,
    next_task: Option<Task>,
}

#[derive(Debug, Deserialize)]
struct History {
    history: Vec<TaskLogEntry>,
}

#[derive(Debug, Deserialize)]
struct Heartbeat {
    instance: Instance,
}

#[derive(Debug, Deserialize)]
struct Instances {
    instances: Vec<InstanceView>,
    count: usize,
}

pub async fn list(api: &ApiClient, status: Option<String>) -> Result<()> {
    let mut request = api.request(Method::GET, "/api/tasks");
    if let Some(status) = status {
        request = request.query(&[("status", status)]);
    }
    let list: TaskList = send(request).await?;
    if list.tasks.is_empty() {
        println!("No tasks");
        return Ok(());
    }
    for task in &list.tasks {
        println!("{}", task_line(task));
    }
    println!("{} task(s)", list.count);
    Ok(())
}

pub async fn show(api: &ApiClient, id: TaskId) -> Result<()> {
    let task: Task = api.get(&format!("/api/tasks/{}", id)).await?;
    print!("{}", task_detail(&task));
    Ok(())
}

pub async fn submit(
    api: &ApiClient,
    description: &str,
    priority: Option<String>,
    submitted_by: &str,
) -> Result<()> {
    let action: TaskAction = api
        .post(
            "/api/tasks",
            json!({
                "description": description,
                "priority": priority,
                "submitted_by": submitted_by,
            }),
        )
        .await?;
    println!("Submitted {}", task_line(&action.task));
    Ok(())
}

pub async fn next(api: &ApiClient) -> Result<()> {
    let next: NextTask = api.get("/api/tasks/next").await?;
    print_next(next);
    Ok(())
}

pub async fn claim(api: &ApiClient, id: TaskId, worker: &Worker) -> Result<()> {
    let action: TaskAction = api
        .post(&format!("/api/tasks/{}/claim", id), worker.body())
        .await?;
    println!("{} {}", action.status, task_line(&action.task));
    Ok(())
}

pub async fn claim_next(api: &ApiClient, worker: &Worker) -> Result<()> {
    let next: NextTask = api.post("/api/tasks/claim-next", worker.body()).await?;
    print_next(next);
    Ok(())
}

pub async fn complete(
    api: &ApiClient,
    id: TaskId,
    worker: &Worker,
    notes: Option<String>,
) -> Result<()> {
    let mut body = worker.body();
    body["notes"] = json!(notes);
    let done: Completed = api
        .post(&format!("/api/tasks/{}/complete", id), body)
        .await?;
    println!("completed {}", task_line(&done.task));
    match done.next_task {
        Some(task) => println!("Next up: {}", task_line(&task)),
        None => println!("Queue is empty"),
    }
    Ok(())
}

pub async fn fail(
    api: &ApiClient,
    id: TaskId,
    worker: &Worker,
    notes: Option<String>,
) -> Result<()> {
    let mut body = worker.body();
    body["notes"] = json!(notes);
    let action: TaskAction = api.post(&format!("/api/tasks/{}/fail", id), body).await?;
    println!("{} {}", action.status, task_line(&action.task));
    Ok(())
}

pub async fn cancel(api: &ApiClient, id: TaskId) -> Result<()> {
    let action: TaskAction = api
        .post(&format!("/api/tasks/{}/cancel", id), json!({ "actor": "cli" }))
        .await?;
    println!("{} {}", action.status, task_line(&action.task));
    Ok(())
}

pub async fn priority(api: &ApiClient, id: TaskId, priority: &str) -> Result<()> {
    let action: TaskAction = api
        .put(
            &format!("/api/tasks/{}/priority", id),
            json!({ "priority": priority, "actor": "cli" }),
        )
        .await?;
    println!("{} {}", action.status, task_line(&action.task));
    Ok(())
}

pub async fn history(api: &ApiClient, id: TaskId) -> Result<()> {
    let history: History = api.get(&format!("/api/tasks/{}/history", id)).await?;
    for entry in &history.history {
        println!("{}", log_line(entry));
    }
    Ok(())
}

pub async fn heartbeat(api: &ApiClient, worker: &Worker) -> Result<()> {
    let beat: Heartbeat = api.post("/api/instance/heartbeat", worker.body()).await?;
    println!(
        "{} is {} (last seen {})",
        beat.instance.display_name(),
        beat.instance.status,
        timestamp(beat.instance.last_seen)
    );
    Ok(())
}

pub async fn stats(api: &ApiClient) -> Result<()> {
    let stats: QueueStats = api.get("/api/stats").await?;
    print!("{}", stats_block(&stats));
    Ok(())
}

pub async fn instances(api: &ApiClient, window_minutes: Option<u64>) -> Result<()> {
    let mut request = api.request(Method::GET, "/api/instances");
    if let Some(minutes) = window_minutes {
        request = request.query(&[("window_minutes", minutes)]);
    }
    let list: Instances = send(request).await?;
    let now = Utc::now();
    for view in &list.instances {
        println!("{}", instance_line(view, now));
    }
    println!("{} active instance(s)", list.count);
    Ok(())
}

fn print_next(next: NextTask) {
    match next.task {
        Some(task) => println!("{}", task_line(&task)),
        None => println!("{}", next.message.as_deref().unwrap_or("No pending tasks")),
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

/// `#12 [high] in_progress  Rotate backups (worker-1)`
pub(crate) fn task_line(task: &Task) -> String {
    let mut line = format!(
        "#{} [{}] {:<11} {}",
        task.id,
        task.priority,
        task.status.as_str(),
        summarize(&task.description, 60)
    );
    if let Some(worker) = task.instance_name.as_deref().or(task.instance_id.as_deref()) {
        line.push_str(&format!(" ({})", worker));
    }
    line
}

pub(crate) fn task_detail(task: &Task) -> String {
    let mut out = format!(
        "Task #{}\n  Description: {}\n  Status:      {}\n  Priority:    {}\n  Created:     {}\n",
        task.id,
        task.description,
        task.status,
        task.priority,
        timestamp(task.created_at)
    );
    if let Some(by) = &task.submitted_by {
        out.push_str(&format!("  Submitted:   {}\n", by));
    }
    if let Some(worker) = task.instance_name.as_deref().or(task.instance_id.as_deref()) {
        out.push_str(&format!("  Worker:      {}\n", worker));
    }
    if let Some(at) = task.claimed_at {
        out.push_str(&format!("  Claimed:     {}\n", timestamp(at)));
    }
    if let Some(at) = task.completed_at {
        out.push_str(&format!("  Finished:    {}\n", timestamp(at)));
    }
    if let Some(notes) = &task.notes {
        out.push_str(&format!("  Notes:       {}\n", notes));
    }
    out
}

fn log_line(entry: &TaskLogEntry) -> String {
    let mut line = format!("{} {}", timestamp(entry.timestamp), entry.action);
    if let Some(instance) = &entry.instance_id {
        line.push_str(&format!(" by {}", instance));
    }
    if let Some(details) = &entry.details {
        line.push_str(&format!(": {}", details));
    }
    line
}

fn instance_line(view: &InstanceView, now: DateTime<Utc>) -> String {
    let instance = &view.instance;
    let mut line = format!(
        "{} {} seen {}m ago",
        instance.display_name(),
        instance.status,
        instance.minutes_since_seen(now)
    );
    if let (Some(id), Some(description)) = (instance.current_task_id, &view.task_description) {
        line.push_str(&format!(" on #{} {}", id, summarize(description, 40)));
    }
    line
}

fn stats_block(stats: &QueueStats) -> String {
    format!(
        "Pending:     {}\nIn progress: {}\nCompleted:   {} ({} in last 24h)\nFailed:      {}\nCancelled:   {}\nInstances:   {} active\n",
        stats.pending,
        stats.in_progress,
        stats.completed,
        stats.completed_last_24h,
        stats.failed,
        stats.cancelled,
        stats.active_instances
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use homeops_core::instance::InstanceStatus;
    use homeops_core::task::{Priority, TaskStatus};

    fn task() -> Task {
        Task {
            id: 12,
            description: "Rotate backups".to_string(),
            status: TaskStatus::InProgress,
            priority: Priority::High,
            instance_id: Some("w1".to_string()),
            instance_name: Some("worker-1".to_string()),
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap(),
            claimed_at: Some(Utc.with_ymd_and_hms(2025, 3, 1, 9, 45, 0).unwrap()),
            completed_at: None,
            notes: None,
            submitted_by: Some("cli".to_string()),
        }
    }

    #[test]
    fn test_task_line() {
        assert_eq!(task_line(&task()), "#12 [high] in_progress Rotate backups (worker-1)");

        let mut pending = task();
        pending.status = TaskStatus::Pending;
        pending.instance_id = None;
        pending.instance_name = None;
        pending.description = "x".repeat(70);
        let line = task_line(&pending);
        assert!(line.starts_with("#12 [high] pending     xxx"));
        assert!(line.ends_with("..."));
    }

    #[test]
    fn test_task_detail() {
        let detail = task_detail(&task());
        assert!(detail.starts_with("Task #12\n"));
        assert!(detail.contains("  Status:      in_progress\n"));
        assert!(detail.contains("  Created:     2025-03-01 09:30\n"));
        assert!(detail.contains("  Worker:      worker-1\n"));
        assert!(!detail.contains("Finished"));
    }

    #[test]
    fn test_log_line() {
        let entry = TaskLogEntry {
            id: 1,
            task_id: 12,
            action: "claimed".to_string(),
            details: Some("Claimed by worker-1".to_string()),
            instance_id: Some("w1".to_string()),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 9, 45, 0).unwrap(),
        };
        assert_eq!(log_line(&entry), "2025-03-01 09:45 claimed by w1: Claimed by worker-1");
    }

    #[test]
    fn test_instance_line() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let view = InstanceView {
            instance: Instance {
                id: "w1".to_string(),
                name: None,
                last_seen: now - Duration::minutes(3),
                current_task_id: Some(12),
                status: InstanceStatus::Working,
            },
            task_description: Some("Rotate backups".to_string()),
        };
        assert_eq!(instance_line(&view, now), "w1 working seen 3m ago on #12 Rotate backups");
    }

    #[test]
    fn test_stats_block() {
        let stats = QueueStats {
            pending: 2,
            completed: 5,
            completed_last_24h: 1,
            active_instances: 1,
            ..QueueStats::default()
        };
        let block = stats_block(&stats);
        assert!(block.starts_with("Pending:     2\n"));
        assert!(block.contains("Completed:   5 (1 in last 24h)\n"));
    }
}
