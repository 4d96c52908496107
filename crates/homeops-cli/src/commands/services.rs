//! Service dashboard and update commands.

use anyhow::Result;
use homeops_core::service::{
    CategoryView, HealthStatus, ServiceOverview, ServiceSummary, ServiceView,
};
use homeops_core::update::{UpdateJob, UpdateStatus};
use reqwest::Method;
use serde::Deserialize;

use super::{ApiClient, send};

#[derive(Debug, Deserialize)]
struct Triggered {
    task_id: String,
    service: String,
}

pub async fn list(api: &ApiClient, category: Option<String>) -> Result<()> {
    let categories = match category {
        Some(key) => {
            let view: CategoryView = api
                .get(&format!("/api/services/{}", urlencoding::encode(&key)))
                .await?;
            vec![view]
        }
        None => {
            let overview: ServiceOverview = api.get("/api/services").await?;
            overview.categories
        }
    };
    for view in &categories {
        print!("{}", category_block(view));
    }
    Ok(())
}

pub async fn summary(api: &ApiClient) -> Result<()> {
    let summary: ServiceSummary = api.get("/api/summary").await?;
    print!("{}", summary_block(&summary));
    Ok(())
}

pub async fn update(api: &ApiClient, service: &str, update_key: Option<String>) -> Result<()> {
    let path = format!("/api/update/{}", urlencoding::encode(service));
    let request = match update_key.filter(|k| !k.is_empty()) {
        Some(key) => api.request_with_key(Method::POST, &path, Some(&key)),
        None => api.request(Method::POST, &path),
    }
    .header("X-Triggered-By", "cli");
    let triggered: Triggered = send(request).await?;
    println!("Updating {} (job {})", triggered.service, triggered.task_id);
    println!("Follow with: homeops update-status {}", triggered.task_id);
    Ok(())
}

pub async fn update_status(api: &ApiClient, job: &str) -> Result<()> {
    let job: UpdateJob = api
        .get(&format!("/api/update-status/{}", urlencoding::encode(job)))
        .await?;
    print!("{}", job_block(&job));
    Ok(())
}

fn health_marker(service: &ServiceView) -> &'static str {
    match service.health {
        HealthStatus::Online => "+",
        HealthStatus::Offline => "-",
        HealthStatus::Unknown => "?",
    }
}

pub(crate) fn service_line(service: &ServiceView) -> String {
    let mut line = format!(
        "  {} {:<20} {:<8} {}",
        health_marker(service),
        service.display_name,
        service.health.to_string(),
        service.current_version
    );
    if service.update_available {
        line.push_str(if service.can_update {
            "  update available"
        } else {
            "  update available (manual)"
        });
    }
    line
}

pub(crate) fn category_block(view: &CategoryView) -> String {
    let mut out = format!(
        "{} ({}/{} online, {} update(s))\n",
        view.category_display, view.online, view.total, view.updates_available
    );
    for service in &view.services {
        out.push_str(&service_line(service));
        out.push('\n');
    }
    out
}

fn summary_block(summary: &ServiceSummary) -> String {
    let mut out = format!(
        "{} services: {} online, {} offline, {} update(s) available\n",
        summary.total, summary.online, summary.offline, summary.updates_available
    );
    for category in &summary.categories {
        out.push_str(&format!(
            "  {:<16} {}/{} online, {} update(s)\n",
            category.name, category.online, category.total, category.updates
        ));
    }
    out
}

fn job_block(job: &UpdateJob) -> String {
    let mut out = format!(
        "Update {} for {}: {}\n  Started: {}\n",
        job.id,
        job.service,
        job.status,
        job.started.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(done) = job.completed {
        out.push_str(&format!("  Finished: {}\n", done.format("%Y-%m-%d %H:%M:%S")));
    }
    if job.status == UpdateStatus::Running {
        out.push_str("  Still running\n");
    }
    if !job.output.is_empty() {
        out.push('\n');
        out.push_str(&job.output);
    }
    out
}
