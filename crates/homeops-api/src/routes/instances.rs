//! Worker instance endpoints.

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use homeops_core::instance::{Instance, InstanceView};
use homeops_core::task::QueueStats;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::optional_body;
use super::tasks::WorkerRequest;
use crate::AppState;
use crate::error::ApiError;
use crate::extract::ApiQuery;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/instance/heartbeat", post(heartbeat))
        .route("/instances", get(list_instances))
        .route("/stats", get(stats))
}

#[derive(Debug, Serialize)]
struct HeartbeatResponse {
    status: &'static str,
    instance_id: String,
    instance: Instance,
}

async fn heartbeat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let req: WorkerRequest = optional_body(&body)?;
    let instance = state.queue.heartbeat(&req.instance()).await?;
    Ok(Json(HeartbeatResponse {
        status: "ok",
        instance_id: instance.id.clone(),
        instance,
    }))
}

#[derive(Debug, Deserialize)]
struct InstancesQuery {
    /// Override the active window, in minutes.
    window_minutes: Option<u64>,
}

#[derive(Debug, Serialize)]
struct InstancesResponse {
    instances: Vec<InstanceView>,
    count: usize,
}

async fn list_instances(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<InstancesQuery>,
) -> Result<Json<InstancesResponse>, ApiError> {
    let window = query
        .window_minutes
        .map(|m| {
            m.checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| ApiError::BadRequest(format!("window_minutes too large: {}", m)))
        })
        .transpose()?;
    let instances = state.queue.instances(window).await?;
    Ok(Json(InstancesResponse {
        count: instances.len(),
        instances,
    }))
}

async fn stats(State(state): State<AppState>) -> Result<Json<QueueStats>, ApiError> {
    Ok(Json(state.queue.stats().await?))
}
