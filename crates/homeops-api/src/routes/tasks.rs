//! Task queue endpoints.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use homeops_core::task::{
    InstanceRef, NewTask, Priority, StatusFilter, Task, TaskId, TaskLogEntry, TaskUpdate,
};
use serde::{Deserialize, Serialize};

use super::optional_body;
use crate::AppState;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(submit_task))
        .route("/tasks/next", get(next_task))
        .route("/tasks/claim-next", post(claim_next))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/history", get(task_history))
        .route("/tasks/{id}/claim", post(claim_task))
        .route("/tasks/{id}/status", put(update_task))
        .route("/tasks/{id}/complete", post(complete_task))
        .route("/tasks/{id}/fail", post(fail_task))
        .route("/tasks/{id}/cancel", post(cancel_task))
        .route("/tasks/{id}/priority", put(set_priority))
}

/// Body sent by workers acting on a task. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct WorkerRequest {
    pub instance_id: Option<String>,
    pub instance_name: Option<String>,
    pub notes: Option<String>,
}

impl WorkerRequest {
    pub(crate) fn instance(&self) -> InstanceRef {
        InstanceRef::new(self.instance_id.clone(), self.instance_name.clone())
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
}

#[derive(Debug, Serialize)]
struct TaskListResponse {
    tasks: Vec<Task>,
    count: usize,
}

async fn list_tasks(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let filter = match query.status.as_deref() {
        Some(status) => status.parse::<StatusFilter>()?,
        None => StatusFilter::default(),
    };
    let tasks = state.queue.list(filter).await?;
    Ok(Json(TaskListResponse {
        count: tasks.len(),
        tasks,
    }))
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    #[serde(default)]
    description: String,
    priority: Option<String>,
    submitted_by: Option<String>,
}

#[derive(Debug, Serialize)]
struct TaskActionResponse {
    status: &'static str,
    task_id: TaskId,
    task: Task,
}

async fn submit_task(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SubmitRequest>,
) -> Result<(StatusCode, Json<TaskActionResponse>), ApiError> {
    let priority = match req.priority.as_deref() {
        Some(p) => p.parse::<Priority>()?,
        None => Priority::default(),
    };
    let task = state
        .queue
        .submit(NewTask {
            description: req.description,
            priority,
            submitted_by: Some(req.submitted_by.unwrap_or_else(|| "api".to_string())),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(TaskActionResponse {
            status: "pending",
            task_id: task.id,
            task,
        }),
    ))
}

#[derive(Debug, Serialize)]
struct NextTaskResponse {
    task: Option<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

impl From<Option<Task>> for NextTaskResponse {
    fn from(task: Option<Task>) -> Self {
        let message = task.is_none().then_some("No pending tasks");
        Self { task, message }
    }
}

async fn next_task(State(state): State<AppState>) -> Result<Json<NextTaskResponse>, ApiError> {
    Ok(Json(state.queue.peek_next().await?.into()))
}

async fn claim_next(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<NextTaskResponse>, ApiError> {
    let req: WorkerRequest = optional_body(&body)?;
    Ok(Json(state.queue.claim_next(&req.instance()).await?.into()))
}

async fn get_task(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TaskId>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.queue.get(id).await?))
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    task_id: TaskId,
    history: Vec<TaskLogEntry>,
}

async fn task_history(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TaskId>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let history = state.queue.history(id).await?;
    Ok(Json(HistoryResponse {
        task_id: id,
        history,
    }))
}

async fn claim_task(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TaskId>,
    body: Bytes,
) -> Result<Json<TaskActionResponse>, ApiError> {
    let req: WorkerRequest = optional_body(&body)?;
    let task = state.queue.claim(id, &req.instance()).await?;
    Ok(Json(TaskActionResponse {
        status: "claimed",
        task_id: id,
        task,
    }))
}

async fn update_task(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TaskId>,
    ApiJson(change): ApiJson<TaskUpdate>,
) -> Result<Json<TaskActionResponse>, ApiError> {
    let task = state.queue.update(id, change).await?;
    Ok(Json(TaskActionResponse {
        status: "updated",
        task_id: id,
        task,
    }))
}

#[derive(Debug, Serialize)]
struct CompleteResponse {
    status: &'static str,
    task_id: TaskId,
    task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_task: Option<Task>,
}

async fn complete_task(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TaskId>,
    body: Bytes,
) -> Result<Json<CompleteResponse>, ApiError> {
    let req: WorkerRequest = optional_body(&body)?;
    let completion = state
        .queue
        .complete(id, req.instance_id.as_deref(), req.notes.as_deref())
        .await?;
    Ok(Json(CompleteResponse {
        status: "completed",
        task_id: id,
        task: completion.task,
        next_task: completion.next_task,
    }))
}

async fn fail_task(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TaskId>,
    body: Bytes,
) -> Result<Json<TaskActionResponse>, ApiError> {
    let req: WorkerRequest = optional_body(&body)?;
    let task = state
        .queue
        .fail(id, req.instance_id.as_deref(), req.notes.as_deref())
        .await?;
    Ok(Json(TaskActionResponse {
        status: "failed",
        task_id: id,
        task,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct CancelRequest {
    actor: Option<String>,
}

async fn cancel_task(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TaskId>,
    body: Bytes,
) -> Result<Json<TaskActionResponse>, ApiError> {
    let req: CancelRequest = optional_body(&body)?;
    let actor = req.actor.unwrap_or_else(|| "api".to_string());
    let task = state.queue.cancel(id, &actor).await?;
    Ok(Json(TaskActionResponse {
        status: "cancelled",
        task_id: id,
        task,
    }))
}

#[derive(Debug, Deserialize)]
struct PriorityRequest {
    priority: String,
    actor: Option<String>,
}

async fn set_priority(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<TaskId>,
    ApiJson(req): ApiJson<PriorityRequest>,
) -> Result<Json<TaskActionResponse>, ApiError> {
    let priority = req.priority.parse::<Priority>()?;
    let actor = req.actor.unwrap_or_else(|| "api".to_string());
    let task = state.queue.set_priority(id, priority, &actor).await?;
    Ok(Json(TaskActionResponse {
        status: "updated",
        task_id: id,
        task,
    }))
}
