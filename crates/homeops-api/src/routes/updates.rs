//! One-click container updates.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::{Json, Router};
use homeops_core::update::{UpdateJob, UpdateRecord};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::require_update_key;
use crate::error::ApiError;
use crate::extract::{ApiPath, ApiQuery};

/// Header naming who started an update, recorded in the history.
const TRIGGERED_BY_HEADER: &str = "x-triggered-by";

pub fn router(state: AppState) -> Router<AppState> {
    let guarded = Router::new()
        .route("/update/{service}", post(trigger_update))
        .route_layer(from_fn_with_state(state, require_update_key));

    Router::new()
        .merge(guarded)
        .route("/update-status/{job_id}", get(update_status))
        .route("/updates/history", get(update_history))
}

#[derive(Debug, Serialize)]
struct TriggerResponse {
    task_id: String,
    status: &'static str,
    service: String,
}

async fn trigger_update(
    State(state): State<AppState>,
    ApiPath(service): ApiPath<String>,
    headers: HeaderMap,
) -> Result<Json<TriggerResponse>, ApiError> {
    let triggered_by = headers
        .get(TRIGGERED_BY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("api");
    let job = state.updater.trigger(&service, triggered_by)?;
    Ok(Json(TriggerResponse {
        task_id: job.id.to_string(),
        status: "started",
        service: job.service,
    }))
}

async fn update_status(
    State(state): State<AppState>,
    ApiPath(job_id): ApiPath<String>,
) -> Result<Json<UpdateJob>, ApiError> {
    Ok(Json(state.updater.status(&job_id)?))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    service: Option<String>,
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    history: Vec<UpdateRecord>,
}

async fn update_history(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 200);
    let history = state
        .updater
        .history(query.service.as_deref(), limit)
        .await?;
    Ok(Json(HistoryResponse { history }))
}
