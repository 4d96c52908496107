//! Service dashboard endpoints. Read-only and open, since dashboard widgets
//! poll them without credentials.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use homeops_core::service::{CategoryView, ServiceOverview, ServiceSummary};
use serde_json::{Value, json};

use crate::AppState;
use crate::error::ApiError;
use crate::extract::ApiPath;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/services", get(overview))
        .route("/services/{category}", get(category))
        .route("/summary", get(summary))
}

/// `/refresh` lives outside `/api`.
pub fn refresh_router() -> Router<AppState> {
    Router::new().route("/refresh", get(refresh).post(refresh))
}

async fn overview(State(state): State<AppState>) -> Json<ServiceOverview> {
    Json(state.updater.overview())
}

async fn category(
    State(state): State<AppState>,
    ApiPath(key): ApiPath<String>,
) -> Result<Json<CategoryView>, ApiError> {
    Ok(Json(state.updater.category(&key)?))
}

async fn summary(State(state): State<AppState>) -> Json<ServiceSummary> {
    Json(state.updater.summary())
}

async fn refresh(State(state): State<AppState>) -> Json<Value> {
    state.updater.refresh();
    Json(json!({ "status": "refresh started" }))
}
