//! Health check endpoints.

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use serde_json::{Value, json};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "homeops",
        "services": state.updater.registry().len(),
    }))
}

async fn ready(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    homeops_db::ping(&state.pool)
        .await
        .map_err(|e| ApiError::Internal(format!("database unavailable: {}", e)))?;
    Ok(Json(json!({ "status": "ready" })))
}
