//! API routes.

pub mod health;
pub mod instances;
pub mod services;
pub mod tasks;
pub mod updates;

use crate::AppState;
use crate::auth::require_api_key;
use axum::Router;
use axum::body::Bytes;
use axum::middleware::from_fn_with_state;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    let queue_api = Router::new()
        .merge(tasks::router())
        .merge(instances::router())
        .route_layer(from_fn_with_state(state.clone(), require_api_key));

    let api = Router::new()
        .merge(queue_api)
        .merge(services::router())
        .merge(updates::router(state.clone()));

    Router::new()
        .nest("/api", api)
        .merge(services::refresh_router())
        .merge(health::router())
        .with_state(state)
}

/// Parse an optional JSON body; an empty body yields the default.
pub(crate) fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(body)?)
}
