//! API key checks.
//!
//! Keys are read from the `X-API-Key` header or the `api_key` query
//! parameter, the latter so dashboard widgets can embed them in URLs.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::AppState;
use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Guard for the task endpoints. Every request is refused when no key is
/// configured.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.api_key.as_deref() else {
        return Err(ApiError::Unauthorized(
            "Task API is disabled: no API key configured".to_string(),
        ));
    };
    check(expected, &request)?;
    Ok(next.run(request).await)
}

/// Guard for update triggers. Closed when no key is configured.
pub async fn require_update_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.update_api_key.as_deref() else {
        return Err(ApiError::Forbidden(
            "One-click updates are disabled: no update key configured".to_string(),
        ));
    };
    check(expected, &request)?;
    Ok(next.run(request).await)
}

fn check(expected: &str, request: &Request) -> Result<(), ApiError> {
    match presented_key(request.headers(), request.uri().query()) {
        Some(key) if key == expected => Ok(()),
        _ => Err(ApiError::Unauthorized("Invalid or missing API key".to_string())),
    }
}

fn presented_key(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(key.to_string());
    }
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(name, _)| name == "api_key")
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_presented_key_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_key(&headers, None), None);
        assert_eq!(
            presented_key(&headers, Some("status=all&api_key=s%20cret")),
            Some("s cret".to_string())
        );

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("from-header"));
        assert_eq!(
            presented_key(&headers, Some("api_key=from-query")),
            Some("from-header".to_string())
        );
    }
}
