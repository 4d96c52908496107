//! CLI command implementations.

pub mod services;
pub mod tasks;

use anyhow::{Context, Result, bail};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

const API_KEY_HEADER: &str = "X-API-Key";

/// Thin client over the REST API.
pub struct ApiClient {
    base: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(api_url: &str, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("homeops-cli")
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            http,
        })
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_with_key(method, path, self.api_key.as_deref())
    }

    pub fn request_with_key(&self, method: Method, path: &str, key: Option<&str>) -> RequestBuilder {
        let request = self.http.request(method, format!("{}{}", self.base, path));
        match key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        send(self.request(Method::GET, path)).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T> {
        send(self.request(Method::POST, path).json(&body)).await
    }

    pub async fn put<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T> {
        send(self.request(Method::PUT, path).json(&body)).await
    }
}

/// Send a request and decode the JSON body, turning API errors into
/// `anyhow` errors carrying the server's message.
pub async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
    let response = request.send().await.context("Request failed")?;
    decode(response).await
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await.context("Failed to read response")?;
    if !status.is_success() {
        bail!("{} ({})", error_message(&body), status);
    }
    serde_json::from_str(&body).with_context(|| format!("Unexpected response: {}", body))
}

/// The `error` field of an API error body, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Identity a worker sends with claims and completions.
#[derive(Debug, Clone, Default)]
pub struct Worker {
    pub instance_id: Option<String>,
    pub instance_name: Option<String>,
}

impl Worker {
    pub fn body(&self) -> Value {
        json!({
            "instance_id": self.instance_id,
            "instance_name": self.instance_name,
        })
    }
}
