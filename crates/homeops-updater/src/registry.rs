//! Upstream registry lookups.
//!
//! Docker Hub and GHCR (plus lscr.io, which fronts GHCR) are queried with an
//! anonymous pull token and a `HEAD` on the tag's manifest. The digest
//! returned is the manifest list digest, which is what Docker records in
//! `RepoDigests` at pull time, so the two can be compared directly.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
application/vnd.docker.distribution.manifest.list.v2+json, \
application/vnd.docker.distribution.manifest.v2+json, \
application/vnd.oci.image.manifest.v1+json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registry {
    DockerHub,
    Ghcr,
}

/// A parsed image reference on a supported registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub registry: Registry,
    pub repository: String,
    pub tag: String,
}

impl ImageRef {
    /// Parse `[registry/]repo[:tag][@digest]`.
    ///
    /// Returns `None` for registries other than Docker Hub, GHCR and lscr.io.
    pub fn parse(reference: &str) -> Option<Self> {
        let reference = reference.trim();
        let name = match reference.split_once('@') {
            Some((name, _)) => name,
            None => reference,
        };
        if name.is_empty() {
            return None;
        }

        let last_slash = name.rfind('/');
        let (name, tag) = match name.rfind(':') {
            Some(colon) if last_slash.is_none_or(|slash| colon > slash) => {
                (&name[..colon], &name[colon + 1..])
            }
            _ => (name, "latest"),
        };
        let tag = if tag.is_empty() { "latest" } else { tag };

        let (registry, repository) = match name.split_once('/') {
            Some(("ghcr.io" | "lscr.io", rest)) => (Registry::Ghcr, rest.to_string()),
            Some(("docker.io" | "index.docker.io", rest)) => {
                (Registry::DockerHub, hub_repository(rest))
            }
            Some((host, _)) if host.contains('.') || host.contains(':') || host == "localhost" => {
                return None;
            }
            _ => (Registry::DockerHub, hub_repository(name)),
        };
        if repository.is_empty() {
            return None;
        }

        Some(Self {
            registry,
            repository,
            tag: tag.to_string(),
        })
    }

    pub fn token_url(&self) -> String {
        match self.registry {
            Registry::DockerHub => format!(
                "https://auth.docker.io/token?service=registry.docker.io&scope=repository:{}:pull",
                self.repository
            ),
            Registry::Ghcr => format!(
                "https://ghcr.io/token?service=ghcr.io&scope=repository:{}:pull",
                self.repository
            ),
        }
    }

    pub fn manifest_url(&self) -> String {
        match self.registry {
            Registry::DockerHub => format!(
                "https://registry-1.docker.io/v2/{}/manifests/{}",
                self.repository, self.tag
            ),
            Registry::Ghcr => format!(
                "https://ghcr.io/v2/{}/manifests/{}",
                self.repository, self.tag
            ),
        }
    }
}

/// Official images live under `library/`.
fn hub_repository(name: &str) -> String {
    if name.contains('/') {
        name.to_string()
    } else {
        format!("library/{}", name)
    }
}

/// Resolves the digest an image tag currently points to upstream.
#[async_trait]
pub trait DigestSource: Send + Sync {
    /// `None` when the registry is unsupported or unreachable.
    async fn latest_digest(&self, image_ref: &str) -> Option<String>;

    /// Drop expired cached digests, returning how many were removed.
    fn purge_expired(&self) -> usize {
        0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Registry error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Registry client with a digest cache.
pub struct RegistryClient {
    client: reqwest::Client,
    cache: TtlCache<String>,
}

impl RegistryClient {
    pub fn new(timeout: Duration, ttl: Duration) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("homeops")
            .build()
            .map_err(|e| RegistryError::Request(e.to_string()))?;
        Ok(Self {
            client,
            cache: TtlCache::new(ttl),
        })
    }

    async fn fetch_digest(&self, image: &ImageRef) -> Result<Option<String>, RegistryError> {
        let response = self
            .client
            .get(image.token_url())
            .send()
            .await
            .map_err(|e| RegistryError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RegistryError::Api(format!(
                "token request returned {}",
                response.status()
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Parse(e.to_string()))?;

        let response = self
            .client
            .head(image.manifest_url())
            .bearer_auth(&token.token)
            .header(reqwest::header::ACCEPT, MANIFEST_ACCEPT)
            .send()
            .await
            .map_err(|e| RegistryError::Request(e.to_string()))?;

        if image.registry == Registry::DockerHub {
            if let Some(remaining) = header(&response, "RateLimit-Remaining") {
                info!(repository = %image.repository, remaining, "Docker Hub rate limit");
            }
        }
        if !response.status().is_success() {
            return Err(RegistryError::Api(format!(
                "manifest request returned {}",
                response.status()
            )));
        }

        Ok(header(&response, "Docker-Content-Digest").map(str::to_string))
    }
}

fn header<'a>(response: &'a reqwest::Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

#[async_trait]
impl DigestSource for RegistryClient {
    async fn latest_digest(&self, image_ref: &str) -> Option<String> {
        if let Some(digest) = self.cache.get(image_ref) {
            return Some(digest);
        }
        let Some(image) = ImageRef::parse(image_ref) else {
            debug!(image_ref, "Registry not supported, skipping digest lookup");
            return None;
        };

        match self.fetch_digest(&image).await {
            Ok(Some(digest)) => {
                self.cache.insert(image_ref, digest.clone());
                Some(digest)
            }
            Ok(None) => {
                warn!(image_ref, "Registry returned no digest");
                None
            }
            Err(e) => {
                warn!(image_ref, error = %e, "Registry digest lookup failed");
                None
            }
        }
    }

    fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }
}
