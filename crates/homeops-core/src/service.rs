//! Service registry types.
//!
//! A service is either a plain HTTP endpoint that is only health checked,
//! a container tracked against its upstream registry, or a locally built
//! container that is versioned but never updated in place.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How a service is deployed, which decides what can be checked and updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Health check only; no container to inspect.
    #[display("http_only")]
    HttpOnly,
    /// Container pulled from a public registry.
    #[display("docker")]
    Docker,
    /// Container built locally; redeployed out of band.
    #[display("local")]
    Local,
}

/// A service definition from the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDef {
    pub name: String,
    pub display_name: String,
    pub category: String,
    pub icon: String,
    pub kind: ServiceKind,
    pub host: Option<String>,
    pub compose_dir: Option<String>,
    pub container_name: Option<String>,
    /// Compose service name when it differs from the container name.
    pub compose_service: Option<String>,
    pub health_url: Option<String>,
    pub health_insecure: bool,
    pub web_url: Option<String>,
}

impl ServiceDef {
    /// The compose service to pull and recreate.
    pub fn compose_target(&self) -> Option<&str> {
        self.compose_service
            .as_deref()
            .or(self.container_name.as_deref())
    }

    /// Host and container, if this service runs a container.
    pub fn container(&self) -> Option<(&str, &str)> {
        match (self.host.as_deref(), self.container_name.as_deref()) {
            (Some(host), Some(container)) => Some((host, container)),
            _ => None,
        }
    }
}

/// A display category, in registry order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub key: String,
    pub display_name: String,
}

/// The full set of tracked services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceRegistry {
    pub categories: Vec<Category>,
    pub services: Vec<ServiceDef>,
    /// Services excluded from one-click updates.
    pub blacklist: HashSet<String>,
}

impl ServiceRegistry {
    pub fn get(&self, name: &str) -> Option<&ServiceDef> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn category(&self, key: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.key == key)
    }

    pub fn in_category<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a ServiceDef> + 'a {
        self.services.iter().filter(move |s| s.category == key)
    }

    pub fn is_blacklisted(&self, name: &str) -> bool {
        self.blacklist.contains(name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[display("online")]
    Online,
    #[display("offline")]
    Offline,
    #[default]
    #[display("unknown")]
    Unknown,
}

/// What `docker inspect` reports about a running container and its tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerVersion {
    /// Image reference the container was created from, e.g. `ghcr.io/org/app:release`.
    pub image_ref: String,
    /// Image ID the container is running.
    pub container_image_id: Option<String>,
    /// Image ID the tag currently points to on the host.
    pub tag_image_id: Option<String>,
    /// Registry digest recorded for the tag when it was pulled.
    pub tag_repo_digest: Option<String>,
    /// Human readable version.
    pub version: String,
}

/// Cached version state for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub current: String,
    pub current_digest: String,
    pub image_ref: String,
    pub latest_digest: String,
    pub update_available: bool,
    pub checked_at: DateTime<Utc>,
}

impl VersionEntry {
    /// Placeholder entry for a service whose version could not be read.
    pub fn placeholder(current: &str) -> Self {
        Self {
            current: current.to_string(),
            current_digest: String::new(),
            image_ref: String::new(),
            latest_digest: String::new(),
            update_available: false,
            checked_at: Utc::now(),
        }
    }
}

/// One service as presented to dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceView {
    pub name: String,
    pub display_name: String,
    pub category: String,
    pub icon: String,
    pub health: HealthStatus,
    pub web_url: String,
    pub host: String,
    #[serde(rename = "type")]
    pub kind: ServiceKind,
    pub current_version: String,
    pub update_available: bool,
    pub can_update: bool,
    pub blacklisted: bool,
}

/// Services of one category with counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryView {
    pub category: String,
    pub category_display: String,
    pub services: Vec<ServiceView>,
    pub total: usize,
    pub online: usize,
    pub updates_available: usize,
}

impl CategoryView {
    pub fn new(category: &Category, services: Vec<ServiceView>) -> Self {
        let online = services
            .iter()
            .filter(|s| s.health == HealthStatus::Online)
            .count();
        let updates_available = services.iter().filter(|s| s.update_available).count();
        Self {
            category: category.key.clone(),
            category_display: category.display_name.clone(),
            total: services.len(),
            services,
            online,
            updates_available,
        }
    }
}

/// Every category in registry order with fleet-wide totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceOverview {
    pub categories: Vec<CategoryView>,
    pub summary: OverviewTotals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverviewTotals {
    pub total: usize,
    pub online: usize,
    pub updates_available: usize,
    /// When the last health pass finished, if one has.
    pub last_health_check: Option<DateTime<Utc>>,
}

/// Per-category counters for the summary widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub key: String,
    pub name: String,
    pub total: usize,
    pub online: usize,
    pub updates: usize,
}

/// Fleet-wide counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub updates_available: usize,
    pub categories: Vec<CategorySummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docker_service(name: &str, category: &str) -> ServiceDef {
        ServiceDef {
            name: name.to_string(),
            display_name: name.to_string(),
            category: category.to_string(),
            icon: name.to_string(),
            kind: ServiceKind::Docker,
            host: Some("10.0.0.5".to_string()),
            compose_dir: Some(format!("/opt/{}", name)),
            container_name: Some(name.to_string()),
            compose_service: None,
            health_url: None,
            health_insecure: false,
            web_url: None,
        }
    }

    #[test]
    fn test_compose_target_prefers_compose_service() {
        let mut svc = docker_service("immich-ml", "apps");
        assert_eq!(svc.compose_target(), Some("immich-ml"));
        svc.compose_service = Some("immich-machine-learning".to_string());
        assert_eq!(svc.compose_target(), Some("immich-machine-learning"));
    }

    #[test]
    fn test_registry_lookups() {
        let registry = ServiceRegistry {
            categories: vec![Category {
                key: "media".to_string(),
                display_name: "Media Stack".to_string(),
            }],
            services: vec![
                docker_service("radarr", "media"),
                docker_service("sonarr", "media"),
                docker_service("grafana", "monitoring"),
            ],
            blacklist: ["grafana".to_string()].into_iter().collect(),
        };

        assert_eq!(registry.len(), 3);
        assert!(registry.get("radarr").is_some());
        assert!(registry.get("plex").is_none());
        assert_eq!(registry.in_category("media").count(), 2);
        assert!(registry.is_blacklisted("grafana"));
        assert!(!registry.is_blacklisted("radarr"));
    }

    #[test]
    fn test_category_view_counts() {
        let category = Category {
            key: "media".to_string(),
            display_name: "Media Stack".to_string(),
        };
        let view = |health, update_available| ServiceView {
            name: "svc".to_string(),
            display_name: "svc".to_string(),
            category: "media".to_string(),
            icon: String::new(),
            health,
            web_url: String::new(),
            host: String::new(),
            kind: ServiceKind::Docker,
            current_version: "1.0".to_string(),
            update_available,
            can_update: update_available,
            blacklisted: false,
        };

        let cat = CategoryView::new(
            &category,
            vec![
                view(HealthStatus::Online, true),
                view(HealthStatus::Offline, false),
                view(HealthStatus::Online, false),
            ],
        );
        assert_eq!(cat.total, 3);
        assert_eq!(cat.online, 2);
        assert_eq!(cat.updates_available, 1);
    }

    #[test]
    fn test_service_view_serializes_kind_as_type() {
        let json = serde_json::to_value(ServiceKind::HttpOnly).unwrap();
        assert_eq!(json, "http_only");
    }
}
