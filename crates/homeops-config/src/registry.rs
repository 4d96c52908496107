//! Service registry parsing.
//!
//! ```kdl
//! category "media" "Media Stack"
//! blacklist "traefik" "glance"
//!
//! service "radarr" {
//!     display-name "Radarr"
//!     category "media"
//!     host "192.168.40.11"
//!     compose-dir "/opt/arr-stack"
//!     health-url "http://192.168.40.11:7878/ping"
//! }
//! ```

use crate::{ConfigError, ConfigResult};
use homeops_core::service::{Category, ServiceDef, ServiceKind, ServiceRegistry};
use kdl::{KdlDocument, KdlNode};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Read and parse a registry file.
pub fn load_registry(path: impl AsRef<Path>) -> ConfigResult<ServiceRegistry> {
    let content = std::fs::read_to_string(path)?;
    parse_registry(&content)
}

/// Parse a service registry from KDL text.
pub fn parse_registry(kdl: &str) -> ConfigResult<ServiceRegistry> {
    let doc: KdlDocument = kdl.parse()?;

    let mut categories = Vec::new();
    let mut services = Vec::new();
    let mut blacklist = HashSet::new();

    for node in doc.nodes() {
        match node.name().value() {
            "category" => {
                categories.push(parse_category(node)?);
            }
            "service" => {
                services.push(parse_service(node)?);
            }
            "blacklist" => {
                blacklist.extend(get_all_string_args(node));
            }
            _ => {} // Ignore unknown nodes
        }
    }

    let mut seen_categories = HashSet::new();
    for category in &categories {
        if !seen_categories.insert(category.key.as_str()) {
            return Err(ConfigError::Duplicate(format!("category '{}'", category.key)));
        }
    }

    let mut seen_services = HashSet::new();
    for service in &services {
        if !seen_services.insert(service.name.as_str()) {
            return Err(ConfigError::Duplicate(format!("service '{}'", service.name)));
        }
        if !seen_categories.contains(service.category.as_str()) {
            return Err(ConfigError::UnknownCategory {
                service: service.name.clone(),
                category: service.category.clone(),
            });
        }
    }

    for name in &blacklist {
        if !seen_services.contains(name.as_str()) {
            return Err(ConfigError::UnknownService(name.clone()));
        }
    }

    Ok(ServiceRegistry {
        categories,
        services,
        blacklist,
    })
}

fn parse_category(node: &KdlNode) -> ConfigResult<Category> {
    let args = get_all_string_args(node);
    let key = args
        .first()
        .cloned()
        .ok_or_else(|| ConfigError::MissingField("category key".to_string()))?;
    let display_name = args.get(1).cloned().unwrap_or_else(|| key.clone());
    Ok(Category { key, display_name })
}

fn parse_service(node: &KdlNode) -> ConfigResult<ServiceDef> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("service name".to_string()))?;

    let mut fields: HashMap<String, String> = HashMap::new();
    let mut health_insecure = get_bool_prop(node, "health-insecure").unwrap_or(false);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let key = child.name().value();
            if key == "health-insecure" {
                health_insecure = get_first_bool_arg(child).unwrap_or(true);
                continue;
            }
            if let Some(value) = get_first_string_arg(child) {
                fields.insert(key.to_string(), value);
            }
        }
    }

    let kind = match fields.get("kind").map(String::as_str) {
        None | Some("docker") => ServiceKind::Docker,
        Some("local") => ServiceKind::Local,
        Some("http_only") | Some("http-only") => ServiceKind::HttpOnly,
        Some(other) => {
            return Err(ConfigError::InvalidValue {
                field: format!("kind of service '{}'", name),
                message: format!("unknown kind: {}", other),
            });
        }
    };

    let category = fields
        .remove("category")
        .ok_or_else(|| ConfigError::MissingField(format!("category for service '{}'", name)))?;

    let host = fields.remove("host");
    let compose_dir = fields.remove("compose-dir");
    let health_url = fields.remove("health-url");
    let container_name = match kind {
        ServiceKind::HttpOnly => fields.remove("container"),
        ServiceKind::Docker | ServiceKind::Local => {
            Some(fields.remove("container").unwrap_or_else(|| name.clone()))
        }
    };

    match kind {
        ServiceKind::HttpOnly => {
            if health_url.is_none() {
                return Err(ConfigError::MissingField(format!(
                    "health-url for http_only service '{}'",
                    name
                )));
            }
        }
        ServiceKind::Docker | ServiceKind::Local => {
            if host.is_none() {
                return Err(ConfigError::MissingField(format!("host for service '{}'", name)));
            }
            if compose_dir.is_none() {
                return Err(ConfigError::MissingField(format!(
                    "compose-dir for service '{}'",
                    name
                )));
            }
        }
    }

    Ok(ServiceDef {
        display_name: fields.remove("display-name").unwrap_or_else(|| name.clone()),
        icon: fields.remove("icon").unwrap_or_else(|| name.clone()),
        compose_service: fields.remove("compose-service"),
        web_url: fields.remove("web-url"),
        name,
        category,
        kind,
        host,
        compose_dir,
        container_name,
        health_url,
        health_insecure,
    })
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_bool_arg(node: &KdlNode) -> Option<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_bool_prop(node: &KdlNode, name: &str) -> Option<bool> {
    node.get(name).and_then(|v| v.as_bool())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        category "infrastructure" "Critical Infrastructure"
        category "media" "Media Stack"
        category "apis_bots" "Custom APIs & Bots"

        blacklist "traefik"

        service "node01" {
            display-name "Node 01"
            category "infrastructure"
            icon "proxmox"
            kind "http_only"
            health-url "https://192.168.20.20:8006"
            health-insecure #true
        }

        service "traefik" {
            category "infrastructure"
            host "192.168.40.20"
            compose-dir "/opt/traefik"
            health-url "http://192.168.40.20:8082/ping"
        }

        service "immich-ml" {
            display-name "Immich ML"
            category "media"
            host "192.168.40.22"
            compose-dir "/opt/immich"
            compose-service "immich-machine-learning"
        }

        service "sentinel-bot" {
            category "apis_bots"
            kind "local"
            host "192.168.40.13"
            compose-dir "/opt/sentinel-bot"
            health-url "http://192.168.40.13:5050/health"
        }
    "#;

    #[test]
    fn test_parse_registry() {
        let registry = parse_registry(SAMPLE).unwrap();
        assert_eq!(registry.categories.len(), 3);
        assert_eq!(registry.categories[2].display_name, "Custom APIs & Bots");
        assert_eq!(registry.len(), 4);
        assert!(registry.is_blacklisted("traefik"));

        let node = registry.get("node01").unwrap();
        assert_eq!(node.kind, ServiceKind::HttpOnly);
        assert!(node.health_insecure);
        assert!(node.container_name.is_none());
        assert_eq!(node.display_name, "Node 01");

        let traefik = registry.get("traefik").unwrap();
        assert_eq!(traefik.kind, ServiceKind::Docker);
        assert_eq!(traefik.container_name.as_deref(), Some("traefik"));
        assert_eq!(traefik.display_name, "traefik");
        assert!(!traefik.health_insecure);

        let ml = registry.get("immich-ml").unwrap();
        assert_eq!(ml.compose_target(), Some("immich-machine-learning"));

        let bot = registry.get("sentinel-bot").unwrap();
        assert_eq!(bot.kind, ServiceKind::Local);
    }

    #[test]
    fn test_shipped_registry_parses() {
        let registry = parse_registry(include_str!("../../../config/services.kdl")).unwrap();
        assert_eq!(registry.categories.len(), 6);
        assert!(registry.is_blacklisted("glance"));
        assert_eq!(registry.get("pihole").unwrap().kind, ServiceKind::HttpOnly);
        assert_eq!(registry.get("sentinel-bot").unwrap().kind, ServiceKind::Local);
    }

    #[test]
    fn test_registry_preserves_order() {
        let registry = parse_registry(SAMPLE).unwrap();
        let names: Vec<_> = registry.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["node01", "traefik", "immich-ml", "sentinel-bot"]);
    }

    #[test]
    fn test_unknown_category_rejected() {
        let kdl = r#"
            category "media" "Media"
            service "radarr" {
                category "movies"
                host "10.0.0.1"
                compose-dir "/opt/arr"
            }
        "#;
        assert!(matches!(
            parse_registry(kdl).unwrap_err(),
            ConfigError::UnknownCategory { category, .. } if category == "movies"
        ));
    }

    #[test]
    fn test_duplicate_service_rejected() {
        let kdl = r#"
            category "media" "Media"
            service "radarr" {
                category "media"
                host "10.0.0.1"
                compose-dir "/opt/arr"
            }
            service "radarr" {
                category "media"
                host "10.0.0.2"
                compose-dir "/opt/arr"
            }
        "#;
        assert!(matches!(
            parse_registry(kdl).unwrap_err(),
            ConfigError::Duplicate(_)
        ));
    }

    #[test]
    fn test_container_service_requires_host() {
        let kdl = r#"
            category "media" "Media"
            service "radarr" {
                category "media"
                compose-dir "/opt/arr"
            }
        "#;
        assert!(matches!(
            parse_registry(kdl).unwrap_err(),
            ConfigError::MissingField(_)
        ));
    }

    #[test]
    fn test_http_only_requires_health_url() {
        let kdl = r#"
            category "infra" "Infra"
            service "nas" {
                category "infra"
                kind "http_only"
            }
        "#;
        assert!(matches!(
            parse_registry(kdl).unwrap_err(),
            ConfigError::MissingField(_)
        ));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let kdl = r#"
            category "infra" "Infra"
            service "nas" {
                category "infra"
                kind "vm"
            }
        "#;
        assert!(matches!(
            parse_registry(kdl).unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_blacklist_must_name_known_service() {
        let kdl = r#"
            category "infra" "Infra"
            blacklist "glance"
        "#;
        assert!(matches!(
            parse_registry(kdl).unwrap_err(),
            ConfigError::UnknownService(name) if name == "glance"
        ));
    }

    #[test]
    fn test_blacklist_may_precede_service() {
        let kdl = r#"
            category "infra" "Infra"
            blacklist "glance" "traefik"
            service "traefik" {
                category "infra"
                host "10.0.0.1"
                compose-dir "/opt/traefik"
            }
            service "glance" {
                category "infra"
                host "10.0.0.1"
                compose-dir "/opt/glance"
            }
        "#;
        let registry = parse_registry(kdl).unwrap();
        assert!(registry.is_blacklisted("glance"));
        assert!(registry.is_blacklisted("traefik"));

        let duplicated = format!(
            "{}{}",
            kdl,
            r#"
            service "glance" {
                category "infra"
                host "10.0.0.2"
                compose-dir "/opt/glance"
            }
            "#
        );
        let err = parse_registry(&duplicated).unwrap_err();
        assert!(matches!(err, ConfigError::Duplicate(msg) if msg == "service 'glance'"));
    }
}
