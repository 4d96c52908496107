//! Reading what a container is running.
//!
//! Two inspections per container: the container itself yields the image
//! reference, the image ID it runs and the OCI version label; the tag it was
//! created from yields the image ID the tag points to now and the registry
//! digest recorded at pull time. A container whose image ID differs from its
//! tag's was pulled but never recreated.

use homeops_core::Result;
use homeops_core::runner::RemoteRunner;
use homeops_core::service::ContainerVersion;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

static VERSION_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":(v?\d+\.\d+[.\d]*)").unwrap());

/// Go template output for a label that is not set.
const NO_VALUE: &str = "<no value>";

pub fn container_inspect_command(container: &str) -> String {
    format!(
        r#"docker inspect {} --format "{{{{.Config.Image}}}}|{{{{.Image}}}}|{{{{index .Config.Labels \"org.opencontainers.image.version\"}}}}" 2>/dev/null"#,
        container
    )
}

pub fn image_inspect_command(image_ref: &str) -> String {
    format!(
        r#"docker image inspect {} --format "{{{{.Id}}}}|{{{{index .RepoDigests 0}}}}" 2>/dev/null"#,
        image_ref
    )
}

/// Fields from the container inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInspect {
    pub image_ref: String,
    pub image_id: String,
    pub version_label: Option<String>,
}

/// Parse `image|image_id|label`. Anything shorter is not a usable answer.
pub fn parse_container_inspect(stdout: &str) -> Option<ContainerInspect> {
    let stdout = stdout.trim();
    if stdout.is_empty() {
        return None;
    }
    let parts: Vec<&str> = stdout.split('|').collect();
    if parts.len() < 3 {
        return None;
    }
    let label = parts[2].trim();
    Some(ContainerInspect {
        image_ref: parts[0].to_string(),
        image_id: parts[1].to_string(),
        version_label: (!label.is_empty() && label != NO_VALUE).then(|| label.to_string()),
    })
}

/// Parse `id|repo@digest` into the tag's image ID and its registry digest.
pub fn parse_image_inspect(stdout: &str) -> (Option<String>, Option<String>) {
    let stdout = stdout.trim();
    if stdout.is_empty() {
        return (None, None);
    }
    let mut parts = stdout.split('|');
    let image_id = parts
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    let digest = parts.next().and_then(|raw| match raw.split_once('@') {
        Some((_, digest)) if !digest.is_empty() => Some(digest.to_string()),
        None if raw.starts_with("sha256:") => Some(raw.to_string()),
        _ => None,
    });
    (image_id, digest)
}

/// Version to display when the image carries no label: a version-looking
/// tag, else a short image ID, else `unknown`.
pub fn fallback_version(image_ref: &str, image_id: &str) -> String {
    if let Some(tag) = VERSION_TAG.captures(image_ref).and_then(|c| c.get(1)) {
        return tag.as_str().trim_start_matches('v').to_string();
    }
    if image_id.is_empty() {
        return "unknown".to_string();
    }
    let len = if image_id.starts_with("sha256:") { 19 } else { 12 };
    image_id.chars().take(len).collect()
}

/// Inspect `container` on `host`.
///
/// `Ok(None)` means the container could not be inspected (missing, stopped
/// host, garbled output); runner failures such as timeouts are errors.
pub async fn inspect(
    runner: &dyn RemoteRunner,
    host: &str,
    container: &str,
    timeout: Duration,
) -> Result<Option<ContainerVersion>> {
    let output = runner
        .run(host, &container_inspect_command(container), timeout)
        .await?;
    if !output.success() {
        debug!(host, container, exit_code = output.exit_code, "Container inspect failed");
        return Ok(None);
    }
    let Some(found) = parse_container_inspect(&output.stdout) else {
        return Ok(None);
    };

    let tag = runner
        .run(host, &image_inspect_command(&found.image_ref), timeout)
        .await?;
    let (tag_image_id, tag_repo_digest) = if tag.success() {
        parse_image_inspect(&tag.stdout)
    } else {
        (None, None)
    };

    let version = found
        .version_label
        .clone()
        .unwrap_or_else(|| fallback_version(&found.image_ref, &found.image_id));

    Ok(Some(ContainerVersion {
        container_image_id: (!found.image_id.is_empty()).then(|| found.image_id.clone()),
        image_ref: found.image_ref,
        tag_image_id,
        tag_repo_digest,
        version,
    }))
}
