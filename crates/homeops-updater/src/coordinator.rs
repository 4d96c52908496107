//! The update coordinator.
//!
//! Owns the health and version caches, builds dashboard views from them and
//! runs one-click updates. At most one update runs per service: the
//! per-service lock is taken in `trigger` and held by the spawned job.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use homeops_config::UpdaterConfig;
use homeops_core::runner::RemoteRunner;
use homeops_core::service::{
    CategorySummary, CategoryView, ContainerVersion, HealthStatus, OverviewTotals,
    ServiceDef, ServiceKind, ServiceOverview, ServiceRegistry, ServiceSummary, ServiceView,
    VersionEntry,
};
use homeops_core::update::{UpdateJob, UpdateRecord, UpdateStatus};
use homeops_core::{Error, ResourceId, Result};
use homeops_db::UpdateHistoryRepo;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info, warn};

use crate::health::HealthChecker;
use crate::registry::DigestSource;
use crate::version;

pub struct UpdateCoordinator {
    registry: Arc<ServiceRegistry>,
    runner: Arc<dyn RemoteRunner>,
    digests: Arc<dyn DigestSource>,
    history: Arc<dyn UpdateHistoryRepo>,
    health_checker: HealthChecker,
    config: UpdaterConfig,
    health: RwLock<HashMap<String, HealthStatus>>,
    last_health_check: RwLock<Option<DateTime<Utc>>>,
    versions: RwLock<HashMap<String, VersionEntry>>,
    jobs: RwLock<HashMap<ResourceId, UpdateJob>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl UpdateCoordinator {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        runner: Arc<dyn RemoteRunner>,
        digests: Arc<dyn DigestSource>,
        history: Arc<dyn UpdateHistoryRepo>,
        config: UpdaterConfig,
    ) -> Result<Self> {
        let health_checker = HealthChecker::new(runner.clone(), &config)?;
        Ok(Self {
            registry,
            runner,
            digests,
            history,
            health_checker,
            config,
            health: RwLock::new(HashMap::new()),
            last_health_check: RwLock::new(None),
            versions: RwLock::new(HashMap::new()),
            jobs: RwLock::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    // -- Refresh ------------------------------------------------------------

    /// Check every service concurrently and replace the cached results.
    pub async fn refresh_health(&self) {
        let checks = self.registry.services.iter().map(|svc| async move {
            (svc.name.clone(), self.health_checker.check(svc).await)
        });
        let results = join_all(checks).await;
        let online = results
            .iter()
            .filter(|(_, status)| *status == HealthStatus::Online)
            .count();

        self.health.write().extend(results);
        *self.last_health_check.write() = Some(Utc::now());
        info!(total = self.registry.len(), online, "Health check complete");
    }

    /// Re-read versions one service at a time to keep SSH load low.
    pub async fn refresh_versions(&self) {
        let mut updates = 0;
        for svc in &self.registry.services {
            if let Some(entry) = self.check_version(svc).await {
                if entry.update_available {
                    updates += 1;
                }
                self.versions.write().insert(svc.name.clone(), entry);
            }
        }
        info!(updates_available = updates, "Version check complete");
    }

    /// Start both refreshes in the background.
    pub fn refresh(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.refresh_health().await });
        let this = Arc::clone(self);
        tokio::spawn(async move { this.refresh_versions().await });
    }

    async fn check_version(&self, svc: &ServiceDef) -> Option<VersionEntry> {
        if svc.kind == ServiceKind::HttpOnly {
            return None;
        }
        let (host, container) = svc.container()?;
        let inspected = version::inspect(
            self.runner.as_ref(),
            host,
            container,
            self.config.inspect_timeout,
        )
        .await;

        let entry = match (svc.kind, inspected) {
            (ServiceKind::Local, Ok(Some(found))) => entry_from(found, None, false),
            (ServiceKind::Local, _) => VersionEntry::placeholder("custom"),
            (_, Ok(Some(found))) => self.compare_upstream(&svc.name, found).await,
            (_, Ok(None)) => VersionEntry::placeholder("unknown"),
            (_, Err(e)) => {
                error!(service = %svc.name, error = %e, "Version check failed");
                VersionEntry::placeholder("error")
            }
        };
        Some(entry)
    }

    /// Pulled-but-not-recreated wins; otherwise ask the registry.
    async fn compare_upstream(&self, service: &str, found: ContainerVersion) -> VersionEntry {
        let pulled_not_recreated = match (&found.container_image_id, &found.tag_image_id) {
            (Some(running), Some(tagged)) => running != tagged,
            _ => false,
        };
        if pulled_not_recreated {
            info!(service, "Newer image pulled but container not recreated");
            let latest = found.tag_repo_digest.clone();
            return entry_from(found, latest, true);
        }

        let Some(local_digest) = found.tag_repo_digest.clone() else {
            return entry_from(found, None, false);
        };
        match self.digests.latest_digest(&found.image_ref).await {
            Some(remote) => {
                let update_available = remote != local_digest;
                if update_available {
                    info!(service, image = %found.image_ref, "Registry has a newer image");
                }
                entry_from(found, Some(remote), update_available)
            }
            None => entry_from(found, Some(local_digest), false),
        }
    }

    // -- Updates ------------------------------------------------------------

    /// Start pulling and recreating `service` in the background.
    pub fn trigger(self: &Arc<Self>, service: &str, triggered_by: &str) -> Result<UpdateJob> {
        let svc = self
            .registry
            .get(service)
            .ok_or_else(|| Error::NotFound("Unknown service".to_string()))?
            .clone();
        match svc.kind {
            ServiceKind::HttpOnly => {
                return Err(Error::InvalidInput("Not a Docker service".to_string()));
            }
            ServiceKind::Local => {
                return Err(Error::InvalidInput(
                    "Custom-built service. Redeploy it from source.".to_string(),
                ));
            }
            ServiceKind::Docker => {}
        }
        if self.registry.is_blacklisted(service) {
            return Err(Error::Forbidden(format!(
                "Service '{}' is blacklisted from one-click updates for safety.",
                service
            )));
        }
        let plan = UpdatePlan::for_service(&svc)?;

        let guard = self
            .lock_for(service)
            .try_lock_owned()
            .map_err(|_| Error::Conflict("Update already in progress".to_string()))?;

        let job = UpdateJob::start(service);
        self.jobs.write().insert(job.id, job.clone());
        info!(service, job_id = %job.id, triggered_by, "Update started");

        let this = Arc::clone(self);
        let job_id = job.id;
        let triggered_by = triggered_by.to_string();
        tokio::spawn(async move {
            this.run_update(job_id, svc, plan, triggered_by, guard).await;
        });

        Ok(job)
    }

    fn lock_for(&self, service: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(service.to_string())
            .or_default()
            .clone()
    }

    async fn run_update(
        &self,
        job_id: ResourceId,
        svc: ServiceDef,
        plan: UpdatePlan,
        triggered_by: String,
        _guard: OwnedMutexGuard<()>,
    ) {
        self.log_job(job_id, format!("Pulling {} on {}...", plan.target, plan.host));
        let (stdout, code) = self
            .run_step(&plan.host, &plan.pull_command(), self.config.pull_timeout)
            .await;
        self.log_job(job_id, format!("Pull output: {}", stdout));

        let status = if code != 0 {
            self.log_job(job_id, format!("Pull failed (rc={})", code));
            UpdateStatus::Failed
        } else {
            let (stdout, code) = self
                .run_step(&plan.host, &plan.recreate_command(), self.config.recreate_timeout)
                .await;
            self.log_job(job_id, format!("Recreate output: {}", stdout));
            if code == 0 {
                self.mark_current(&svc).await;
                UpdateStatus::Success
            } else {
                self.log_job(job_id, format!("Recreate failed (rc={})", code));
                UpdateStatus::Failed
            }
        };

        let finished = {
            let mut jobs = self.jobs.write();
            jobs.get_mut(&job_id).map(|job| {
                job.finish(status);
                job.clone()
            })
        };
        info!(service = %svc.name, job_id = %job_id, status = %status, "Update finished");

        if let Some(job) = finished {
            let record = UpdateRecord {
                id: job.id.to_string(),
                service: job.service,
                host: Some(plan.host),
                status: job.status.to_string(),
                triggered_by,
                started_at: job.started,
                completed_at: job.completed,
                output: job.output,
            };
            if let Err(e) = self.history.record(&record).await {
                warn!(job_id = %job_id, error = %e, "Failed to record update history");
            }
        }
    }

    /// Run one step, folding runner failures into exit code -1.
    async fn run_step(&self, host: &str, command: &str, timeout: std::time::Duration) -> (String, i32) {
        match self.runner.run(host, command, timeout).await {
            Ok(output) => (output.stdout, output.exit_code),
            Err(e) => {
                warn!(host, error = %e, "Update step failed to run");
                (e.to_string(), -1)
            }
        }
    }

    /// After a successful recreate the container runs the tag's image.
    async fn mark_current(&self, svc: &ServiceDef) {
        let Some((host, container)) = svc.container() else {
            return;
        };
        let fresh = version::inspect(
            self.runner.as_ref(),
            host,
            container,
            self.config.inspect_timeout,
        )
        .await;
        let mut versions = self.versions.write();
        match fresh {
            Ok(Some(found)) => {
                let latest = found.tag_repo_digest.clone();
                versions.insert(svc.name.clone(), entry_from(found, latest, false));
            }
            _ => {
                if let Some(entry) = versions.get_mut(&svc.name) {
                    entry.update_available = false;
                    entry.checked_at = Utc::now();
                }
            }
        }
    }

    fn log_job(&self, job_id: ResourceId, line: String) {
        if let Some(job) = self.jobs.write().get_mut(&job_id) {
            job.log(line);
        }
    }

    /// Snapshot of a job by its id string.
    pub fn status(&self, job_id: &str) -> Result<UpdateJob> {
        job_id
            .parse::<ResourceId>()
            .ok()
            .and_then(|id| self.jobs.read().get(&id).cloned())
            .ok_or_else(|| Error::NotFound("Unknown task".to_string()))
    }

    /// Forget jobs that finished more than the retention period ago.
    pub fn cleanup_jobs(&self) -> usize {
        let retention = chrono::Duration::from_std(self.config.job_retention)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let cutoff = Utc::now() - retention;
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, job| !job.finished_before(cutoff));
        before - jobs.len()
    }

    pub async fn history(&self, service: Option<&str>, limit: i64) -> Result<Vec<UpdateRecord>> {
        Ok(self.history.recent(service, limit).await?)
    }

    /// Drop expired registry digests.
    pub fn purge_digests(&self) -> usize {
        self.digests.purge_expired()
    }

    // -- Views --------------------------------------------------------------

    pub fn service_view(&self, svc: &ServiceDef) -> ServiceView {
        let health = self.health.read().get(&svc.name).copied().unwrap_or_default();
        let entry = self.versions.read().get(&svc.name).cloned();
        let blacklisted = self.registry.is_blacklisted(&svc.name);
        let update_available = entry.as_ref().is_some_and(|e| e.update_available);
        let current_version = match entry {
            Some(entry) => entry.current,
            None if svc.kind == ServiceKind::HttpOnly => "N/A".to_string(),
            None => "...".to_string(),
        };

        ServiceView {
            name: svc.name.clone(),
            display_name: svc.display_name.clone(),
            category: svc.category.clone(),
            icon: svc.icon.clone(),
            health,
            web_url: svc.web_url.clone().unwrap_or_default(),
            host: svc.host.clone().unwrap_or_default(),
            kind: svc.kind,
            current_version,
            update_available,
            can_update: svc.kind == ServiceKind::Docker && !blacklisted && update_available,
            blacklisted,
        }
    }

    fn category_views(&self) -> Vec<CategoryView> {
        self.registry
            .categories
            .iter()
            .map(|category| {
                let services = self
                    .registry
                    .in_category(&category.key)
                    .map(|svc| self.service_view(svc))
                    .collect();
                CategoryView::new(category, services)
            })
            .collect()
    }

    /// Every category with fleet totals.
    pub fn overview(&self) -> ServiceOverview {
        let categories = self.category_views();
        let summary = OverviewTotals {
            total: categories.iter().map(|c| c.total).sum(),
            online: categories.iter().map(|c| c.online).sum(),
            updates_available: categories.iter().map(|c| c.updates_available).sum(),
            last_health_check: *self.last_health_check.read(),
        };
        ServiceOverview {
            categories,
            summary,
        }
    }

    pub fn category(&self, key: &str) -> Result<CategoryView> {
        let category = self
            .registry
            .category(key)
            .ok_or_else(|| Error::NotFound("Unknown category".to_string()))?;
        let services = self
            .registry
            .in_category(key)
            .map(|svc| self.service_view(svc))
            .collect();
        Ok(CategoryView::new(category, services))
    }

    pub fn summary(&self) -> ServiceSummary {
        let categories: Vec<CategorySummary> = self
            .category_views()
            .into_iter()
            .map(|view| CategorySummary {
                key: view.category,
                name: view.category_display,
                total: view.total,
                online: view.online,
                updates: view.updates_available,
            })
            .collect();
        let total: usize = categories.iter().map(|c| c.total).sum();
        let online: usize = categories.iter().map(|c| c.online).sum();
        ServiceSummary {
            total,
            online,
            offline: total - online,
            updates_available: categories.iter().map(|c| c.updates).sum(),
            categories,
        }
    }
}

fn entry_from(found: ContainerVersion, latest: Option<String>, update_available: bool) -> VersionEntry {
    VersionEntry {
        current: found.version,
        current_digest: found.container_image_id.unwrap_or_default(),
        image_ref: found.image_ref,
        latest_digest: latest.unwrap_or_default(),
        update_available,
        checked_at: Utc::now(),
    }
}

/// Where and what to pull for one service.
struct UpdatePlan {
    host: String,
    compose_dir: String,
    target: String,
}

impl UpdatePlan {
    fn for_service(svc: &ServiceDef) -> Result<Self> {
        match (svc.host.as_deref(), svc.compose_dir.as_deref(), svc.compose_target()) {
            (Some(host), Some(dir), Some(target)) => Ok(Self {
                host: host.to_string(),
                compose_dir: dir.to_string(),
                target: target.to_string(),
            }),
            _ => Err(Error::InvalidInput(format!(
                "service '{}' has no host or compose directory",
                svc.name
            ))),
        }
    }

    fn pull_command(&self) -> String {
        format!("cd {} && docker compose pull {}", self.compose_dir, self.target)
    }

    fn recreate_command(&self) -> String {
        format!(
            "cd {} && docker compose up -d --force-recreate {}",
            self.compose_dir, self.target
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedRunner, StaticDigests, registry};
    use homeops_db::{SqliteUpdateHistoryRepo, create_pool, run_migrations};
    use std::time::Duration;
    use tokio::sync::Notify;

    const RADARR_INSPECT: &str = "docker inspect radarr --format";
    const RADARR_TAG: &str = "docker image inspect lscr.io/linuxserver/radarr:latest";

    async fn coordinator(
        runner: ScriptedRunner,
        digests: StaticDigests,
    ) -> (Arc<UpdateCoordinator>, Arc<ScriptedRunner>) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let runner = Arc::new(runner);
        let coordinator = UpdateCoordinator::new(
            Arc::new(registry()),
            runner.clone(),
            Arc::new(digests),
            Arc::new(SqliteUpdateHistoryRepo::new(pool)),
            UpdaterConfig::default(),
        )
        .unwrap();
        (Arc::new(coordinator), runner)
    }

    fn digests(pairs: &[(&str, &str)]) -> StaticDigests {
        StaticDigests(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    async fn wait_for_finish(coordinator: &UpdateCoordinator, job_id: ResourceId) -> UpdateJob {
        for _ in 0..200 {
            let job = coordinator.status(&job_id.to_string()).unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} never finished", job_id);
    }

    #[tokio::test]
    async fn test_pulled_but_not_recreated_is_an_update() {
        let runner = ScriptedRunner::new()
            .respond(RADARR_INSPECT, 0, "lscr.io/linuxserver/radarr:latest|sha256:old|5.2.0")
            .respond(RADARR_TAG, 0, "sha256:new|lscr.io/linuxserver/radarr@sha256:d1");
        let (coordinator, _) = coordinator(runner, StaticDigests::default()).await;

        coordinator.refresh_versions().await;
        let view = coordinator.service_view(coordinator.registry().get("radarr").unwrap());
        assert_eq!(view.current_version, "5.2.0");
        assert!(view.update_available);
        assert!(view.can_update);
    }

    #[tokio::test]
    async fn test_registry_digest_comparison() {
        let runner = ScriptedRunner::new()
            .respond(RADARR_INSPECT, 0, "lscr.io/linuxserver/radarr:latest|sha256:same|<no value>")
            .respond(RADARR_TAG, 0, "sha256:same|lscr.io/linuxserver/radarr@sha256:d1");

        let (current, _) = coordinator(
            runner,
            digests(&[("lscr.io/linuxserver/radarr:latest", "sha256:d1")]),
        )
        .await;
        current.refresh_versions().await;
        let entry = current.versions.read().get("radarr").cloned().unwrap();
        assert!(!entry.update_available);
        assert_eq!(entry.latest_digest, "sha256:d1");
        assert_eq!(entry.current, "sha256:same");

        let runner = ScriptedRunner::new()
            .respond(RADARR_INSPECT, 0, "lscr.io/linuxserver/radarr:latest|sha256:same|5.2.0")
            .respond(RADARR_TAG, 0, "sha256:same|lscr.io/linuxserver/radarr@sha256:d1");
        let (stale, _) = coordinator(
            runner,
            digests(&[("lscr.io/linuxserver/radarr:latest", "sha256:d2")]),
        )
        .await;
        stale.refresh_versions().await;
        let entry = stale.versions.read().get("radarr").cloned().unwrap();
        assert!(entry.update_available);
        assert_eq!(entry.latest_digest, "sha256:d2");
    }

    #[tokio::test]
    async fn test_version_placeholders() {
        let runner = ScriptedRunner::new()
            .time_out("docker inspect sonarr")
            .respond("docker inspect bot", 0, "bot:local|sha256:abc|<no value>")
            .respond("docker image inspect bot:local", 0, "sha256:abc|<no value>");
        let (coordinator, runner) = coordinator(runner, StaticDigests::default()).await;
        coordinator.refresh_versions().await;

        let versions = coordinator.versions.read().clone();
        assert_eq!(versions["radarr"].current, "unknown");
        assert_eq!(versions["sonarr"].current, "error");
        assert_eq!(versions["bot"].current, "sha256:abc");
        assert!(!versions["bot"].update_available);
        assert!(!versions.contains_key("pihole"));
        assert!(!runner.calls().iter().any(|c| c.contains("pihole")));

        let pihole = coordinator.service_view(coordinator.registry().get("pihole").unwrap());
        assert_eq!(pihole.current_version, "N/A");
    }

    #[tokio::test]
    async fn test_views_before_any_refresh() {
        let (coordinator, _) = coordinator(ScriptedRunner::new(), StaticDigests::default()).await;

        let overview = coordinator.overview();
        let keys: Vec<_> = overview.categories.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(keys, vec!["media", "network"]);
        assert_eq!(overview.summary.total, 4);
        assert_eq!(overview.summary.last_health_check, None);
        assert_eq!(overview.categories[0].services[0].current_version, "...");
        assert_eq!(overview.categories[0].services[0].health, HealthStatus::Unknown);

        assert!(matches!(coordinator.category("storage"), Err(Error::NotFound(_))));
        assert_eq!(coordinator.category("network").unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_health_refresh_feeds_summary() {
        let runner = ScriptedRunner::new()
            .respond("State.Status}} radarr", 0, "running")
            .respond("State.Status}} sonarr", 0, "running")
            .respond("State.Status}} bot", 0, "exited");
        let (coordinator, _) = coordinator(runner, StaticDigests::default()).await;
        coordinator.refresh_health().await;

        let summary = coordinator.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.online, 2);
        assert_eq!(summary.offline, 2);
        assert_eq!(summary.categories[0].online, 2);
        assert!(coordinator.overview().summary.last_health_check.is_some());
    }

    #[tokio::test]
    async fn test_trigger_rejections() {
        let (coordinator, _) = coordinator(ScriptedRunner::new(), StaticDigests::default()).await;
        assert!(matches!(coordinator.trigger("plex", "api"), Err(Error::NotFound(_))));
        assert!(matches!(coordinator.trigger("pihole", "api"), Err(Error::InvalidInput(_))));
        assert!(matches!(coordinator.trigger("bot", "api"), Err(Error::InvalidInput(_))));
        match coordinator.trigger("sonarr", "api") {
            Err(Error::Forbidden(msg)) => assert!(msg.contains("blacklisted")),
            other => panic!("expected Forbidden, got {:?}", other),
        }
        assert!(matches!(coordinator.status("not-a-uuid"), Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_is_single_flight_and_recorded() {
        let gate = Arc::new(Notify::new());
        let runner = ScriptedRunner::new()
            .hold("docker compose pull", gate.clone())
            .respond("docker compose pull radarr", 0, "Pulled")
            .respond("--force-recreate radarr", 0, "Recreated")
            .respond(RADARR_INSPECT, 0, "lscr.io/linuxserver/radarr:latest|sha256:new|5.3.0")
            .respond(RADARR_TAG, 0, "sha256:new|lscr.io/linuxserver/radarr@sha256:d2");
        let (coordinator, runner) = coordinator(runner, StaticDigests::default()).await;

        let job = coordinator.trigger("radarr", "cli").unwrap();
        assert_eq!(job.status, UpdateStatus::Running);
        assert!(matches!(coordinator.trigger("radarr", "cli"), Err(Error::Conflict(_))));

        gate.notify_one();
        let done = wait_for_finish(&coordinator, job.id).await;
        assert_eq!(done.status, UpdateStatus::Success);
        assert!(done.output.starts_with("Pulling radarr on 10.0.0.5...\n"));
        assert!(done.output.contains("Recreate output: Recreated"));
        assert!(runner
            .calls()
            .contains(&"10.0.0.5: cd /opt/radarr && docker compose pull radarr".to_string()));

        let entry = coordinator.versions.read().get("radarr").cloned().unwrap();
        assert_eq!(entry.current, "5.3.0");
        assert!(!entry.update_available);

        let mut history = Vec::new();
        for _ in 0..200 {
            history = coordinator.history(Some("radarr"), 10).await.unwrap();
            if !history.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, "success");
        assert_eq!(history[0].triggered_by, "cli");

        // The lock is released once the job task returns.
        gate.notify_one();
        let mut again = None;
        for _ in 0..200 {
            match coordinator.trigger("radarr", "cli") {
                Ok(job) => {
                    again = Some(job);
                    break;
                }
                Err(Error::Conflict(_)) => tokio::time::sleep(Duration::from_millis(5)).await,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        wait_for_finish(&coordinator, again.unwrap().id).await;
    }

    #[tokio::test]
    async fn test_pull_failure_skips_recreate() {
        let runner = ScriptedRunner::new().respond("docker compose pull", 1, "");
        let (coordinator, runner) = coordinator(runner, StaticDigests::default()).await;

        let job = coordinator.trigger("radarr", "api").unwrap();
        let done = wait_for_finish(&coordinator, job.id).await;
        assert_eq!(done.status, UpdateStatus::Failed);
        assert!(done.output.contains("Pull failed (rc=1)"));
        assert!(!runner.calls().iter().any(|c| c.contains("--force-recreate")));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_running_and_recent_jobs() {
        let (coordinator, _) = coordinator(ScriptedRunner::new(), StaticDigests::default()).await;

        let mut old = UpdateJob::start("radarr");
        old.finish(UpdateStatus::Success);
        old.completed = Some(Utc::now() - chrono::Duration::hours(2));
        let mut recent = UpdateJob::start("sonarr");
        recent.finish(UpdateStatus::Failed);
        let running = UpdateJob::start("bot");
        {
            let mut jobs = coordinator.jobs.write();
            for job in [&old, &recent, &running] {
                jobs.insert(job.id, job.clone());
            }
        }

        assert_eq!(coordinator.cleanup_jobs(), 1);
        assert!(coordinator.status(&old.id.to_string()).is_err());
        assert!(coordinator.status(&recent.id.to_string()).is_ok());
        assert!(coordinator.status(&running.id.to_string()).is_ok());
    }
}
