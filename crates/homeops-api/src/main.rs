//! homeops API server

use clap::Parser;
use homeops_api::{AppState, routes};
use homeops_config::{ServerConfig, SshConfig, load_registry};
use homeops_core::service::ServiceRegistry;
use homeops_db::{
    SqliteInstanceRepo, SqliteTaskRepo, SqliteUpdateHistoryRepo, create_pool, run_migrations,
};
use homeops_executor::SshRunner;
use homeops_scheduler::{
    LogNotifier, Notifier, StaleSweeper, TaskQueue, WebhookNotifier, dispatch, event_channel,
};
use homeops_updater::{RegistryClient, UpdateCoordinator, spawn_background};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "homeops-server")]
#[command(about = "Task queue and service update server", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "HOMEOPS_BIND", default_value = "0.0.0.0:5051")]
    bind: String,

    /// SQLite database URL
    #[arg(long, env = "HOMEOPS_DATABASE_URL", default_value = "sqlite://data/tasks.db")]
    database_url: String,

    /// Key required by the task endpoints
    #[arg(long, env = "HOMEOPS_API_KEY")]
    api_key: Option<String>,

    /// Key required to trigger container updates
    #[arg(long, env = "HOMEOPS_UPDATE_API_KEY")]
    update_api_key: Option<String>,

    /// Service registry (KDL)
    #[arg(long, env = "HOMEOPS_SERVICES")]
    services: Option<PathBuf>,

    /// Chat webhook for task notifications
    #[arg(long, env = "HOMEOPS_WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// SSH user on container hosts
    #[arg(long, env = "HOMEOPS_SSH_USER", default_value = "root")]
    ssh_user: String,

    /// SSH private key for container hosts
    #[arg(long, env = "HOMEOPS_SSH_KEY")]
    ssh_key: Option<PathBuf>,

    /// Seconds before an in-progress task is considered abandoned
    #[arg(long, env = "HOMEOPS_STALE_TIMEOUT", default_value_t = 7200)]
    stale_timeout: u64,

    /// Seconds between stale task sweeps
    #[arg(long, env = "HOMEOPS_SWEEP_INTERVAL", default_value_t = 1800)]
    sweep_interval: u64,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let mut config = ServerConfig {
            bind: self.bind,
            database_url: self.database_url,
            api_key: self.api_key.filter(|k| !k.is_empty()),
            update_api_key: self.update_api_key.filter(|k| !k.is_empty()),
            services_path: self.services,
            webhook_url: self.webhook_url.filter(|u| !u.is_empty()),
            ssh: SshConfig {
                user: self.ssh_user,
                key_path: self.ssh_key,
                ..SshConfig::default()
            },
            ..ServerConfig::default()
        };
        config.queue.stale_timeout = Duration::from_secs(self.stale_timeout);
        config.queue.sweep_interval = Duration::from_secs(self.sweep_interval.max(1));
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config();

    if config.api_key.is_none() {
        warn!("HOMEOPS_API_KEY is not set; task endpoints will refuse every request");
    }
    if config.update_api_key.is_none() {
        warn!("HOMEOPS_UPDATE_API_KEY is not set; one-click updates are disabled");
    }

    let registry = match &config.services_path {
        Some(path) => {
            let registry = load_registry(path)?;
            info!(path = %path.display(), services = registry.len(), "Loaded service registry");
            registry
        }
        None => {
            warn!("No service registry configured; the dashboard will be empty");
            ServiceRegistry::default()
        }
    };

    // Create database pool
    if let Some(dir) = sqlite_parent_dir(&config.database_url) {
        std::fs::create_dir_all(dir)?;
    }
    info!("Opening database...");
    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    info!("Database ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Notifications
    let (events, event_rx) = event_channel(config.queue.event_buffer);
    let notifier: Arc<dyn Notifier> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
        None => Arc::new(LogNotifier),
    };
    let dispatcher = tokio::spawn(dispatch(event_rx, notifier));

    // Task queue and stale sweeper
    let queue = Arc::new(TaskQueue::new(
        Arc::new(SqliteTaskRepo::new(pool.clone())),
        Arc::new(SqliteInstanceRepo::new(pool.clone())),
        events,
        config.queue.clone(),
    ));
    let sweeper = StaleSweeper::new(queue.clone());
    let sweeper_shutdown = shutdown_rx.clone();
    let sweeper_handle = tokio::spawn(async move { sweeper.run(sweeper_shutdown).await });

    // Update coordinator and its refresh loops
    let digests = RegistryClient::new(config.updater.registry_timeout, config.updater.registry_ttl)?;
    let updater = Arc::new(UpdateCoordinator::new(
        Arc::new(registry),
        Arc::new(SshRunner::new(config.ssh.clone())),
        Arc::new(digests),
        Arc::new(SqliteUpdateHistoryRepo::new(pool.clone())),
        config.updater.clone(),
    )?);
    let mut background = spawn_background(updater.clone(), shutdown_rx);
    background.push(sweeper_handle);

    // Create app state
    let state = AppState::new(
        pool,
        queue,
        updater,
        config.api_key.clone(),
        config.update_api_key.clone(),
    );

    // Build router
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server
    info!("Starting server on {}", config.bind);
    let listener = TcpListener::bind(&config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    for handle in background {
        let _ = handle.await;
    }
    // Deliver notifications still queued.
    let _ = tokio::time::timeout(Duration::from_secs(5), dispatcher).await;

    info!("Server stopped");
    Ok(())
}

/// Directory holding a file-backed SQLite database, if any.
fn sqlite_parent_dir(database_url: &str) -> Option<&Path> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.contains(":memory:") {
        return None;
    }
    Path::new(path)
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
}
