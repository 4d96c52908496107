//! Application state.

use homeops_scheduler::TaskQueue;
use homeops_updater::UpdateCoordinator;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub queue: Arc<TaskQueue>,
    pub updater: Arc<UpdateCoordinator>,
    pub api_key: Option<Arc<str>>,
    pub update_api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        queue: Arc<TaskQueue>,
        updater: Arc<UpdateCoordinator>,
        api_key: Option<String>,
        update_api_key: Option<String>,
    ) -> Self {
        Self {
            pool,
            queue,
            updater,
            api_key: api_key.map(Arc::from),
            update_api_key: update_api_key.map(Arc::from),
        }
    }
}
