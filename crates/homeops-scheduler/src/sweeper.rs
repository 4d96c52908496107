//! Periodic reclamation of abandoned tasks.

use crate::queue::TaskQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

/// Runs `TaskQueue::reset_stale` on a fixed interval.
pub struct StaleSweeper {
    queue: Arc<TaskQueue>,
    interval: Duration,
}

impl StaleSweeper {
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        let interval = queue.config().sweep_interval;
        Self { queue, interval }
    }

    pub fn with_interval(queue: Arc<TaskQueue>, interval: Duration) -> Self {
        Self { queue, interval }
    }

    /// Sweep until `shutdown` flips to true. The first sweep runs immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Starting stale task sweeper");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Stale task sweeper stopped");
    }

    /// One sweep. Errors are logged, never returned.
    pub async fn sweep_once(&self) -> usize {
        match self.queue.reset_stale().await {
            Ok(reset) => reset.len(),
            Err(e) => {
                warn!(error = %e, "Stale task sweep failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::EventSender;
    use homeops_config::QueueConfig;
    use homeops_core::task::{InstanceRef, NewTask, Priority, TaskStatus};
    use homeops_db::{SqliteInstanceRepo, SqliteTaskRepo, create_pool, run_migrations};

    async fn queue(stale_timeout: Duration) -> Arc<TaskQueue> {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        Arc::new(TaskQueue::new(
            Arc::new(SqliteTaskRepo::new(pool.clone())),
            Arc::new(SqliteInstanceRepo::new(pool)),
            EventSender::disabled(),
            QueueConfig {
                stale_timeout,
                ..QueueConfig::default()
            },
        ))
    }

    #[tokio::test]
    async fn test_sweep_once_resets_expired_claims() {
        let queue = queue(Duration::ZERO).await;
        let task = queue
            .submit(NewTask {
                description: "stuck".to_string(),
                priority: Priority::Medium,
                submitted_by: None,
            })
            .await
            .unwrap();
        queue
            .claim(task.id, &InstanceRef::new(Some("w1".to_string()), None))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let sweeper = StaleSweeper::new(queue.clone());
        assert_eq!(sweeper.sweep_once().await, 1);
        assert_eq!(queue.get(task.id).await.unwrap().status, TaskStatus::Pending);
        assert_eq!(sweeper.sweep_once().await, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let queue = queue(Duration::from_secs(7200)).await;
        let sweeper = StaleSweeper::with_interval(queue, Duration::from_millis(10));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { sweeper.run(rx).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
