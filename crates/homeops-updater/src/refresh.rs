//! Background loops for the update coordinator.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, info};

use crate::coordinator::UpdateCoordinator;

/// Spawn the health, version and cleanup loops. Each stops when
/// `shutdown` flips to true.
pub fn spawn_background(
    coordinator: Arc<UpdateCoordinator>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let config = coordinator.config().clone();

    let health = {
        let c = coordinator.clone();
        run_every(
            "health",
            Duration::ZERO,
            config.health_interval,
            shutdown.clone(),
            move || {
                let c = c.clone();
                async move { c.refresh_health().await }
            },
        )
    };

    let versions = {
        let c = coordinator.clone();
        run_every(
            "versions",
            config.version_initial_delay,
            config.version_interval,
            shutdown.clone(),
            move || {
                let c = c.clone();
                async move { c.refresh_versions().await }
            },
        )
    };

    let cleanup = {
        let c = coordinator;
        run_every(
            "cleanup",
            config.cleanup_interval,
            config.cleanup_interval,
            shutdown,
            move || {
                let c = c.clone();
                async move {
                    let jobs = c.cleanup_jobs();
                    let digests = c.purge_digests();
                    debug!(jobs, digests, "Cleaned up finished jobs and expired digests");
                }
            },
        )
    };

    vec![
        tokio::spawn(health),
        tokio::spawn(versions),
        tokio::spawn(cleanup),
    ]
}

async fn run_every<F, Fut>(
    name: &'static str,
    initial_delay: Duration,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    info!(task = name, period_secs = period.as_secs(), "Starting background loop");

    tokio::select! {
        _ = sleep(initial_delay) => {}
        _ = stopped(&mut shutdown) => {
            info!(task = name, "Background loop stopped");
            return;
        }
    }

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => tick().await,
            _ = stopped(&mut shutdown) => break,
        }
    }

    info!(task = name, "Background loop stopped");
}

/// Resolves once shutdown is requested or the sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_run_every_ticks_until_shutdown() {
        let count = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(false);

        let counter = count.clone();
        let handle = tokio::spawn(run_every(
            "test",
            Duration::ZERO,
            Duration::from_millis(10),
            rx,
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        ));

        tokio::time::sleep(Duration::from_millis(45)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_shutdown_during_initial_delay() {
        let count = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(false);

        let counter = count.clone();
        let handle = tokio::spawn(run_every(
            "test",
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            rx,
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        ));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
