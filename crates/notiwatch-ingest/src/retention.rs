//! Periodic retention purge while ingesting.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use notiwatch_core::clock::Clock;
use notiwatch_storage::{NotificationRepository, RetentionPolicy};

/// Background task that purges expired notifications on start and then at a
/// fixed interval until stopped.
#[derive(Debug)]
pub struct RetentionTask {
    shutdown: Arc<Notify>,
    task: JoinHandle<u64>,
}

impl RetentionTask {
    pub fn spawn(
        repo: Arc<dyn NotificationRepository>,
        clock: Arc<dyn Clock>,
        policy: RetentionPolicy,
        every: Duration,
    ) -> Self {
        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);

        let task = tokio::spawn(async move {
            info!(
                retention_days = policy.retention_days,
                interval_secs = every.as_secs(),
                "Retention task started"
            );
            let mut runs = 0u64;
            loop {
                match policy.purge(repo.as_ref(), clock.as_ref()) {
                    Ok(_) => runs += 1,
                    Err(e) => error!(error = %e, "Retention purge failed"),
                }

                tokio::select! {
                    _ = tokio::time::sleep(every) => {}
                    _ = signal.notified() => break,
                }
            }
            runs
        });

        Self { shutdown, task }
    }

    /// Stop the task and return how many purges succeeded.
    pub async fn stop(self) -> u64 {
        self.shutdown.notify_one();
        match self.task.await {
            Ok(runs) => runs,
            Err(e) => {
                error!(error = %e, "Retention task failed");
                0
            }
        }
    }
}
