use crate::services::temp_storage::TempStorage;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Periodic sweep of expired jobs, owned by the process
pub struct BackgroundWorker {
    storage: Arc<TempStorage>,
    interval: Duration,
    max_age_hours: u64,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        storage: Arc<TempStorage>,
        interval: Duration,
        max_age_hours: u64,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            storage,
            interval,
            max_age_hours,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            "🚀 Background worker started (interval {:?}, max age {}h)",
            self.interval,
            self.max_age_hours
        );

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.perform_cleanup().await;
                }
            }
        }
    }

    pub async fn perform_cleanup(&self) -> usize {
        tracing::info!("🧹 Running temp storage sweep...");

        let removed = self.storage.cleanup_old_jobs(self.max_age_hours).await;

        tracing::info!(
            removed,
            active = self.storage.job_count(),
            "✅ Temp storage sweep completed"
        );
        removed
    }
}
