use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async lock per job id.
///
/// Work on one job is serialized while different jobs proceed in parallel.
/// Entries outlive their guards: [`TempStorage`] relies on
/// `cleanup_jobs_older_than` calling [`JobLocks::prune`] after every sweep,
/// which is what keeps the map bounded by the number of live jobs.
///
/// [`TempStorage`]: crate::services::temp_storage::TempStorage
#[derive(Debug, Default)]
pub struct JobLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `job_id`; released when the guard drops
    pub async fn lock(&self, job_id: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(job_id.to_string())
            .or_default()
            .value()
            .clone();

        // Shard guard is gone before the await
        mutex.lock_owned().await
    }

    /// Drops locks no task holds or waits on. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before.saturating_sub(self.locks.len())
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
