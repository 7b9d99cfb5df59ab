//! In-process job registry

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use pbench_core::traits::{JobId, JobRegistry, StorageError};

/// Hands out job ids of the form `<name>-<seq>` and tracks which are live
#[derive(Debug, Default)]
pub struct LocalJobRegistry {
    next: AtomicU64,
    live: Mutex<BTreeSet<JobId>>,
}

impl LocalJobRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs registered and not yet deregistered
    pub fn live_jobs(&self) -> Vec<JobId> {
        self.live
            .lock()
            .map(|live| live.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobRegistry for LocalJobRegistry {
    async fn register(
        &self,
        name: &str,
        capacity_gb: u64,
        peak_mbps: u64,
    ) -> Result<JobId, StorageError> {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        let job = JobId(format!("{name}-{seq}"));

        self.live
            .lock()
            .map_err(|_| StorageError::Registry("registry lock poisoned".into()))?
            .insert(job.clone());

        tracing::debug!(job_id = %job, capacity_gb, peak_mbps, "Job registered");
        Ok(job)
    }

    async fn deregister(&self, job: &JobId) -> Result<(), StorageError> {
        let removed = self
            .live
            .lock()
            .map_err(|_| StorageError::Registry("registry lock poisoned".into()))?
            .remove(job);

        if !removed {
            return Err(StorageError::Registry(format!("unknown job {job}")));
        }
        tracing::debug!(job_id = %job, "Job deregistered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_deregister() {
        let registry = LocalJobRegistry::new();
        let a = registry.register("job-0", 10, 8000).await.unwrap();
        let b = registry.register("job-1", 10, 8000).await.unwrap();

        assert_eq!(a, JobId::from("job-0-0"));
        assert_eq!(b, JobId::from("job-1-1"));
        assert_eq!(registry.live_jobs(), vec![a.clone(), b.clone()]);

        registry.deregister(&a).await.unwrap();
        assert_eq!(registry.live_jobs(), vec![b]);
    }

    #[tokio::test]
    async fn test_deregister_unknown_job() {
        let registry = LocalJobRegistry::new();
        let err = registry
            .deregister(&JobId::from("job-9"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Registry(_)));
    }
}
