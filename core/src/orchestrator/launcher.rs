//! In-process worker launcher

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::InvocationEvent;
use crate::error::{BenchError, BenchResult};
use crate::traits::{LaunchHandle, ResultStore, StorageConnector, WorkerLauncher};
use crate::worker::WorkerBuilder;

/// Runs each worker as a tokio task in this process
///
/// The handle resolves with the worker's outcome once it sent `CLOSE` or
/// `ABORT:`.
pub struct LocalLauncher {
    storage: Arc<dyn StorageConnector>,
    results: Arc<dyn ResultStore>,
    output_dir: PathBuf,
}

impl LocalLauncher {
    /// Create a launcher sharing one storage connector and result store
    /// across all workers
    pub fn new(
        storage: Arc<dyn StorageConnector>,
        results: Arc<dyn ResultStore>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            storage,
            results,
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl WorkerLauncher for LocalLauncher {
    fn name(&self) -> &str {
        "local"
    }

    async fn launch(&self, event: InvocationEvent) -> BenchResult<LaunchHandle> {
        let id = event.worker_id;
        let worker = WorkerBuilder::new(event)
            .storage(Arc::clone(&self.storage))
            .results(Arc::clone(&self.results))
            .output_dir(self.output_dir.clone())
            .build()
            .map_err(|e| BenchError::invocation(id, e.to_string()))?;

        Ok(LaunchHandle::new(id, tokio::spawn(worker.run())))
    }
}

impl std::fmt::Debug for LocalLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalLauncher")
            .field("storage", &self.storage.name())
            .field("output_dir", &self.output_dir)
            .finish()
    }
}
