//! Builder pattern for Worker construction

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::InvocationEvent;
use crate::error::{BenchError, BenchResult};
use crate::traits::{ResultStore, StorageConnector};

use super::executor::Worker;

/// Builder for creating Worker instances
///
/// # Example
/// ```ignore
/// let worker = WorkerBuilder::new(event)
///     .storage(Arc::new(MemoryStore::new()))
///     .results(Arc::new(DirResultStore::new("results")))
///     .output_dir("/tmp")
///     .build()?;
/// let outcome = worker.run().await?;
/// ```
pub struct WorkerBuilder {
    event: InvocationEvent,
    storage: Option<Arc<dyn StorageConnector>>,
    results: Option<Arc<dyn ResultStore>>,
    output_dir: Option<PathBuf>,
}

impl WorkerBuilder {
    /// Create a new builder for the given invocation
    pub fn new(event: InvocationEvent) -> Self {
        Self {
            event,
            storage: None,
            results: None,
            output_dir: None,
        }
    }

    /// Set the storage connector
    pub fn storage(mut self, storage: Arc<dyn StorageConnector>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the result store
    pub fn results(mut self, results: Arc<dyn ResultStore>) -> Self {
        self.results = Some(results);
        self
    }

    /// Set the directory result files are written to
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Build the Worker
    ///
    /// # Errors
    /// Returns an error if a collaborator is missing or the event asks for
    /// an empty workload.
    pub fn build(self) -> BenchResult<Worker> {
        let storage = self.storage.ok_or(BenchError::missing_config("storage"))?;
        let results = self.results.ok_or(BenchError::missing_config("results"))?;
        let output_dir = self
            .output_dir
            .ok_or(BenchError::missing_config("output_dir"))?;

        if self.event.object_size == 0 {
            return Err(BenchError::config("object size must be at least 1 byte"));
        }

        Ok(Worker::new(self.event, storage, results, output_dir))
    }
}
