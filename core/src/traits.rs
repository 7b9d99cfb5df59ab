//! Collaborator traits
//!
//! These traits are defined in core to avoid circular dependencies.
//! Implementations live in their respective crates (storage/, invokers/)
//! or, for the in-process launcher, in the orchestrator module.

use std::path::Path;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::config::InvocationEvent;
use crate::error::{BenchError, BenchResult};
use crate::protocol::WorkerId;
use crate::worker::WorkerOutcome;

// ============================================================================
// Storage service
// ============================================================================

/// Errors raised by the storage service and its companions
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Could not reach the storage service
    #[error("cannot connect to storage at {endpoint}: {reason}")]
    Connect {
        /// Endpoint that was dialed
        endpoint: String,
        /// Failure detail
        reason: String,
    },

    /// A put or get returned a non-zero status
    #[error("{op} failed for {name} (status {status})")]
    OperationFailed {
        /// `put` or `get`
        op: &'static str,
        /// Object name
        name: String,
        /// Status code reported by the service
        status: i32,
    },

    /// Object does not exist
    #[error("object not found: {0}")]
    NotFound(String),

    /// Result upload failed
    #[error("upload of {path} to {key} failed: {reason}")]
    Upload {
        /// Local file
        path: String,
        /// Destination key
        key: String,
        /// Failure detail
        reason: String,
    },

    /// Job registration or deregistration failed
    #[error("job registry: {0}")]
    Registry(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opens sessions against the storage service
#[async_trait]
pub trait StorageConnector: Send + Sync {
    /// Connector name for logs (e.g. "memory", "fs")
    fn name(&self) -> &str;

    /// Open a session to the service at `endpoint` (`host:port`)
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn StorageSession>, StorageError>;
}

/// An open connection to the storage service
#[async_trait]
pub trait StorageSession: Send {
    /// Store `data` under `name` within `job`
    async fn put(&mut self, name: &str, data: &[u8], job: &JobId) -> Result<(), StorageError>;

    /// Read `name` within `job` into `buf`
    async fn get(&mut self, name: &str, buf: &mut [u8], job: &JobId) -> Result<(), StorageError>;
}

// ============================================================================
// Result store
// ============================================================================

/// Destination for per-worker result artifacts
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Upload the file at `local_path` under `remote_key`
    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<(), StorageError>;
}

// ============================================================================
// Job registry
// ============================================================================

/// Identifier handed out by the job registry
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct JobId(pub String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

/// Storage-side job lifecycle
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Register a job and reserve capacity for it
    async fn register(
        &self,
        name: &str,
        capacity_gb: u64,
        peak_mbps: u64,
    ) -> Result<JobId, StorageError>;

    /// Release a previously registered job
    async fn deregister(&self, job: &JobId) -> Result<(), StorageError>;
}

// ============================================================================
// Worker launcher
// ============================================================================

/// Handle to one launched worker
///
/// For in-process launches the handle resolves with the worker's outcome;
/// for remote invocations it resolves once the invocation was accepted.
#[derive(Debug)]
pub struct LaunchHandle {
    worker: WorkerId,
    task: JoinHandle<BenchResult<WorkerOutcome>>,
}

impl LaunchHandle {
    /// Wrap a spawned task
    pub fn new(worker: WorkerId, task: JoinHandle<BenchResult<WorkerOutcome>>) -> Self {
        Self { worker, task }
    }

    /// Worker this handle belongs to
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Wait for the launch to finish
    pub async fn join(self) -> BenchResult<WorkerOutcome> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(BenchError::orchestration(format!(
                "worker {} task failed: {e}",
                self.worker
            ))),
        }
    }
}

/// Starts worker instances
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Launcher name for logs (e.g. "local", "http")
    fn name(&self) -> &str;

    /// Launch one worker with the given parameters
    async fn launch(&self, event: InvocationEvent) -> BenchResult<LaunchHandle>;
}
