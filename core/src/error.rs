//! Error types for pbench-core
//!
//! Errors are split along the lines of what they affect: setup failures
//! (bind, configuration) end the whole run, everything else is contained to
//! one connection or one worker.

use std::io;

use thiserror::Error;

use crate::protocol::WorkerId;
use crate::traits::StorageError;

/// Core error type
#[derive(Error, Debug)]
pub enum BenchError {
    /// Invalid run configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// A builder was missing a required collaborator or setting
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    /// A server socket could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Connect, read or write failure on one connection
    #[error("connection to {endpoint} failed: {source}")]
    Connection {
        /// Remote endpoint
        endpoint: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Malformed message on the control or log channel
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A benchmark operation failed and aborted the worker's workload
    #[error("workload error in worker {worker}: {reason}")]
    Workload {
        /// Worker that issued the operation
        worker: WorkerId,
        /// What went wrong
        reason: String,
    },

    /// Storage collaborator error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A worker could not be launched
    #[error("failed to launch worker {worker}: {reason}")]
    Invocation {
        /// Worker that was being launched
        worker: WorkerId,
        /// Launcher-specific reason
        reason: String,
    },

    /// Job registry collaborator error
    #[error("job registry error: {0}")]
    Registry(String),

    /// Task or lifecycle failure in the orchestrator
    #[error("orchestration error: {0}")]
    Orchestration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BenchError {
    /// Configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        BenchError::Config(msg.into())
    }

    /// Missing builder field
    pub fn missing_config(field: &'static str) -> Self {
        BenchError::MissingConfig(field)
    }

    /// Connection failure on `endpoint`
    pub fn connection(endpoint: impl ToString, source: io::Error) -> Self {
        BenchError::Connection {
            endpoint: endpoint.to_string(),
            source,
        }
    }

    /// Protocol violation
    pub fn protocol(msg: impl Into<String>) -> Self {
        BenchError::Protocol(msg.into())
    }

    /// Workload failure for `worker`
    pub fn workload(worker: WorkerId, reason: impl Into<String>) -> Self {
        BenchError::Workload {
            worker,
            reason: reason.into(),
        }
    }

    /// Launch failure for `worker`
    pub fn invocation(worker: WorkerId, reason: impl Into<String>) -> Self {
        BenchError::Invocation {
            worker,
            reason: reason.into(),
        }
    }

    /// Orchestration failure
    pub fn orchestration(msg: impl Into<String>) -> Self {
        BenchError::Orchestration(msg.into())
    }

    /// Returns true if this error must abort the entire run.
    ///
    /// Only setup failures qualify. Connection, protocol and workload errors
    /// stay with the worker or connection that raised them.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            BenchError::Bind { .. } | BenchError::Config(_) | BenchError::MissingConfig(_)
        )
    }
}

/// Result type alias
pub type BenchResult<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_is_fatal() {
        let err = BenchError::Bind {
            addr: "127.0.0.1:8888".into(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.is_fatal_to_run());
        assert!(err.to_string().contains("127.0.0.1:8888"));
    }

    #[test]
    fn test_worker_errors_are_isolated() {
        let err = BenchError::workload(WorkerId(3), "put buffer failed: tmp-3-0");
        assert!(!err.is_fatal_to_run());
        assert!(err.to_string().contains("worker 3"));

        let err = BenchError::connection(
            "10.0.0.1:8889",
            io::Error::new(io::ErrorKind::ConnectionReset, "reset"),
        );
        assert!(!err.is_fatal_to_run());
    }

    #[test]
    fn test_missing_config_message() {
        let err = BenchError::missing_config("launcher");
        assert!(err.to_string().contains("launcher"));
    }
}
