//! Integration tests for the Worker module

use super::*;
use crate::config::{InvocationEvent, RunConfig, WorkloadMode};
use crate::error::BenchError;
use crate::protocol::WorkerId;
use crate::traits::{JobId, ResultStore, StorageConnector, StorageError, StorageSession};

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

// ============================================================================
// Mock storage
// ============================================================================

#[derive(Default)]
struct MockStorage {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    connects: AtomicUsize,
    fail_put_at: Option<usize>,
}

impl MockStorage {
    fn failing_put_at(index: usize) -> Self {
        Self {
            fail_put_at: Some(index),
            ..Default::default()
        }
    }
}

struct MockSession {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    puts: usize,
    fail_put_at: Option<usize>,
}

#[async_trait]
impl StorageConnector for MockStorage {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self, _endpoint: &str) -> Result<Box<dyn StorageSession>, StorageError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            objects: self.objects.clone(),
            puts: 0,
            fail_put_at: self.fail_put_at,
        }))
    }
}

#[async_trait]
impl StorageSession for MockSession {
    async fn put(&mut self, name: &str, data: &[u8], _job: &JobId) -> Result<(), StorageError> {
        let index = self.puts;
        self.puts += 1;
        if self.fail_put_at == Some(index) {
            return Err(StorageError::OperationFailed {
                op: "put",
                name: name.to_string(),
                status: -1,
            });
        }
        self.objects
            .lock()
            .unwrap()
            .insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&mut self, name: &str, buf: &mut [u8], _job: &JobId) -> Result<(), StorageError> {
        let objects = self.objects.lock().unwrap();
        let data = objects
            .get(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(())
    }
}

#[derive(Default)]
struct MockResults {
    uploaded: Mutex<Vec<String>>,
    fail: bool,
}

#[async_trait]
impl ResultStore for MockResults {
    async fn upload(&self, local_path: &Path, remote_key: &str) -> Result<(), StorageError> {
        if self.fail {
            return Err(StorageError::Upload {
                path: local_path.display().to_string(),
                key: remote_key.to_string(),
                reason: "bucket unavailable".into(),
            });
        }
        self.uploaded.lock().unwrap().push(remote_key.to_string());
        Ok(())
    }
}

// ============================================================================
// Fake control process
// ============================================================================

/// Accepts one log connection and collects everything written to it
async fn log_server() -> (SocketAddr, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).await.unwrap();
        out.lines().map(str::to_string).collect()
    });
    (addr, handle)
}

/// Accepts one control connection, records the readiness message and
/// answers with `reply`
async fn control_server(reply: &'static str) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 64];
        let n = stream.read(&mut buf).await.unwrap();
        stream.write_all(reply.as_bytes()).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).trim().to_string()
    });
    (addr, handle)
}

fn event(id: u64, log: SocketAddr, control: SocketAddr, mode: &str) -> InvocationEvent {
    RunConfig::new("127.0.0.1", log.port())
        .with_mode(WorkloadMode::parse(mode).unwrap())
        .with_object_size(16)
        .with_num_ops(5)
        .invocation_event(WorkerId(id), "job-0", log.port(), control.port())
}

fn build(
    event: InvocationEvent,
    storage: Arc<MockStorage>,
    results: Arc<MockResults>,
    dir: &Path,
) -> Worker {
    WorkerBuilder::new(event)
        .storage(storage)
        .results(results)
        .output_dir(dir)
        .build()
        .expect("Failed to build worker")
}

async fn lines(handle: JoinHandle<Vec<String>>) -> Vec<String> {
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("Log stream never closed")
        .expect("Log server panicked")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_worker_run_completes() {
    let dir = tempfile::tempdir().unwrap();
    let (log_addr, log_lines) = log_server().await;
    let (control_addr, ready) = control_server("RUN").await;
    let storage = Arc::new(MockStorage::default());
    let results = Arc::new(MockResults::default());

    let worker = build(
        event(3, log_addr, control_addr, "write_read"),
        storage.clone(),
        results.clone(),
        dir.path(),
    );
    let outcome = worker.run().await.expect("Worker failed");

    assert_eq!(ready.await.unwrap(), "READY:3");

    let stats = outcome.stats().expect("Expected completed run").clone();
    assert_eq!(stats.total_operations(), 10);
    assert_eq!(
        stats.phases.iter().map(|p| p.op).collect::<Vec<_>>(),
        WorkloadMode::parse("write_read").unwrap().operations()
    );
    assert_eq!(storage.objects.lock().unwrap().len(), 5);
    assert!(storage.objects.lock().unwrap().contains_key("tmp-3-4"));

    let samples = std::fs::read_to_string(dir.path().join("pocket_write_3.txt")).unwrap();
    assert_eq!(samples.lines().count(), 5);
    assert!(samples.lines().all(|l| l.parse::<u64>().is_ok()));

    assert_eq!(
        *results.uploaded.lock().unwrap(),
        vec!["pocket/pocket_write_3.txt", "pocket/pocket_read_3.txt"]
    );

    let lines = lines(log_lines).await;
    assert!(lines[0].starts_with("INFO Event:"));
    assert_eq!(lines.last().map(String::as_str), Some("CLOSE"));
    assert!(lines.iter().all(|l| !l.starts_with("ERROR")));
}

#[tokio::test]
async fn test_worker_aborted_does_not_run() {
    let dir = tempfile::tempdir().unwrap();
    let (log_addr, log_lines) = log_server().await;
    let (control_addr, _ready) = control_server("ABORT").await;
    let storage = Arc::new(MockStorage::default());

    let worker = build(
        event(1, log_addr, control_addr, "write_read"),
        storage.clone(),
        Arc::new(MockResults::default()),
        dir.path(),
    );
    let outcome = worker.run().await.expect("Abort is not an error");

    assert!(matches!(outcome, WorkerOutcome::Aborted { ref reply } if reply == "ABORT"));
    assert_eq!(storage.connects.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("pocket_write_1.txt").exists());

    let lines = lines(log_lines).await;
    assert_eq!(
        lines.last().map(String::as_str),
        Some("ABORT:Control returned ABORT")
    );
    assert!(!lines.iter().any(|l| l == "CLOSE"));
}

#[tokio::test]
async fn test_workload_failure_reports_and_closes() {
    let dir = tempfile::tempdir().unwrap();
    let (log_addr, log_lines) = log_server().await;
    let (control_addr, _ready) = control_server("RUN").await;
    let results = Arc::new(MockResults::default());

    let worker = build(
        event(2, log_addr, control_addr, "write_read"),
        Arc::new(MockStorage::failing_put_at(2)),
        results.clone(),
        dir.path(),
    );
    let err = worker.run().await.expect_err("Workload should fail");

    assert!(matches!(err, BenchError::Workload { worker: WorkerId(2), .. }));
    assert!(err.to_string().contains("tmp-2-2"));

    // The failing operation's sample is still written; no read phase ran.
    let samples = std::fs::read_to_string(dir.path().join("pocket_write_2.txt")).unwrap();
    assert_eq!(samples.lines().count(), 3);
    assert!(!dir.path().join("pocket_read_2.txt").exists());
    assert!(results.uploaded.lock().unwrap().is_empty());

    let lines = lines(log_lines).await;
    assert!(lines.iter().any(|l| l.starts_with("ERROR") && l.contains("put buffer failed")));
    assert_eq!(lines.last().map(String::as_str), Some("CLOSE"));
}

#[tokio::test]
async fn test_log_connect_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let (control_addr, ready) = control_server("RUN").await;

    let worker = build(
        event(0, closed, control_addr, "write"),
        Arc::new(MockStorage::default()),
        Arc::new(MockResults::default()),
        dir.path(),
    );
    let err = worker.run().await.expect_err("Log connect should fail");

    assert!(matches!(err, BenchError::Connection { .. }));
    assert!(!ready.is_finished());
    ready.abort();
}

#[tokio::test]
async fn test_missing_result_file_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let (log_addr, log_lines) = log_server().await;
    let (control_addr, _ready) = control_server("RUN").await;
    let results = Arc::new(MockResults::default());

    let worker = build(
        event(5, log_addr, control_addr, "write"),
        Arc::new(MockStorage::default()),
        results.clone(),
        dir.path(),
    );
    let outcome = worker.run().await.expect("Worker failed");

    let stats = outcome.stats().expect("Expected completed run");
    assert_eq!(stats.missing, vec![dir.path().join("pocket_read_5.txt")]);
    assert_eq!(
        *results.uploaded.lock().unwrap(),
        vec!["pocket/pocket_write_5.txt"]
    );

    let lines = lines(log_lines).await;
    assert!(lines
        .iter()
        .any(|l| l.starts_with("WARN Result file") && l.contains("pocket_read_5.txt")));
    assert_eq!(lines.last().map(String::as_str), Some("CLOSE"));
}

#[tokio::test]
async fn test_upload_failure_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let (log_addr, log_lines) = log_server().await;
    let (control_addr, _ready) = control_server("RUN").await;
    let results = Arc::new(MockResults {
        fail: true,
        ..Default::default()
    });

    let worker = build(
        event(6, log_addr, control_addr, "write_read"),
        Arc::new(MockStorage::default()),
        results,
        dir.path(),
    );
    let outcome = worker.run().await.expect("Upload failures do not fail the worker");

    let stats = outcome.stats().expect("Expected completed run");
    assert_eq!(stats.upload_failures, 2);
    assert!(stats.uploaded.is_empty());

    let lines = lines(log_lines).await;
    assert_eq!(lines.iter().filter(|l| l.starts_with("ERROR")).count(), 2);
    assert_eq!(lines.last().map(String::as_str), Some("CLOSE"));
}

#[tokio::test]
async fn test_read_only_mode_reads_missing_objects() {
    let dir = tempfile::tempdir().unwrap();
    let (log_addr, log_lines) = log_server().await;
    let (control_addr, _ready) = control_server("RUN").await;

    let worker = build(
        event(8, log_addr, control_addr, "read"),
        Arc::new(MockStorage::default()),
        Arc::new(MockResults::default()),
        dir.path(),
    );
    let err = worker.run().await.expect_err("Nothing was written");

    assert!(err.to_string().contains("get buffer failed: tmp-8-0"));
    let lines = lines(log_lines).await;
    assert_eq!(lines.last().map(String::as_str), Some("CLOSE"));
}
