//! Worker lifecycle: handshake, workload, upload

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{InvocationEvent, Operation};
use crate::error::BenchResult;
use crate::protocol::{WorkerId, RUN};
use crate::traits::{JobId, ResultStore, StorageConnector, StorageSession};

use super::logger::{signal_ready, LogClient};
use super::stats::WorkerStats;
use super::workload::{result_file_name, Workload};

/// How a worker run ended
#[derive(Debug, Clone)]
pub enum WorkerOutcome {
    /// Workload ran to completion
    Completed(WorkerStats),

    /// Coordinator answered something other than `RUN`; nothing was run
    Aborted {
        /// Reply as received
        reply: String,
    },

    /// Handed off to a remote function; the outcome is only visible
    /// through the log channel
    Dispatched,
}

impl WorkerOutcome {
    /// Whether the workload ran to completion
    pub fn is_completed(&self) -> bool {
        matches!(self, WorkerOutcome::Completed(_))
    }

    /// Stats, if the workload ran here
    pub fn stats(&self) -> Option<&WorkerStats> {
        match self {
            WorkerOutcome::Completed(stats) => Some(stats),
            _ => None,
        }
    }
}

/// One benchmark function instance
///
/// Built from an [`InvocationEvent`]; everything it needs to find the control
/// process and the storage service is in there.
pub struct Worker {
    event: InvocationEvent,
    storage: Arc<dyn StorageConnector>,
    results: Arc<dyn ResultStore>,
    output_dir: PathBuf,
}

impl Worker {
    /// Create a new worker
    pub fn new(
        event: InvocationEvent,
        storage: Arc<dyn StorageConnector>,
        results: Arc<dyn ResultStore>,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            event,
            storage,
            results,
            output_dir,
        }
    }

    /// Identity announced on the control channel
    pub fn id(&self) -> WorkerId {
        self.event.worker_id
    }

    /// Parameters this worker runs with
    pub fn event(&self) -> &InvocationEvent {
        &self.event
    }

    /// Run the full sequence
    ///
    /// The log connection is opened first and a failure there is returned
    /// as is. From then on every path ends with either `ABORT:<reason>` or
    /// `CLOSE` on the log channel.
    pub async fn run(self) -> BenchResult<WorkerOutcome> {
        let id = self.id();
        let mut log = LogClient::connect(&self.event.log_addr()).await?;
        tracing::debug!(worker_id = %id, "Worker started");

        log.info(format!("Event: {:?}", self.event)).await;

        let reply = match signal_ready(&self.event.control_addr(), id).await {
            Ok(reply) => reply,
            Err(e) => {
                log.error(format!("Control handshake failed: {e}")).await;
                log.close().await;
                return Err(e);
            }
        };

        if reply != RUN {
            tracing::debug!(worker_id = %id, %reply, "Worker refused by coordinator");
            log.abort(format!("Control returned {reply}")).await;
            return Ok(WorkerOutcome::Aborted { reply });
        }

        let mut stats = WorkerStats::new(id);
        stats.start();

        if let Err(e) = self.execute(&mut log, &mut stats).await {
            tracing::debug!(worker_id = %id, error = %e, "Workload failed");
            log.error(e.to_string()).await;
            log.close().await;
            return Err(e);
        }

        self.upload_results(&mut log, &mut stats).await;
        stats.stop();

        tracing::debug!(
            worker_id = %id,
            operations = stats.total_operations(),
            elapsed_ms = ?stats.elapsed().map(|d| d.as_millis()),
            "Worker finished"
        );

        log.close().await;
        Ok(WorkerOutcome::Completed(stats))
    }

    async fn execute(&self, log: &mut LogClient, stats: &mut WorkerStats) -> BenchResult<()> {
        let endpoint = &self.event.storage_endpoint;
        let mut session: Box<dyn StorageSession> = self.storage.connect(endpoint).await?;
        log.info(format!("Connected to {} storage @ {endpoint}", self.storage.name()))
            .await;

        let workload = Workload::new(
            self.id(),
            JobId(self.event.job_id.clone()),
            self.event.object_size,
            self.event.num_ops,
            self.output_dir.clone(),
        );

        for op in self.event.mode.operations() {
            let phase = workload.run_phase(*op, session.as_mut()).await?;
            log.info(format!(
                "{} phase done: {} ops, p50 {:.0}us",
                op,
                phase.completed,
                phase.latency.percentiles().p50
            ))
            .await;
            stats.record_phase(phase);
        }

        Ok(())
    }

    async fn upload_results(&self, log: &mut LogClient, stats: &mut WorkerStats) {
        for op in Operation::ALL {
            let path = self.output_dir.join(result_file_name(op, self.id()));

            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                log.warn(format!("Result file {} not found", path.display()))
                    .await;
                stats.missing.push(path);
                continue;
            }

            let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned())
            else {
                continue;
            };
            let key = format!("{}/{file_name}", self.event.results_prefix);

            log.info(format!("Copying results @ {} to {key}", path.display()))
                .await;
            match self.results.upload(&path, &key).await {
                Ok(()) => stats.uploaded.push(key),
                Err(e) => {
                    log.error(e.to_string()).await;
                    stats.upload_failures += 1;
                }
            }
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id())
            .field("storage", &self.storage.name())
            .field("output_dir", &self.output_dir)
            .finish()
    }
}
