//! Orchestrator execution logic

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::channel::ChannelConfig;
use crate::config::RunConfig;
use crate::coordinator::{ControlCoordinator, CoordinatorConfig};
use crate::error::{BenchError, BenchResult};
use crate::logmux::{LogMultiplexer, LogRecord};
use crate::protocol::WorkerId;
use crate::traits::{JobId, JobRegistry, LaunchHandle, WorkerLauncher};
use crate::worker::WorkerOutcome;

use super::aggregator::{aggregate_results, RunReport, WorkerResult};

/// Storage capacity reserved per job, in GB
pub const JOB_CAPACITY_GB: u64 = 10;

/// Peak throughput reserved per job, in Mbps
pub const JOB_PEAK_MBPS: u64 = 8000;

/// Batch worker `index` belongs to
pub fn batch_of(index: usize, batch_size: usize) -> usize {
    index / batch_size.max(1)
}

/// Name of the job batch `batch` writes under
pub fn job_name(batch: usize) -> String {
    format!("job-{batch}")
}

/// Orchestrator manages the run lifecycle
///
/// Responsible for starting both servers, registering storage jobs,
/// launching workers, and cleaning up once everything finished.
pub struct Orchestrator {
    /// Run configuration
    pub(crate) config: RunConfig,

    /// Starts worker instances
    pub(crate) launcher: Arc<dyn WorkerLauncher>,

    /// Storage job lifecycle
    pub(crate) registry: Arc<dyn JobRegistry>,

    /// Internal channel sizes
    pub(crate) channel: ChannelConfig,

    /// Optional observer of multiplexed log lines
    pub(crate) log_sink: Option<mpsc::Sender<LogRecord>>,
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// Use `OrchestratorBuilder` for a more ergonomic construction.
    pub fn new(
        config: RunConfig,
        launcher: Arc<dyn WorkerLauncher>,
        registry: Arc<dyn JobRegistry>,
        channel: ChannelConfig,
        log_sink: Option<mpsc::Sender<LogRecord>>,
    ) -> Self {
        Self {
            config,
            launcher,
            registry,
            channel,
            log_sink,
        }
    }

    /// Get the run configuration
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Bind both servers on the configured host and run
    ///
    /// A bind failure on either port ends the run before anything starts.
    pub async fn run(&self) -> BenchResult<RunReport> {
        let log_addr = format!("{}:{}", self.config.host, self.config.port);
        let control_addr = format!("{}:{}", self.config.host, self.config.control_port());

        let log_listener = bind(&log_addr).await?;
        let control_listener = bind(&control_addr).await?;

        self.serve(log_listener, control_listener).await
    }

    /// Run on already-bound listeners
    ///
    /// Workers are pointed at the listeners' actual ports, so listeners
    /// bound to port 0 work.
    pub async fn serve(
        &self,
        log_listener: TcpListener,
        control_listener: TcpListener,
    ) -> BenchResult<RunReport> {
        let start = Instant::now();
        let total = self.config.total_workers();
        let log_port = log_listener.local_addr()?.port();
        let control_port = control_listener.local_addr()?.port();

        tracing::info!(
            host = %self.config.host,
            log_port,
            control_port,
            workers = total,
            mode = %self.config.mode,
            launcher = self.launcher.name(),
            "Starting run"
        );

        let jobs = self.register_jobs(total).await?;

        let mut mux = LogMultiplexer::new(total, self.config.verbosity.log_workers())
            .with_channel_config(self.channel.clone());
        if let Some(sink) = &self.log_sink {
            mux = mux.with_sink(sink.clone());
        }
        let log_task = tokio::spawn(mux.run(log_listener));

        let coordinator = ControlCoordinator::new(
            CoordinatorConfig::from_run_config(&self.config)
                .with_channel_config(self.channel.clone()),
        );
        let control_task = tokio::spawn(coordinator.run(control_listener));

        let mut handles: Vec<LaunchHandle> = Vec::with_capacity(total);
        let mut results: Vec<WorkerResult> = Vec::with_capacity(total);

        for index in 0..total {
            let worker = WorkerId(index as u64);
            let batch = batch_of(index, self.config.scale.batch_size);
            let job = jobs
                .get(&batch)
                .map(|job| job.0.clone())
                .unwrap_or_else(|| job_name(batch));

            let event = self
                .config
                .invocation_event(worker, job, log_port, control_port);

            match self.launcher.launch(event).await {
                Ok(handle) => {
                    tracing::debug!(worker_id = %worker, "Worker launched");
                    handles.push(handle);
                }
                Err(e) => {
                    tracing::error!(worker_id = %worker, error = %e, "Failed to launch worker");
                    results.push(WorkerResult {
                        worker,
                        outcome: Err(e),
                    });
                }
            }
        }

        if !results.is_empty() {
            // Both servers still count on every worker connecting.
            tracing::warn!(
                failed = results.len(),
                "Some workers were not launched; the run waits for them indefinitely"
            );
        }

        let finished = join_all(handles.into_iter().map(|handle| async move {
            let worker = handle.worker();
            (worker, handle.join().await)
        }))
        .await;

        let mut rejected = 0;
        for (worker, outcome) in finished {
            if never_started(&outcome) {
                rejected += 1;
            }
            match &outcome {
                Ok(outcome) => {
                    tracing::debug!(worker_id = %worker, completed = outcome.is_completed(), "Worker finished")
                }
                Err(e) => tracing::error!(worker_id = %worker, error = %e, "Worker failed"),
            }
            results.push(WorkerResult { worker, outcome });
        }
        results.sort_by_key(|r| r.worker);

        if rejected > 0 {
            tracing::warn!(
                failed = rejected,
                "Some invocations were rejected; the run waits for them indefinitely"
            );
        }

        let coordinator = join_server(control_task, "control coordinator").await;
        let logs = join_server(log_task, "log multiplexer").await;

        let jobs: Vec<JobId> = jobs.into_values().collect();
        self.deregister_jobs(&jobs).await;

        let (coordinator, logs) = (coordinator?, logs?);
        let summary = aggregate_results(&results);

        tracing::info!(
            elapsed_secs = start.elapsed().as_secs_f64(),
            completed = summary.completed,
            aborted = summary.aborted,
            failed = summary.failed,
            operations = summary.total_operations(),
            "Run completed"
        );

        Ok(RunReport {
            workers: results,
            coordinator,
            logs,
            jobs,
            summary,
        })
    }

    /// Register one job per batch
    ///
    /// On failure every job registered so far is released again.
    async fn register_jobs(&self, total: usize) -> BenchResult<BTreeMap<usize, JobId>> {
        let mut jobs: BTreeMap<usize, JobId> = BTreeMap::new();

        for index in 0..total {
            let batch = batch_of(index, self.config.scale.batch_size);
            if jobs.contains_key(&batch) {
                continue;
            }

            let name = job_name(batch);

            match self
                .registry
                .register(&name, JOB_CAPACITY_GB, JOB_PEAK_MBPS)
                .await
            {
                Ok(job) => {
                    tracing::debug!(%name, job_id = %job, "Registered job");
                    jobs.insert(batch, job);
                }
                Err(e) => {
                    let registered: Vec<JobId> = jobs.into_values().collect();
                    self.deregister_jobs(&registered).await;
                    return Err(BenchError::Registry(format!(
                        "failed to register {name}: {e}"
                    )));
                }
            }
        }

        Ok(jobs)
    }

    async fn deregister_jobs(&self, jobs: &[JobId]) {
        for job in jobs {
            match self.registry.deregister(job).await {
                Ok(()) => tracing::debug!(job_id = %job, "Deregistered job"),
                Err(e) => tracing::warn!(job_id = %job, error = %e, "Failed to deregister job"),
            }
        }
    }
}

/// Whether a worker's outcome means it never reached either server
pub(crate) fn never_started(outcome: &BenchResult<WorkerOutcome>) -> bool {
    matches!(outcome, Err(BenchError::Invocation { .. }))
}

async fn bind(addr: &str) -> BenchResult<TcpListener> {
    TcpListener::bind(addr).await.map_err(|source| BenchError::Bind {
        addr: addr.to_string(),
        source,
    })
}

async fn join_server<T>(
    task: tokio::task::JoinHandle<BenchResult<T>>,
    name: &str,
) -> BenchResult<T> {
    match task.await {
        Ok(result) => result,
        Err(e) => Err(BenchError::orchestration(format!("{name} task failed: {e}"))),
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("launcher", &self.launcher.name())
            .finish()
    }
}
