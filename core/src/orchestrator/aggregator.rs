//! Result aggregation from multiple workers

use std::time::Duration;

use serde::Serialize;

use crate::config::Operation;
use crate::coordinator::CoordinatorReport;
use crate::error::BenchError;
use crate::logmux::LogSummary;
use crate::metrics::{LatencyHistogram, LatencyPercentiles};
use crate::protocol::WorkerId;
use crate::traits::JobId;
use crate::worker::{WorkerOutcome, WorkerStats};

/// What one launched worker ended with
#[derive(Debug)]
pub struct WorkerResult {
    /// Worker identity
    pub worker: WorkerId,

    /// Outcome, or the error that ended it
    pub outcome: Result<WorkerOutcome, BenchError>,
}

impl WorkerResult {
    /// Stats, if the workload ran to completion in this process
    pub fn stats(&self) -> Option<&WorkerStats> {
        self.outcome.as_ref().ok().and_then(WorkerOutcome::stats)
    }
}

/// Totals for one operation across all workers
#[derive(Debug, Clone, Serialize)]
pub struct OperationSummary {
    /// Operation
    pub op: Operation,

    /// Operations completed
    pub operations: usize,

    /// Latency percentiles in microseconds
    pub latency: LatencyPercentiles,

    /// Aggregate throughput: sum of each worker's phase rate
    pub ops_per_second: f64,
}

/// Aggregated statistics from all workers
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Workers the orchestrator tried to launch
    pub launched: usize,

    /// Workers that ran their workload to completion
    pub completed: usize,

    /// Workers refused by the coordinator
    pub aborted: usize,

    /// Workers handed to a remote function
    pub dispatched: usize,

    /// Workers that failed to launch or failed while running
    pub failed: usize,

    /// Result files uploaded
    pub uploaded: usize,

    /// Per-operation totals, in first-seen phase order
    pub operations: Vec<OperationSummary>,

    /// Longest worker run
    pub total_duration: Duration,
}

impl RunSummary {
    /// Total operations across all phases and workers
    pub fn total_operations(&self) -> usize {
        self.operations.iter().map(|o| o.operations).sum()
    }

    /// Summary for one operation
    pub fn operation(&self, op: Operation) -> Option<&OperationSummary> {
        self.operations.iter().find(|o| o.op == op)
    }
}

/// Aggregate statistics from multiple workers
pub fn aggregate_results(results: &[WorkerResult]) -> RunSummary {
    let mut summary = RunSummary {
        launched: results.len(),
        ..Default::default()
    };

    let mut per_op: Vec<(Operation, usize, LatencyHistogram, f64)> = Vec::new();

    for result in results {
        match &result.outcome {
            Ok(WorkerOutcome::Completed(stats)) => {
                summary.completed += 1;
                summary.uploaded += stats.uploaded.len();
                if let Some(elapsed) = stats.elapsed() {
                    summary.total_duration = summary.total_duration.max(elapsed);
                }

                for phase in &stats.phases {
                    let idx = match per_op.iter().position(|(op, ..)| *op == phase.op) {
                        Some(idx) => idx,
                        None => {
                            per_op.push((phase.op, 0, LatencyHistogram::new(), 0.0));
                            per_op.len() - 1
                        }
                    };
                    let entry = &mut per_op[idx];
                    entry.1 += phase.completed;
                    entry.2.merge(&phase.latency);
                    entry.3 += phase.ops_per_second();
                }
            }
            Ok(WorkerOutcome::Aborted { .. }) => summary.aborted += 1,
            Ok(WorkerOutcome::Dispatched) => summary.dispatched += 1,
            Err(_) => summary.failed += 1,
        }
    }

    summary.operations = per_op
        .into_iter()
        .map(|(op, operations, latency, ops_per_second)| OperationSummary {
            op,
            operations,
            latency: latency.percentiles(),
            ops_per_second,
        })
        .collect();

    summary
}

/// Everything a run produced
#[derive(Debug)]
pub struct RunReport {
    /// Per-worker outcomes, by identity
    pub workers: Vec<WorkerResult>,

    /// Control coordinator report
    pub coordinator: CoordinatorReport,

    /// Log multiplexer summary
    pub logs: LogSummary,

    /// Jobs registered for the run (all deregistered by the time this exists)
    pub jobs: Vec<JobId>,

    /// Aggregated worker statistics
    pub summary: RunSummary,
}

impl RunReport {
    /// Whether every worker either completed or was dispatched
    pub fn is_success(&self) -> bool {
        self.summary.failed == 0 && self.summary.aborted == 0
    }
}
