//! Worker statistics tracking

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::config::Operation;
use crate::metrics::LatencyHistogram;
use crate::protocol::WorkerId;

/// Result of one workload phase
#[derive(Debug, Clone)]
pub struct PhaseStats {
    /// Operation the phase issued
    pub op: Operation,

    /// Operations that completed successfully
    pub completed: usize,

    /// Per-operation latency
    pub latency: LatencyHistogram,

    /// Wall time of the whole phase
    pub elapsed: Duration,

    /// Local file holding the raw samples
    pub results_file: PathBuf,
}

impl PhaseStats {
    /// Operations per second over the phase
    pub fn ops_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.completed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Statistics tracked by each worker
#[derive(Debug, Clone)]
pub struct WorkerStats {
    /// Worker these stats belong to
    pub worker: WorkerId,

    /// Completed phases in execution order
    pub phases: Vec<PhaseStats>,

    /// Remote keys of uploaded result files
    pub uploaded: Vec<String>,

    /// Result files that were expected but not found
    pub missing: Vec<PathBuf>,

    /// Uploads that failed
    pub upload_failures: usize,

    /// Worker start time
    pub started_at: Option<Instant>,

    /// Worker end time
    pub ended_at: Option<Instant>,
}

impl WorkerStats {
    /// Create new empty stats
    pub fn new(worker: WorkerId) -> Self {
        Self {
            worker,
            phases: Vec::new(),
            uploaded: Vec::new(),
            missing: Vec::new(),
            upload_failures: 0,
            started_at: None,
            ended_at: None,
        }
    }

    /// Start tracking (records start time)
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Stop tracking (records end time)
    pub fn stop(&mut self) {
        self.ended_at = Some(Instant::now());
    }

    /// Get elapsed time since start
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|start| {
            self.ended_at
                .map(|end| end.duration_since(start))
                .unwrap_or_else(|| start.elapsed())
        })
    }

    /// Record a finished phase
    pub fn record_phase(&mut self, phase: PhaseStats) {
        self.phases.push(phase);
    }

    /// Total operations across all phases
    pub fn total_operations(&self) -> usize {
        self.phases.iter().map(|p| p.completed).sum()
    }

    /// Stats of the `op` phase, if it ran
    pub fn phase(&self, op: Operation) -> Option<&PhaseStats> {
        self.phases.iter().find(|p| p.op == op)
    }

    /// Result files produced, in phase order
    pub fn results_files(&self) -> impl Iterator<Item = &PathBuf> {
        self.phases.iter().map(|p| &p.results_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(op: Operation, completed: usize, elapsed: Duration) -> PhaseStats {
        let mut latency = LatencyHistogram::new();
        for _ in 0..completed {
            latency.record_micros(100);
        }
        PhaseStats {
            op,
            completed,
            latency,
            elapsed,
            results_file: PathBuf::from(format!("pocket_{}_0.txt", op.as_str())),
        }
    }

    #[test]
    fn test_worker_stats_defaults() {
        let stats = WorkerStats::new(WorkerId(0));
        assert!(stats.phases.is_empty());
        assert_eq!(stats.total_operations(), 0);
        assert!(stats.started_at.is_none());
        assert!(stats.elapsed().is_none());
    }

    #[test]
    fn test_worker_stats_phases() {
        let mut stats = WorkerStats::new(WorkerId(0));
        stats.record_phase(phase(Operation::Write, 10, Duration::from_millis(5)));
        stats.record_phase(phase(Operation::Read, 4, Duration::from_millis(2)));

        assert_eq!(stats.total_operations(), 14);
        assert_eq!(stats.phase(Operation::Read).map(|p| p.completed), Some(4));
        assert_eq!(stats.results_files().count(), 2);
    }

    #[test]
    fn test_phase_ops_per_second() {
        let p = phase(Operation::Write, 100, Duration::from_secs(2));
        assert!((p.ops_per_second() - 50.0).abs() < 1e-9);

        let instant = phase(Operation::Write, 100, Duration::ZERO);
        assert_eq!(instant.ops_per_second(), 0.0);
    }

    #[test]
    fn test_worker_stats_start_stop() {
        let mut stats = WorkerStats::new(WorkerId(1));
        stats.start();
        std::thread::sleep(Duration::from_millis(10));
        stats.stop();

        let elapsed = stats.elapsed().unwrap();
        assert!(elapsed >= Duration::from_millis(10));
    }
}
