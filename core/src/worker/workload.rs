//! Timed put/get workload against the storage service

use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::config::Operation;
use crate::error::{BenchError, BenchResult};
use crate::metrics::LatencyHistogram;
use crate::protocol::WorkerId;
use crate::traits::{JobId, StorageError, StorageSession};

use super::stats::PhaseStats;

/// File name prefix of per-worker latency samples
pub const RESULT_FILE_PREFIX: &str = "pocket";

/// Name of the file holding `op` samples for `worker`
pub fn result_file_name(op: Operation, worker: WorkerId) -> String {
    format!("{RESULT_FILE_PREFIX}_{}_{worker}.txt", op.as_str())
}

/// Name of the `index`-th object written by `worker`
pub fn object_name(worker: WorkerId, index: usize) -> String {
    format!("tmp-{worker}-{index}")
}

/// One worker's sequence of phases
#[derive(Debug, Clone)]
pub struct Workload {
    worker: WorkerId,
    job: JobId,
    object_size: usize,
    num_ops: usize,
    output_dir: PathBuf,
}

impl Workload {
    /// Create a workload writing result files below `output_dir`
    pub fn new(
        worker: WorkerId,
        job: JobId,
        object_size: usize,
        num_ops: usize,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            worker,
            job,
            object_size,
            num_ops,
            output_dir: output_dir.into(),
        }
    }

    /// Path of the result file for `op`
    pub fn result_path(&self, op: Operation) -> PathBuf {
        self.output_dir.join(result_file_name(op, self.worker))
    }

    /// Run one phase: `num_ops` sequential operations, each timed
    ///
    /// Every sample is written before its status is checked, so a failing
    /// operation still appears in the result file.
    pub async fn run_phase(
        &self,
        op: Operation,
        session: &mut dyn StorageSession,
    ) -> BenchResult<PhaseStats> {
        let path = self.result_path(op);
        let mut output = BufWriter::new(File::create(&path).await?);
        let mut latency = LatencyHistogram::new();

        let payload = vec![b'a'; self.object_size];
        let mut readback = vec![b' '; self.object_size];

        let started = Instant::now();
        let mut failure = None;
        for i in 0..self.num_ops {
            let name = object_name(self.worker, i);

            let t0 = Instant::now();
            let result = match op {
                Operation::Write => session.put(&name, &payload, &self.job).await,
                Operation::Read => session.get(&name, &mut readback, &self.job).await,
            };
            let elapsed = t0.elapsed();

            output
                .write_all(format!("{}\n", elapsed.as_micros()).as_bytes())
                .await?;
            latency.record(elapsed);

            if let Err(e) = result {
                failure = Some((name, e));
                break;
            }
        }
        output.flush().await?;

        if let Some((name, e)) = failure {
            return Err(self.failed(op, &name, e));
        }

        Ok(PhaseStats {
            op,
            completed: self.num_ops,
            latency,
            elapsed: started.elapsed(),
            results_file: path,
        })
    }

    fn failed(&self, op: Operation, name: &str, err: StorageError) -> BenchError {
        let verb = match op {
            Operation::Write => "put",
            Operation::Read => "get",
        };
        BenchError::workload(self.worker, format!("{verb} buffer failed: {name}: {err}"))
    }

    /// Directory result files are written to
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(
            result_file_name(Operation::Write, WorkerId(3)),
            "pocket_write_3.txt"
        );
        assert_eq!(
            result_file_name(Operation::Read, WorkerId(12)),
            "pocket_read_12.txt"
        );
        assert_eq!(object_name(WorkerId(3), 0), "tmp-3-0");
    }

    #[test]
    fn test_result_path_is_below_output_dir() {
        let workload = Workload::new(WorkerId(1), JobId::from("job-0"), 8, 10, "/tmp/out");
        assert_eq!(
            workload.result_path(Operation::Read),
            PathBuf::from("/tmp/out/pocket_read_1.txt")
        );
    }
}
