//! Orchestrator for run lifecycle management
//!
//! The Orchestrator drives one complete benchmark run:
//! - Binding the log server on `port` and the control server on `port + 1`
//! - Registering one storage job per batch
//! - Launching every worker through a [`WorkerLauncher`](crate::traits::WorkerLauncher)
//! - Waiting for all workers and both servers
//! - Deregistering the jobs, whatever happened to the workers
//!
//! # Example
//!
//! ```ignore
//! use pbench_core::{LocalLauncher, OrchestratorBuilder};
//!
//! let orchestrator = OrchestratorBuilder::new()
//!     .config(config)
//!     .launcher(Arc::new(LocalLauncher::new(storage, results, output_dir)))
//!     .job_registry(registry)
//!     .build()?;
//!
//! let report = orchestrator.run().await?;
//! ```

mod aggregator;
mod builder;
mod executor;
mod launcher;

pub use aggregator::{aggregate_results, OperationSummary, RunReport, RunSummary, WorkerResult};
pub use builder::OrchestratorBuilder;
pub use executor::{batch_of, job_name, Orchestrator, JOB_CAPACITY_GB, JOB_PEAK_MBPS};
pub use launcher::LocalLauncher;
