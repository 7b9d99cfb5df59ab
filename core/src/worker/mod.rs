//! Worker runtime: one benchmark function instance
//!
//! A worker is started with an [`InvocationEvent`](crate::config::InvocationEvent)
//! and runs a fixed sequence:
//!
//! 1. Connect to the log server; every diagnostic after this is a
//!    `LEVEL text` line on that connection
//! 2. Connect to the control server, send `READY:<id>`, wait for one reply
//! 3. Anything but `RUN`: send `ABORT:<reason>` and stop without running
//! 4. `RUN`: execute the put/get phases against the storage service, then
//!    upload the per-phase result files
//! 5. Send `CLOSE`
//!
//! # Example
//!
//! ```ignore
//! use pbench_core::worker::WorkerBuilder;
//!
//! let worker = WorkerBuilder::new(event)
//!     .storage(storage)
//!     .results(results)
//!     .output_dir(dir)
//!     .build()?;
//!
//! match worker.run().await? {
//!     WorkerOutcome::Completed(stats) => println!("ops: {}", stats.total_operations()),
//!     WorkerOutcome::Aborted { reply } => println!("refused: {reply}"),
//!     WorkerOutcome::Dispatched => {}
//! }
//! ```

mod builder;
mod executor;
mod logger;
mod stats;
mod workload;

pub use builder::WorkerBuilder;
pub use executor::{Worker, WorkerOutcome};
pub use logger::{signal_ready, LogClient};
pub use stats::{PhaseStats, WorkerStats};
pub use workload::{object_name, result_file_name, Workload, RESULT_FILE_PREFIX};

#[cfg(test)]
mod tests;
