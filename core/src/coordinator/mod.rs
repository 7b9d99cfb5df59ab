//! Control coordinator: the rendezvous point for workers
//!
//! Workers connect to the control port and announce themselves with
//! `READY:<id>`. The coordinator:
//!
//! - Refuses a second registration under an already accepted identity
//!   with `ABORT`
//! - Holds accepted connections open until `batch_size * num_batches`
//!   workers are registered
//! - Sorts the accepted workers by identity and slices them into waves
//! - Sends `RUN` to one wave at a time, pausing between waves
//!
//! Each connection gets its own handler task that parses exactly one
//! readiness message; all registration state is owned by the single
//! coordinator loop that receives the parsed events.
//!
//! # Example
//!
//! ```ignore
//! use pbench_core::coordinator::{ControlCoordinator, CoordinatorConfig};
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8889").await?;
//! let report = ControlCoordinator::new(CoordinatorConfig::new(4, 3, Duration::from_secs(2)))
//!     .run(listener)
//!     .await?;
//! ```

mod executor;
mod handler;
mod registry;

pub use executor::{ControlCoordinator, CoordinatorConfig, CoordinatorPhase, CoordinatorReport};
pub use handler::{read_readiness, ReadinessEvent, ReadyRegistration};
pub use registry::{plan_waves, Admission, Registry, Wave};
