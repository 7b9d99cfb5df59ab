//! Remote worker launchers for pbench
//!
//! This crate provides implementations of the `WorkerLauncher` trait that
//! start benchmark functions outside the control process:
//!
//! - [`HttpLauncher`]: event-style invocation of a function endpoint over HTTP

#![warn(missing_docs)]
#![warn(clippy::all)]

mod http;

pub use http::{HttpInvokeConfig, HttpLauncher, INVOCATION_TYPE_HEADER};
