//! Log multiplexer: one observer for every worker's log stream
//!
//! Each worker opens one log connection and writes newline-delimited
//! `LEVEL text` lines, ending with `CLOSE` (or `ABORT:<reason>` when it was
//! refused a run). A reader task per connection splits the byte stream into
//! lines and forwards them to a single aggregator loop, which:
//!
//! - Tags every line with the peer address and a receive timestamp
//! - Emits it through `tracing` and, optionally, to an observer channel
//! - Counts closed connections and returns once the expected number closed
//!
//! A connection that drops without sending the marker counts as closed.

mod connection;
mod executor;

pub use connection::{CloseReason, LineSplitter};
pub use executor::{LogMultiplexer, LogRecord, LogSummary};
