//! Log multiplexer aggregator loop

use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::channel::ChannelConfig;
use crate::error::BenchResult;
use crate::protocol::{LogLevel, LogLine};

use super::connection::{read_log_stream, CloseReason, LogEvent};

/// One worker log line, tagged with where and when it arrived
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Remote address of the log connection
    pub peer: SocketAddr,

    /// Time the line was read
    pub received_at: DateTime<Utc>,

    /// Parsed line
    pub line: LogLine,
}

impl LogRecord {
    fn emit(&self) {
        let text = self.line.text();
        match self.line {
            LogLine::Abort(_) => {
                tracing::warn!(peer = %self.peer, at = %self.received_at, "Function aborted: {text}")
            }
            _ => match self.line.level() {
                LogLevel::Info => {
                    tracing::info!(peer = %self.peer, at = %self.received_at, "{text}")
                }
                LogLevel::Warn => {
                    tracing::warn!(peer = %self.peer, at = %self.received_at, "{text}")
                }
                LogLevel::Error => {
                    tracing::error!(peer = %self.peer, at = %self.received_at, "{text}")
                }
            },
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "** Function @ {} {} {} {}",
            self.peer,
            self.received_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.line.level(),
            self.line.text()
        )
    }
}

/// What the multiplexer saw before it shut down
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSummary {
    /// Connections that reached a close state
    pub connections_closed: usize,

    /// Lines emitted (trailers and aborts included)
    pub lines_emitted: usize,

    /// Connections ended by `ABORT:<reason>`
    pub aborted: usize,

    /// Connections that dropped without a marker
    pub dropped: usize,
}

/// Collects every worker's log stream until the expected number closed
#[derive(Debug)]
pub struct LogMultiplexer {
    expected: usize,
    verbose: bool,
    channel: ChannelConfig,
    sink: Option<mpsc::Sender<LogRecord>>,
}

impl LogMultiplexer {
    /// Create a multiplexer waiting for `expected` connections
    pub fn new(expected: usize, verbose: bool) -> Self {
        Self {
            expected,
            verbose,
            channel: ChannelConfig::default(),
            sink: None,
        }
    }

    /// Forward every emitted record to an observer
    pub fn with_sink(mut self, sink: mpsc::Sender<LogRecord>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set channel sizes
    pub fn with_channel_config(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    /// Number of connections that must close before `run` returns
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Accept log connections until `expected` of them have closed
    ///
    /// The listener is dropped before returning.
    pub async fn run(mut self, listener: TcpListener) -> BenchResult<LogSummary> {
        let mut summary = LogSummary::default();
        if self.expected == 0 {
            return Ok(summary);
        }

        tracing::info!(
            addr = ?listener.local_addr().ok(),
            expected = self.expected,
            verbose = self.verbose,
            "Log multiplexer listening"
        );

        let (event_tx, mut event_rx) = mpsc::channel(self.channel.log_buffer);
        let mut readers = JoinSet::new();

        while summary.connections_closed < self.expected {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "Log connection accepted");
                        readers.spawn(read_log_stream(stream, peer, self.verbose, event_tx.clone()));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept log connection");
                    }
                },

                Some(event) = event_rx.recv() => {
                    self.on_event(event, &mut summary).await;
                }

                Some(_) = readers.join_next(), if !readers.is_empty() => {}
            }
        }

        drop(listener);
        readers.abort_all();

        tracing::info!(
            closed = summary.connections_closed,
            lines = summary.lines_emitted,
            aborted = summary.aborted,
            "Log multiplexer done"
        );
        Ok(summary)
    }

    async fn on_event(&mut self, event: LogEvent, summary: &mut LogSummary) {
        match event {
            LogEvent::Line(record) => {
                record.emit();
                summary.lines_emitted += 1;
                self.forward(record).await;
            }
            LogEvent::Closed { peer, reason } => {
                summary.connections_closed += 1;
                match reason {
                    CloseReason::Abort => summary.aborted += 1,
                    CloseReason::Eof | CloseReason::Error => summary.dropped += 1,
                    CloseReason::Marker => {}
                }
                tracing::debug!(
                    %peer,
                    ?reason,
                    closed = summary.connections_closed,
                    expected = self.expected,
                    "Log connection closed"
                );
            }
        }
    }

    async fn forward(&mut self, record: LogRecord) {
        if let Some(sink) = &self.sink {
            if sink.send(record).await.is_err() {
                tracing::debug!("Log observer went away");
                self.sink = None;
            }
        }
    }
}
