//! Per-connection log stream reader

use std::net::SocketAddr;

use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::protocol::{LogLine, ABORT_PREFIX, CLOSE_MARKER, MAX_FRAME};

use super::executor::LogRecord;

/// Why a log connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// `CLOSE` marker received
    Marker,
    /// `ABORT:<reason>` received
    Abort,
    /// Peer closed without a marker
    Eof,
    /// Read error
    Error,
}

/// Event sent from a connection reader to the aggregator
#[derive(Debug)]
pub(crate) enum LogEvent {
    /// A line to emit
    Line(LogRecord),
    /// The connection reached a close state; sent exactly once
    Closed {
        peer: SocketAddr,
        reason: CloseReason,
    },
}

/// Splits a byte stream into `\n`-terminated lines, keeping any partial
/// line until more bytes arrive
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: Vec<u8>,
}

impl LineSplitter {
    /// Create an empty splitter
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every line they complete
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.partial.iter().position(|b| *b == b'\n') {
            let rest = self.partial.split_off(pos + 1);
            let line = std::mem::replace(&mut self.partial, rest);
            lines.push(decode(&line));
        }
        lines
    }

    /// Take whatever is left without a terminating newline
    pub fn finish(&mut self) -> Option<String> {
        let line = decode(&std::mem::take(&mut self.partial));
        (!line.is_empty()).then_some(line)
    }

    /// Bytes buffered without a newline yet
    pub fn pending(&self) -> usize {
        self.partial.len()
    }
}

fn decode(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim().to_string()
}

/// What to do with one complete line
enum Disposition {
    Emit(LogLine),
    Skip,
    Terminal(Option<LogLine>, CloseReason),
}

fn classify(line: &str, verbose: bool) -> Disposition {
    if line.is_empty() {
        return Disposition::Skip;
    }

    if line.starts_with(ABORT_PREFIX) {
        return Disposition::Terminal(Some(LogLine::parse(line)), CloseReason::Abort);
    }

    if line.contains(CLOSE_MARKER) {
        let trailer = line.replace(CLOSE_MARKER, "");
        let trailer = trailer.trim();
        let last = (!trailer.is_empty()).then(|| LogLine::parse(trailer));
        return Disposition::Terminal(last, CloseReason::Marker);
    }

    if verbose {
        Disposition::Emit(LogLine::parse(line))
    } else {
        Disposition::Skip
    }
}

/// Read one worker's log stream until it closes
///
/// Lines past the terminal marker are never processed.
pub(crate) async fn read_log_stream(
    mut stream: TcpStream,
    peer: SocketAddr,
    verbose: bool,
    events: mpsc::Sender<LogEvent>,
) {
    let mut splitter = LineSplitter::new();
    let mut buf = vec![0u8; MAX_FRAME];

    let reason = 'read: loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => {
                // Flush a trailing line the peer never terminated.
                if let Some(line) = splitter.finish() {
                    match classify(&line, verbose) {
                        Disposition::Emit(line) => send_line(&events, peer, line).await,
                        Disposition::Terminal(last, reason) => {
                            if let Some(line) = last {
                                send_line(&events, peer, line).await;
                            }
                            break 'read reason;
                        }
                        Disposition::Skip => {}
                    }
                }
                break CloseReason::Eof;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "Log connection read failed");
                break CloseReason::Error;
            }
        };

        for line in splitter.push(&buf[..n]) {
            match classify(&line, verbose) {
                Disposition::Emit(line) => send_line(&events, peer, line).await,
                Disposition::Skip => {}
                Disposition::Terminal(last, reason) => {
                    if let Some(line) = last {
                        send_line(&events, peer, line).await;
                    }
                    break 'read reason;
                }
            }
        }
    };

    drop(stream);
    let _ = events.send(LogEvent::Closed { peer, reason }).await;
}

async fn send_line(events: &mpsc::Sender<LogEvent>, peer: SocketAddr, line: LogLine) {
    let record = LogRecord {
        peer,
        received_at: Utc::now(),
        line,
    };
    let _ = events.send(LogEvent::Line(record)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splitter_keeps_partial_lines() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.push(b"INFO hel").is_empty());
        assert_eq!(splitter.pending(), 8);
        assert_eq!(splitter.push(b"lo\nWARN x\nERR"), vec!["INFO hello", "WARN x"]);
        assert_eq!(splitter.finish(), Some("ERR".to_string()));
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_splitter_handles_crlf() {
        let mut splitter = LineSplitter::new();
        assert_eq!(splitter.push(b"INFO a\r\n"), vec!["INFO a"]);
    }

    #[test]
    fn test_close_marker_with_trailer() {
        match classify("INFO done CLOSE", false) {
            Disposition::Terminal(Some(line), CloseReason::Marker) => {
                assert_eq!(line, LogLine::info("done"));
            }
            _ => panic!("expected terminal line with trailer"),
        }
        assert!(matches!(
            classify("CLOSE", true),
            Disposition::Terminal(None, CloseReason::Marker)
        ));
    }

    #[test]
    fn test_abort_is_terminal() {
        assert!(matches!(
            classify("ABORT:Control returned ABORT", false),
            Disposition::Terminal(Some(LogLine::Abort(_)), CloseReason::Abort)
        ));
    }

    #[test]
    fn test_quiet_drops_regular_lines() {
        assert!(matches!(classify("INFO hi", false), Disposition::Skip));
        assert!(matches!(classify("INFO hi", true), Disposition::Emit(_)));
        assert!(matches!(classify("", true), Disposition::Skip));
    }
}
