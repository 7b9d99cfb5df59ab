//! Wire types for the control and log channels
//!
//! Both channels are plain TCP. The control channel carries exactly one
//! exchange per worker (`READY:<id>` answered by `RUN` or `ABORT`); the log
//! channel carries newline-delimited text lines ending in a terminal marker.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BenchError;

/// Prefix of the readiness message
pub const READY_PREFIX: &str = "READY:";

/// Release instruction sent by the coordinator
pub const RUN: &str = "RUN";

/// Refusal sent by the coordinator
pub const ABORT: &str = "ABORT";

/// Terminal marker of a log stream
pub const CLOSE_MARKER: &str = "CLOSE";

/// Prefix of the terminal line sent when a worker declines to run
pub const ABORT_PREFIX: &str = "ABORT:";

/// Largest single read on either channel
pub const MAX_FRAME: usize = 4096;

// ============================================================================
// Worker identity
// ============================================================================

/// Identity of one worker instance within a run
///
/// Ordering is numeric; waves are assigned by sorting on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkerId {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(WorkerId)
            .map_err(|_| BenchError::protocol(format!("invalid worker identity: {s:?}")))
    }
}

impl From<u64> for WorkerId {
    fn from(id: u64) -> Self {
        WorkerId(id)
    }
}

// ============================================================================
// Control channel
// ============================================================================

/// Messages exchanged on the control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Worker asks to be registered
    Ready(WorkerId),
    /// Worker may execute its workload
    Run,
    /// Worker must not run
    Abort,
}

impl ControlMessage {
    /// Encode for the wire. Framing is raw bytes with a trailing newline
    /// that the receiver trims.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            ControlMessage::Ready(id) => format!("{READY_PREFIX}{id}\n").into_bytes(),
            ControlMessage::Run => format!("{RUN}\n").into_bytes(),
            ControlMessage::Abort => format!("{ABORT}\n").into_bytes(),
        }
    }

    /// Parse one received frame. Surrounding whitespace is ignored.
    pub fn parse(raw: &[u8]) -> Result<Self, BenchError> {
        let text = String::from_utf8_lossy(raw);
        let msg = text.trim();

        if let Some(id) = msg.strip_prefix(READY_PREFIX) {
            return Ok(ControlMessage::Ready(id.parse()?));
        }

        match msg {
            RUN => Ok(ControlMessage::Run),
            ABORT => Ok(ControlMessage::Abort),
            other => Err(BenchError::protocol(format!(
                "unexpected control message: {other:?}"
            ))),
        }
    }
}

// ============================================================================
// Log channel
// ============================================================================

/// Severity of a worker diagnostic line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Informational
    Info,
    /// Something unexpected that did not stop the worker
    Warn,
    /// A failure
    Error,
}

impl LogLevel {
    /// Wire spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of a worker's log stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLine {
    /// `LEVEL text`
    Entry {
        /// Severity
        level: LogLevel,
        /// Message text
        text: String,
    },
    /// `ABORT:<reason>`, the worker declined to run
    Abort(String),
    /// `CLOSE`, normal end of stream
    Close,
    /// A line without a recognized level prefix
    Raw(String),
}

impl LogLine {
    /// Build an `INFO` entry
    pub fn info(text: impl Into<String>) -> Self {
        LogLine::Entry {
            level: LogLevel::Info,
            text: text.into(),
        }
    }

    /// Build a `WARN` entry
    pub fn warn(text: impl Into<String>) -> Self {
        LogLine::Entry {
            level: LogLevel::Warn,
            text: text.into(),
        }
    }

    /// Build an `ERROR` entry
    pub fn error(text: impl Into<String>) -> Self {
        LogLine::Entry {
            level: LogLevel::Error,
            text: text.into(),
        }
    }

    /// Parse a single line (without its newline)
    pub fn parse(line: &str) -> Self {
        let line = line.trim();

        if line == CLOSE_MARKER {
            return LogLine::Close;
        }
        if let Some(reason) = line.strip_prefix(ABORT_PREFIX) {
            return LogLine::Abort(reason.trim().to_string());
        }

        let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
        let level = match head {
            "INFO" => LogLevel::Info,
            "WARN" => LogLevel::Warn,
            "ERROR" => LogLevel::Error,
            _ => return LogLine::Raw(line.to_string()),
        };

        LogLine::Entry {
            level,
            text: rest.trim().to_string(),
        }
    }

    /// Encode as one newline-terminated line
    pub fn encode(&self) -> String {
        match self {
            LogLine::Entry { level, text } => format!("{} {}\n", level, text.trim_end()),
            LogLine::Abort(reason) => format!("{ABORT_PREFIX}{reason}\n"),
            LogLine::Close => format!("{CLOSE_MARKER}\n"),
            LogLine::Raw(text) => format!("{text}\n"),
        }
    }

    /// Whether this line ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, LogLine::Abort(_) | LogLine::Close)
    }

    /// Severity used when this line is surfaced by the multiplexer
    pub fn level(&self) -> LogLevel {
        match self {
            LogLine::Entry { level, .. } => *level,
            LogLine::Abort(_) => LogLevel::Warn,
            LogLine::Close | LogLine::Raw(_) => LogLevel::Info,
        }
    }

    /// Human-readable text of the line
    pub fn text(&self) -> &str {
        match self {
            LogLine::Entry { text, .. } | LogLine::Raw(text) => text,
            LogLine::Abort(reason) => reason,
            LogLine::Close => "",
        }
    }
}
