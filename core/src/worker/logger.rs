//! Worker side of the log and control channels

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{BenchError, BenchResult};
use crate::protocol::{ControlMessage, LogLine, WorkerId, MAX_FRAME};

/// Line writer for the log channel
///
/// Writes are best-effort: once the connection breaks, further lines are
/// dropped and the multiplexer sees the zero-byte read instead.
#[derive(Debug)]
pub struct LogClient {
    stream: TcpStream,
    endpoint: String,
    broken: bool,
}

impl LogClient {
    /// Connect to the log server. Failure here is fatal for the worker.
    pub async fn connect(endpoint: &str) -> BenchResult<Self> {
        let stream = TcpStream::connect(endpoint)
            .await
            .map_err(|e| BenchError::connection(endpoint, e))?;
        Ok(Self {
            stream,
            endpoint: endpoint.to_string(),
            broken: false,
        })
    }

    /// Send an `INFO` line
    pub async fn info(&mut self, msg: impl Into<String>) {
        self.send(LogLine::info(msg)).await;
    }

    /// Send a `WARN` line
    pub async fn warn(&mut self, msg: impl Into<String>) {
        self.send(LogLine::warn(msg)).await;
    }

    /// Send an `ERROR` line
    pub async fn error(&mut self, msg: impl Into<String>) {
        self.send(LogLine::error(msg)).await;
    }

    /// Send `CLOSE` and shut the connection down
    pub async fn close(mut self) {
        self.send(LogLine::Close).await;
        let _ = self.stream.shutdown().await;
    }

    /// Send `ABORT:<reason>` and shut the connection down
    pub async fn abort(mut self, reason: impl Into<String>) {
        self.send(LogLine::Abort(reason.into())).await;
        let _ = self.stream.shutdown().await;
    }

    /// Whether a write has failed
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    async fn send(&mut self, line: LogLine) {
        if self.broken {
            return;
        }
        if let Err(e) = self.stream.write_all(line.encode().as_bytes()).await {
            tracing::debug!(endpoint = %self.endpoint, error = %e, "Log write failed");
            self.broken = true;
        }
    }
}

/// Announce readiness on the control channel and wait for the reply
///
/// Returns the reply as received, trimmed. The connection is closed before
/// returning.
pub async fn signal_ready(endpoint: &str, worker: WorkerId) -> BenchResult<String> {
    let mut stream = TcpStream::connect(endpoint)
        .await
        .map_err(|e| BenchError::connection(endpoint, e))?;

    stream
        .write_all(&ControlMessage::Ready(worker).encode())
        .await
        .map_err(|e| BenchError::connection(endpoint, e))?;

    let mut buf = vec![0u8; MAX_FRAME];
    let n = stream
        .read(&mut buf)
        .await
        .map_err(|e| BenchError::connection(endpoint, e))?;
    let _ = stream.shutdown().await;

    Ok(String::from_utf8_lossy(&buf[..n]).trim().to_string())
}
