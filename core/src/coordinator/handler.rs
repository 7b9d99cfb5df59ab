//! Per-connection readiness handling

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::{ControlMessage, WorkerId, MAX_FRAME};

/// A worker that announced itself, with its still-open control connection
#[derive(Debug)]
pub struct ReadyRegistration {
    /// Announced identity
    pub id: WorkerId,

    /// Remote address of the control connection
    pub peer: SocketAddr,

    stream: TcpStream,
}

impl ReadyRegistration {
    /// Send one control message
    pub async fn send(&mut self, msg: ControlMessage) -> io::Result<()> {
        self.stream.write_all(&msg.encode()).await?;
        self.stream.flush().await
    }

    /// Send `ABORT` and close the connection
    pub async fn refuse(mut self) -> io::Result<()> {
        self.send(ControlMessage::Abort).await?;
        self.stream.shutdown().await
    }
}

/// Outcome of reading the first message on a control connection
#[derive(Debug)]
pub enum ReadinessEvent {
    /// `READY:<id>` received
    Ready(ReadyRegistration),

    /// Something other than a readiness message arrived
    Malformed {
        /// Remote address
        peer: SocketAddr,
        /// Connection, so the coordinator can answer `ABORT`
        stream: TcpStream,
        /// Why it was rejected
        reason: String,
    },

    /// Peer closed before sending anything
    Disconnected {
        /// Remote address
        peer: SocketAddr,
    },

    /// Read failed
    Failed {
        /// Remote address
        peer: SocketAddr,
        /// Socket error
        error: io::Error,
    },
}

impl ReadinessEvent {
    /// Remote address of the connection this event came from
    pub fn peer(&self) -> SocketAddr {
        match self {
            ReadinessEvent::Ready(reg) => reg.peer,
            ReadinessEvent::Malformed { peer, .. }
            | ReadinessEvent::Disconnected { peer }
            | ReadinessEvent::Failed { peer, .. } => *peer,
        }
    }
}

/// Read exactly one readiness message from a fresh control connection
///
/// The message is a single raw frame; surrounding whitespace is ignored.
pub async fn read_readiness(mut stream: TcpStream, peer: SocketAddr) -> ReadinessEvent {
    let mut buf = vec![0u8; MAX_FRAME];

    let n = match stream.read(&mut buf).await {
        Ok(0) => return ReadinessEvent::Disconnected { peer },
        Ok(n) => n,
        Err(error) => return ReadinessEvent::Failed { peer, error },
    };

    match ControlMessage::parse(&buf[..n]) {
        Ok(ControlMessage::Ready(id)) => {
            ReadinessEvent::Ready(ReadyRegistration { id, peer, stream })
        }
        Ok(other) => ReadinessEvent::Malformed {
            peer,
            stream,
            reason: format!("expected READY, got {other:?}"),
        },
        Err(e) => ReadinessEvent::Malformed {
            peer,
            stream,
            reason: e.to_string(),
        },
    }
}
