//! Per-client connection state.

use std::fmt;
use std::io;
use std::time::{Duration, Instant};

use lcdsrv_protocol::{LineBuffer, RECEIVE_CAPACITY};

use super::listener::{ClientStream, PeerAddr};

/// Identifier assigned to each accepted client, unique for the daemon's
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of servicing one session.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes arrived; zero or more complete lines were extracted.
    Lines(Vec<Vec<u8>>),
    /// Nothing to read right now.
    Pending,
    /// The peer closed the connection.
    Closed,
}

/// A connected client and its partially received line.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    stream: ClientStream,
    peer: PeerAddr,
    buffer: LineBuffer,
    connected_at: Instant,
}

impl Session {
    pub fn new(id: SessionId, stream: ClientStream, peer: PeerAddr) -> Self {
        Self {
            id,
            stream,
            peer,
            buffer: LineBuffer::new(),
            connected_at: Instant::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> &PeerAddr {
        &self.peer
    }

    pub fn stream(&self) -> &ClientStream {
        &self.stream
    }

    /// Bytes received but not yet terminated.
    pub fn pending(&self) -> &[u8] {
        self.buffer.pending()
    }

    /// Number of times the receive buffer filled without a terminator.
    pub fn overflows(&self) -> u64 {
        self.buffer.overflows()
    }

    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Perform at most one non-blocking read and extract complete lines.
    ///
    /// Errors other than "would block" mean the connection is broken.
    pub fn read_lines(&mut self) -> io::Result<ReadOutcome> {
        let mut chunk = [0u8; RECEIVE_CAPACITY];
        match self.stream.try_read(&mut chunk) {
            Ok(0) => Ok(ReadOutcome::Closed),
            Ok(n) => {
                let before = self.buffer.overflows();
                let lines = self.buffer.feed(&chunk[..n]);
                if self.buffer.overflows() != before {
                    tracing::warn!(
                        session_id = %self.id,
                        "Line too long, discarding buffered input"
                    );
                }
                Ok(ReadOutcome::Lines(lines))
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(ReadOutcome::Pending)
            }
            Err(e) => Err(e),
        }
    }
}
