//! Single-threaded event loop multiplexing clients onto the display.
//!
//! One task owns the listener, every session and the display encoder. Each
//! iteration waits for the first of: an incoming connection, any session
//! becoming readable, or the housekeeping tick. It then services whatever is
//! ready. Commands are applied in arrival order and each command is flushed
//! to the bus before the next one is looked at, so bursts from different
//! clients never interleave.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::select_all;
use lcdsrv_protocol::{Command, DisplayEncoder, I2cBus};
use tracing::{debug, info, trace, warn};

use super::listener::{accept_backoff, ClientStream, Listener, PeerAddr};
use super::session::{ReadOutcome, Session, SessionId};
use super::GatewayError;

/// Upper bound on how long one iteration waits for activity.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Counters kept across the gateway's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub accepted: u64,
    pub rejected: u64,
    pub disconnected: u64,
    pub commands: u64,
    pub bus_failures: u64,
}

enum Wakeup {
    Incoming(std::io::Result<(ClientStream, PeerAddr)>),
    Readable,
    Tick,
}

/// The gateway event loop.
pub struct Multiplexer<B> {
    listener: Listener,
    sessions: HashMap<SessionId, Session>,
    encoder: DisplayEncoder<B>,
    max_clients: usize,
    next_id: u64,
    stats: GatewayStats,
}

impl<B: I2cBus> Multiplexer<B> {
    /// Create a multiplexer over a bound listener and an initialized encoder.
    pub fn new(listener: Listener, encoder: DisplayEncoder<B>, max_clients: usize) -> Self {
        Self {
            listener,
            sessions: HashMap::new(),
            encoder,
            max_clients,
            next_id: 1,
            stats: GatewayStats::default(),
        }
    }

    /// Run until the listening handle fails.
    pub async fn run(&mut self) -> Result<(), GatewayError> {
        info!(max_clients = self.max_clients, "Gateway running");
        loop {
            self.step().await?;
        }
    }

    /// Wait for activity once and service everything that is ready.
    pub async fn step(&mut self) -> Result<(), GatewayError> {
        let wakeup = tokio::select! {
            incoming = self.listener.accept() => Wakeup::Incoming(incoming),
            _ = any_readable(&self.sessions) => Wakeup::Readable,
            _ = tokio::time::sleep(TICK_INTERVAL) => Wakeup::Tick,
        };

        match wakeup {
            Wakeup::Incoming(Ok((stream, peer))) => self.admit(stream, peer),
            Wakeup::Incoming(Err(e)) => match accept_backoff(&e) {
                Some(delay) => {
                    warn!(
                        error = %e,
                        backoff_ms = delay.as_millis() as u64,
                        "Failed to accept connection"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return Err(GatewayError::Accept(e)),
            },
            Wakeup::Readable => {}
            Wakeup::Tick => {
                trace!(clients = self.sessions.len(), "Idle tick");
            }
        }

        self.service_sessions();
        Ok(())
    }

    /// Number of connected clients.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Configured client limit.
    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub fn stats(&self) -> GatewayStats {
        self.stats
    }

    pub fn encoder(&self) -> &DisplayEncoder<B> {
        &self.encoder
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    /// Drop a session. Returns false if it was already gone.
    pub fn evict(&mut self, id: SessionId) -> bool {
        match self.sessions.remove(&id) {
            Some(session) => {
                self.stats.disconnected += 1;
                info!(
                    session_id = %id,
                    peer = %session.peer(),
                    connected_secs = session.connected_for().as_secs(),
                    clients = self.sessions.len(),
                    "Client disconnected"
                );
                true
            }
            None => false,
        }
    }

    fn admit(&mut self, stream: ClientStream, peer: PeerAddr) {
        if self.sessions.len() >= self.max_clients {
            self.stats.rejected += 1;
            warn!(
                peer = %peer,
                max_clients = self.max_clients,
                "Too many clients, closing connection"
            );
            drop(stream);
            return;
        }

        let id = SessionId(self.next_id);
        self.next_id += 1;
        self.stats.accepted += 1;

        self.sessions.insert(id, Session::new(id, stream, peer.clone()));
        info!(
            session_id = %id,
            peer = %peer,
            clients = self.sessions.len(),
            "Client connected"
        );
    }

    fn service_sessions(&mut self) {
        let mut ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        ids.sort_unstable();

        let mut closed = Vec::new();
        for id in ids {
            let Some(session) = self.sessions.get_mut(&id) else {
                continue;
            };

            match session.read_lines() {
                Ok(ReadOutcome::Lines(lines)) => {
                    for line in lines {
                        self.dispatch(id, &line);
                    }
                }
                Ok(ReadOutcome::Pending) => {}
                Ok(ReadOutcome::Closed) => closed.push(id),
                Err(e) => {
                    debug!(session_id = %id, error = %e, "Read failed");
                    closed.push(id);
                }
            }
        }

        for id in closed {
            self.evict(id);
        }
    }

    fn dispatch(&mut self, id: SessionId, line: &[u8]) {
        let command = Command::decode(line);
        self.stats.commands += 1;
        debug!(
            session_id = %id,
            command = command.name(),
            line = %String::from_utf8_lossy(line),
            "Command"
        );

        self.encoder.apply(&command);
        if let Err(e) = self.encoder.flush() {
            self.stats.bus_failures += 1;
            warn!(session_id = %id, error = %e, "Display update failed");
        }
    }
}

/// Resolves once any session is readable or hung up; never with no sessions.
async fn any_readable(sessions: &HashMap<SessionId, Session>) {
    if sessions.is_empty() {
        return std::future::pending().await;
    }

    let waits = sessions
        .values()
        .map(|session| Box::pin(session.stream().readable()));
    let _ = select_all(waits).await;
}
