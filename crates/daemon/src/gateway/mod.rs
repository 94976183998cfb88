//! Network side of the daemon: listening endpoint, client sessions and the
//! single-threaded multiplexer that feeds the display.

pub mod listener;
pub mod multiplexer;
pub mod session;

pub use listener::{ClientStream, Listener, PeerAddr};
pub use multiplexer::{GatewayStats, Multiplexer};
pub use session::{ReadOutcome, Session, SessionId};

use std::io;

/// Errors that stop the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The listening endpoint could not be set up.
    #[error("cannot listen on {endpoint}: {source}")]
    Bind {
        /// Human readable endpoint (`ip:port` or socket path).
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// The listening handle itself failed.
    #[error("listener failed: {0}")]
    Accept(#[source] io::Error),
}
