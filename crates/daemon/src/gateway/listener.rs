//! Listening endpoint, TCP or Unix domain socket.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::errno::Errno;
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};

use super::GatewayError;
use crate::config::{ListenConfig, ListenMode};

/// Listening socket accepting display clients.
///
/// A Unix socket file is removed again when the listener is dropped.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    Unix { listener: UnixListener, path: PathBuf },
}

impl Listener {
    /// Bind the endpoint described by the listen configuration.
    pub async fn bind(config: &ListenConfig) -> Result<Self, GatewayError> {
        match config.mode {
            ListenMode::Tcp => Self::bind_tcp(&config.ip, config.port).await,
            ListenMode::Unix => Self::bind_unix(&config.socket_path),
        }
    }

    /// Bind a TCP listener on `ip:port`.
    pub async fn bind_tcp(ip: &str, port: u16) -> Result<Self, GatewayError> {
        let endpoint = format!("{ip}:{port}");
        let listener = TcpListener::bind((ip, port))
            .await
            .map_err(|source| GatewayError::Bind {
                endpoint: endpoint.clone(),
                source,
            })?;

        tracing::info!(address = %endpoint, "Listening on TCP");
        Ok(Listener::Tcp(listener))
    }

    /// Bind a Unix domain socket at `path`.
    ///
    /// Parent directories are created and a leftover socket file from a
    /// previous run is removed first.
    pub fn bind_unix(path: &Path) -> Result<Self, GatewayError> {
        let bind_error = |source| GatewayError::Bind {
            endpoint: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(bind_error)?;
            }
        }

        if path.exists() {
            std::fs::remove_file(path).map_err(bind_error)?;
        }

        let listener = UnixListener::bind(path).map_err(bind_error)?;

        tracing::info!(path = %path.display(), "Listening on Unix socket");
        Ok(Listener::Unix {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Wait for the next incoming connection.
    pub async fn accept(&self) -> io::Result<(ClientStream, PeerAddr)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                Ok((ClientStream::Tcp(stream), PeerAddr::Tcp(addr)))
            }
            Listener::Unix { listener, .. } => {
                let (stream, addr) = listener.accept().await?;
                let path = addr.as_pathname().map(Path::to_path_buf);
                Ok((ClientStream::Unix(stream), PeerAddr::Unix(path)))
            }
        }
    }

    /// Bound TCP address, `None` for Unix sockets.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Listener::Tcp(listener) => listener.local_addr().ok(),
            Listener::Unix { .. } => None,
        }
    }

    /// Human readable endpoint: `ip:port` or the socket path.
    pub fn endpoint(&self) -> String {
        match self {
            Listener::Tcp(listener) => match listener.local_addr() {
                Ok(addr) => addr.to_string(),
                Err(_) => "tcp".to_string(),
            },
            Listener::Unix { path, .. } => path.display().to_string(),
        }
    }

    /// Socket file path, `None` for TCP.
    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            Listener::Tcp(_) => None,
            Listener::Unix { path, .. } => Some(path),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Listener::Unix { path, .. } = self {
            if let Err(e) = std::fs::remove_file(path.as_path()) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove socket file");
                }
            }
        }
    }
}

/// Returns true when an accept error means the listening handle is unusable.
///
/// Everything else (aborted handshakes, descriptor exhaustion) only costs the
/// one pending connection.
pub fn is_fatal_accept_error(err: &io::Error) -> bool {
    match err.raw_os_error() {
        Some(code) => matches!(
            Errno::from_raw(code),
            Errno::EBADF | Errno::EINVAL | Errno::ENOTSOCK | Errno::EOPNOTSUPP | Errno::EFAULT
        ),
        None => false,
    }
}

/// Pause after a recoverable accept failure. The listener stays readable
/// while the process is out of descriptors, so retrying at once would spin.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How long to wait before accepting again, `None` if the listener is unusable.
pub fn accept_backoff(err: &io::Error) -> Option<Duration> {
    if is_fatal_accept_error(err) {
        None
    } else {
        Some(ACCEPT_BACKOFF)
    }
}

/// Connected client stream.
#[derive(Debug)]
pub enum ClientStream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl ClientStream {
    /// Wait until the stream is readable or has hung up.
    pub async fn readable(&self) -> io::Result<()> {
        match self {
            ClientStream::Tcp(stream) => stream.readable().await,
            ClientStream::Unix(stream) => stream.readable().await,
        }
    }

    /// Non-blocking read; `WouldBlock` when no data is pending.
    pub fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ClientStream::Tcp(stream) => stream.try_read(buf),
            ClientStream::Unix(stream) => stream.try_read(buf),
        }
    }
}

/// Remote end of a client connection, for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddr {
    Tcp(SocketAddr),
    Unix(Option<PathBuf>),
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerAddr::Tcp(addr) => write!(f, "{}", addr.ip()),
            PeerAddr::Unix(Some(path)) => write!(f, "unix:{}", path.display()),
            PeerAddr::Unix(None) => write!(f, "unix:<unnamed>"),
        }
    }
}
