//! sd_notify integration.
//!
//! All functions are no-ops when `NOTIFY_SOCKET` is not set, so the daemon
//! can call them unconditionally.

use std::env;
use std::io;
use std::os::linux::net::SocketAddrExt;
use std::os::unix::net::{SocketAddr, UnixDatagram};

use tracing::{debug, warn};

const NOTIFY_SOCKET_ENV: &str = "NOTIFY_SOCKET";

/// Returns true when systemd expects notifications from this process.
pub fn is_systemd() -> bool {
    env::var_os(NOTIFY_SOCKET_ENV).is_some()
}

fn notify_address() -> io::Result<Option<SocketAddr>> {
    let Ok(socket) = env::var(NOTIFY_SOCKET_ENV) else {
        return Ok(None);
    };

    if let Some(name) = socket.strip_prefix('@') {
        SocketAddr::from_abstract_name(name.as_bytes()).map(Some)
    } else if socket.starts_with('/') {
        SocketAddr::from_pathname(&socket).map(Some)
    } else {
        warn!(socket = %socket, "Ignoring invalid NOTIFY_SOCKET");
        Ok(None)
    }
}

/// Send one notification datagram, e.g. `"READY=1\n"`.
pub fn notify(message: &str) -> io::Result<()> {
    let Some(address) = notify_address()? else {
        return Ok(());
    };

    let socket = UnixDatagram::unbound()?;
    socket.send_to_addr(message.as_bytes(), &address)?;
    debug!(message = message.trim_end(), "Sent systemd notification");
    Ok(())
}

pub fn notify_ready() {
    if let Err(e) = notify("READY=1\n") {
        warn!(error = %e, "Failed to notify systemd of ready state");
    }
}

pub fn notify_status(status: &str) {
    if let Err(e) = notify(&format!("STATUS={status}\n")) {
        warn!(error = %e, "Failed to send status to systemd");
    }
}

pub fn notify_stopping() {
    if let Err(e) = notify("STOPPING=1\n") {
        warn!(error = %e, "Failed to notify systemd of stopping state");
    }
}
