//! PID file handling for single-instance detection.
//!
//! ```rust,no_run
//! use lcdsrv::pidfile::PidFile;
//!
//! let _guard = PidFile::create("/run/lcdsrv.pid").unwrap();
//! // file is removed when `_guard` goes out of scope
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

/// Errors raised while claiming the PID file.
#[derive(Debug, thiserror::Error)]
pub enum PidFileError {
    /// Another live process owns the PID file.
    #[error("lcdsrv is already running with PID {pid} ({path})")]
    AlreadyRunning { pid: u32, path: PathBuf },

    /// The file could not be written.
    #[error("cannot write PID file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Owned PID file, removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Claim `path` for the current process.
    ///
    /// Fails if the file names a process that is still alive. A stale file
    /// (dead process or unparsable content) is replaced.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, PidFileError> {
        let path = path.as_ref();

        if let Some(pid) = running_pid(path) {
            return Err(PidFileError::AlreadyRunning {
                pid,
                path: path.to_path_buf(),
            });
        }

        let io_error = |source| PidFileError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(io_error)?;
            }
        }
        fs::write(path, format!("{}\n", std::process::id())).map_err(io_error)?;

        tracing::debug!(path = %path.display(), "Wrote PID file");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        // Only remove the file if it still names us.
        if read_pid(&self.path) == Some(std::process::id()) {
            if let Err(e) = fs::remove_file(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove PID file");
            }
        }
    }
}

/// PID recorded in `path`, if the file exists and parses.
pub fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// PID of the live process recorded in `path`.
///
/// Stale files are removed.
pub fn running_pid(path: &Path) -> Option<u32> {
    if !path.exists() {
        return None;
    }

    match read_pid(path) {
        Some(pid) if is_process_running(pid) => Some(pid),
        _ => {
            tracing::debug!(path = %path.display(), "Removing stale PID file");
            let _ = fs::remove_file(path);
            None
        }
    }
}

/// Check if a process with the given PID exists.
fn is_process_running(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }

    // Signal 0 only checks for existence; EPERM means it exists under
    // another user.
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
