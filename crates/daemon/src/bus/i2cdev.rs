use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use lcdsrv_protocol::{BusError, I2cBus};

// <linux/i2c-dev.h>
const I2C_SLAVE: u16 = 0x0703;

nix::ioctl_write_int_bad!(i2c_set_slave, I2C_SLAVE);

/// Bus backed by a Linux i2c-dev character device.
///
/// Every `write(2)` on the device is one I2C transaction, so a burst is
/// assembled into a single buffer (`register` followed by the words) and
/// handed to the kernel in one call.
pub struct LinuxI2cBus {
    file: File,
    path: PathBuf,
    selected: Option<u8>,
    scratch: Vec<u8>,
}

impl LinuxI2cBus {
    /// Open the bus device node for writing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BusError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| BusError::Open {
                path: path.display().to_string(),
                source,
            })?;

        tracing::debug!(path = %path.display(), "Opened I2C bus");

        Ok(Self {
            file,
            path: path.to_path_buf(),
            selected: None,
            scratch: Vec::with_capacity(lcdsrv_protocol::MAX_BURST_LEN + 1),
        })
    }

    /// Path of the opened device node.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn select(&mut self, address: u8) -> Result<(), BusError> {
        if self.selected == Some(address) {
            return Ok(());
        }

        // SAFETY: the descriptor is owned by `self.file` and stays open for
        // the duration of the call.
        unsafe { i2c_set_slave(self.file.as_raw_fd(), i32::from(address)) }.map_err(|errno| {
            BusError::SelectDevice {
                address,
                source: io::Error::from(errno),
            }
        })?;

        self.selected = Some(address);
        Ok(())
    }

    fn transfer(&mut self, address: u8) -> Result<(), BusError> {
        let expected = self.scratch.len();
        let written = self
            .file
            .write(&self.scratch)
            .map_err(|source| BusError::Write { address, source })?;

        if written != expected {
            return Err(BusError::ShortWrite {
                address,
                written,
                expected,
            });
        }
        Ok(())
    }
}

impl I2cBus for LinuxI2cBus {
    fn write_register(&mut self, address: u8, register: u8, value: u8) -> Result<(), BusError> {
        self.select(address)?;
        self.scratch.clear();
        self.scratch.extend_from_slice(&[register, value]);
        self.transfer(address)
    }

    fn write_burst(&mut self, address: u8, register: u8, words: &[u8]) -> Result<(), BusError> {
        self.select(address)?;
        self.scratch.clear();
        self.scratch.push(register);
        self.scratch.extend_from_slice(words);
        self.transfer(address)
    }
}

impl std::fmt::Debug for LinuxI2cBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinuxI2cBus")
            .field("path", &self.path)
            .field("selected", &self.selected)
            .finish()
    }
}
