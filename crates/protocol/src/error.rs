//! Error types for the protocol crate.

use thiserror::Error;

/// Failure of the underlying I2C transport.
///
/// Decoding and line framing never fail, so the bus is the only source of
/// errors in this crate.
#[derive(Debug, Error)]
pub enum BusError {
    /// The bus device could not be opened or configured.
    #[error("cannot open I2C bus {path}: {source}")]
    Open {
        /// Path of the bus device node.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Selecting the slave address failed.
    #[error("cannot select I2C device {address:#04x}: {source}")]
    SelectDevice {
        /// 7-bit device address.
        address: u8,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A write transaction failed or the device did not acknowledge.
    #[error("I2C write to device {address:#04x} failed: {source}")]
    Write {
        /// 7-bit device address.
        address: u8,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The transaction was cut short.
    #[error("short I2C write to device {address:#04x}: {written} of {expected} bytes")]
    ShortWrite {
        /// 7-bit device address.
        address: u8,
        /// Bytes accepted by the bus.
        written: usize,
        /// Bytes in the transaction.
        expected: usize,
    },
}

/// Result type alias for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
