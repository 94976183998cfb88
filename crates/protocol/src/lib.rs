//! # lcdsrv Protocol Library
//!
//! This crate holds the transport-independent half of the LCD gateway:
//! turning client bytes into display operations, and display operations
//! into words on the I2C bus.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Client bytes (TCP / Unix)        │
//! ├─────────────────────────────────────────┤
//! │         LineBuffer (CR LF framing)      │  bounded, per client
//! ├─────────────────────────────────────────┤
//! │         Command::decode                 │  pure
//! ├─────────────────────────────────────────┤
//! │         DisplayEncoder                  │  4-bit nibbles, bursts
//! ├─────────────────────────────────────────┤
//! │         I2cBus (port expander)          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use lcdsrv_protocol::{BusError, Command, DisplayEncoder, I2cBus, LineBuffer};
//!
//! struct NullBus;
//!
//! impl I2cBus for NullBus {
//!     fn write_register(&mut self, _: u8, _: u8, _: u8) -> Result<(), BusError> {
//!         Ok(())
//!     }
//!     fn write_burst(&mut self, _: u8, _: u8, _: &[u8]) -> Result<(), BusError> {
//!         Ok(())
//!     }
//! }
//!
//! let mut lines = LineBuffer::new();
//! let mut display = DisplayEncoder::new(NullBus, 0x20);
//!
//! for line in lines.feed(b"C\r\nhello\r\n") {
//!     display.apply(&Command::decode(&line));
//!     display.flush().unwrap();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: client command decoding
//! - [`line`]: bounded line framing
//! - [`display`]: LCD bus encoder and the bus trait
//! - [`error`]: Error types

pub mod command;
pub mod display;
pub mod error;
pub mod line;

pub use command::Command;
pub use display::{
    split_nibbles, DisplayEncoder, I2cBus, Mode, CODE_PAGE, DEFAULT_DEVICE_ADDRESS, MAX_BURST_LEN,
};
pub use error::{BusError, Result};
pub use line::{LineBuffer, LINE_TERMINATOR, MAX_BUFFERED, RECEIVE_CAPACITY};
