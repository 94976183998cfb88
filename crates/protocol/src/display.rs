//! Display control encoder for WinStar (HD44780-compatible) character LCDs
//! wired through an MCP23008 8-bit I2C port expander.
//!
//! # Wiring
//!
//! The low seven expander pins drive the display; the eighth is unused.
//!
//! ```text
//!  Bit     LCD pin
//!  ---     -------
//!  0       4  (RS / A0)
//!  1       5  (R/W)
//!  2       6  (E)
//!  3..6    11..14 (DB4..DB7)
//! ```
//!
//! # Bus Protocol
//!
//! The display runs in 4-bit mode. Every byte is split into a high and a low
//! nibble; each nibble is placed on DB4..DB7 together with the mode bits and
//! clocked by writing it twice to the expander's GPIO register, first with
//! E set and then with E cleared. One byte therefore costs four bus words.
//!
//! Words are collected in a transaction buffer of [`MAX_BURST_LEN`] entries
//! and delivered as one I2C burst write (the expander is configured not to
//! advance its register pointer, so every byte of the burst lands on GPIO).

use crate::command::Command;
use crate::error::{BusError, Result};

/// Words per burst transaction.
pub const MAX_BURST_LEN: usize = 32;

/// Default MCP23008 address with A0..A2 tied low.
pub const DEFAULT_DEVICE_ADDRESS: u8 = 0x20;

/// MCP23008 registers.
pub mod register {
    /// I/O direction, 0 = output.
    pub const IODIR: u8 = 0x00;
    /// Configuration.
    pub const IOCON: u8 = 0x05;
    /// Pull-up resistors.
    pub const GPPU: u8 = 0x06;
    /// Port value.
    pub const GPIO: u8 = 0x09;
}

/// Control bits on the expander port.
pub mod control {
    /// Enable (clock) line.
    pub const CLOCK: u8 = 0x04;
    /// Sequential operation disabled: the register pointer stays on GPIO.
    pub const IOCON_NO_INCREMENT: u8 = 0x20;
}

/// HD44780 instructions used by the encoder.
pub mod instruction {
    /// Clear display.
    pub const CLEAR: u8 = 0x01;
    /// Return home.
    pub const HOME: u8 = 0x02;
    /// Display on, cursor and blink off.
    pub const DISPLAY_ON: u8 = 0x0C;
    /// Set DDRAM address.
    pub const SET_DDRAM_ADDRESS: u8 = 0x80;
}

/// Raw words that force the controller into 4-bit mode regardless of its
/// power-on state.
const FOUR_BIT_BRINGUP: [u8; 4] = [0x18, 0x18, 0x18, 0x10];

/// Character translation applied to echoed text before it reaches the
/// display's character ROM. The panel's Cyrillic ROM is laid out like
/// Windows-1251, so the mapping is the identity.
pub static CODE_PAGE: [u8; 256] = code_page();

const fn code_page() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = i as u8;
        i += 1;
    }
    table
}

/// Register-select half of the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// Nibbles are an instruction.
    Command,
    /// Nibbles are a character.
    Data,
}

/// Transfer direction half of the mode. Reads are never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Write to the controller.
    Write,
    /// Read from the controller.
    Read,
}

/// Latched display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    /// Register select.
    pub register: Register,
    /// Transfer direction.
    pub direction: Direction,
}

impl Mode {
    /// Instruction write.
    pub const COMMAND_WRITE: Mode = Mode {
        register: Register::Command,
        direction: Direction::Write,
    };

    /// Character write.
    pub const DATA_WRITE: Mode = Mode {
        register: Register::Data,
        direction: Direction::Write,
    };

    /// Port bits for this mode.
    #[inline]
    pub fn bits(self) -> u8 {
        let rs = match self.register {
            Register::Command => 0x00,
            Register::Data => 0x01,
        };
        let rw = match self.direction {
            Direction::Write => 0x00,
            Direction::Read => 0x02,
        };
        rs | rw
    }
}

/// Split a byte into its high and low nibble.
#[inline]
pub fn split_nibbles(byte: u8) -> (u8, u8) {
    ((byte >> 4) & 0x0F, byte & 0x0F)
}

/// The bus-write capability the encoder depends on.
///
/// Implementations perform each call as one atomic I2C transaction.
pub trait I2cBus {
    /// Write one register of the device at `address`.
    fn write_register(&mut self, address: u8, register: u8, value: u8) -> Result<()>;

    /// Write `words` to `register` in a single burst transaction.
    fn write_burst(&mut self, address: u8, register: u8, words: &[u8]) -> Result<()>;
}

impl<B: I2cBus + ?Sized> I2cBus for Box<B> {
    fn write_register(&mut self, address: u8, register: u8, value: u8) -> Result<()> {
        (**self).write_register(address, register, value)
    }

    fn write_burst(&mut self, address: u8, register: u8, words: &[u8]) -> Result<()> {
        (**self).write_burst(address, register, words)
    }
}

/// Stateful translator from display operations to buffered bus words.
///
/// Queuing operations never fail. When the buffer fills or the mode changes,
/// the queued words are flushed implicitly; if that write fails the burst is
/// dropped, queuing carries on, and the error is reported by the next
/// [`flush`](Self::flush).
pub struct DisplayEncoder<B> {
    bus: B,
    address: u8,
    mode: Mode,
    buf: [u8; MAX_BURST_LEN],
    len: usize,
    deferred: Option<BusError>,
}

impl<B: I2cBus> DisplayEncoder<B> {
    /// Create an encoder for the expander at `address`.
    ///
    /// Nothing is written until [`initialize`](Self::initialize) is called.
    pub fn new(bus: B, address: u8) -> Self {
        Self {
            bus,
            address,
            mode: Mode::COMMAND_WRITE,
            buf: [0; MAX_BURST_LEN],
            len: 0,
            deferred: None,
        }
    }

    /// Configure the port expander and bring the display into 4-bit mode,
    /// cleared, cursor home.
    pub fn initialize(&mut self) -> Result<()> {
        let address = self.address;
        self.bus.write_register(address, register::IODIR, 0x00)?;
        self.bus.write_register(address, register::GPPU, 0xFF)?;
        self.bus
            .write_register(address, register::IOCON, control::IOCON_NO_INCREMENT)?;

        for word in FOUR_BIT_BRINGUP {
            self.clock_out(word);
        }
        self.flush()?;

        self.send_command(instruction::DISPLAY_ON);
        self.clear();
        self.home();
        self.flush()?;

        tracing::info!("Display initialized at I2C address {:#04x}", address);
        Ok(())
    }

    /// Queue an instruction byte.
    pub fn send_command(&mut self, byte: u8) {
        self.send(Mode::COMMAND_WRITE, byte);
    }

    /// Queue a character byte.
    pub fn send_data(&mut self, byte: u8) {
        self.send(Mode::DATA_WRITE, byte);
    }

    /// Clear the display.
    pub fn clear(&mut self) {
        self.send_command(instruction::CLEAR);
    }

    /// Return the cursor home.
    pub fn home(&mut self) {
        self.send_command(instruction::HOME);
    }

    /// Move the cursor to a DDRAM address.
    pub fn set_address(&mut self, address: u8) {
        self.send_command(instruction::SET_DDRAM_ADDRESS | (address & 0x7F));
    }

    /// Print bytes through the code page.
    pub fn echo(&mut self, text: &[u8]) {
        for &byte in text {
            self.send_data(CODE_PAGE[byte as usize]);
        }
    }

    /// Queue the bus words for one decoded command.
    pub fn apply(&mut self, command: &Command) {
        match command {
            Command::SetAddress(address) => self.set_address(*address),
            Command::Clear => self.clear(),
            Command::Home => self.home(),
            Command::Echo(text) => self.echo(text),
        }
    }

    /// Deliver buffered words as one burst. No-op on an empty buffer.
    ///
    /// The buffer is emptied even when the write fails; the burst is lost.
    /// A failed implicit flush since the last call is reported here in
    /// preference to the result of this write.
    pub fn flush(&mut self) -> Result<()> {
        let written = self.write_burst();
        match self.deferred.take() {
            Some(err) => Err(err),
            None => written,
        }
    }

    /// Last mode used.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Words waiting for the next flush.
    pub fn pending(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Device address of the port expander.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// The underlying bus.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Mutable access to the underlying bus.
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    fn write_burst(&mut self) -> Result<()> {
        if self.len == 0 {
            return Ok(());
        }

        let len = std::mem::take(&mut self.len);
        tracing::trace!(words = len, "Flushing display burst");
        self.bus
            .write_burst(self.address, register::GPIO, &self.buf[..len])
    }

    fn flush_implicit(&mut self) {
        if let Err(err) = self.write_burst() {
            tracing::debug!(error = %err, "Implicit flush failed, burst dropped");
            self.deferred.get_or_insert(err);
        }
    }

    fn send(&mut self, mode: Mode, byte: u8) {
        // Keep each burst in a single mode
        if mode != self.mode {
            self.flush_implicit();
        }
        self.mode = mode;

        let bits = mode.bits();
        let (hi, lo) = split_nibbles(byte);
        self.clock_out(bits | (hi << 3));
        self.clock_out(bits | (lo << 3));
    }

    fn clock_out(&mut self, word: u8) {
        self.push(word | control::CLOCK);
        self.push(word);
    }

    fn push(&mut self, word: u8) {
        if self.len == MAX_BURST_LEN {
            self.flush_implicit();
        }
        self.buf[self.len] = word;
        self.len += 1;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{RecordingBus, Write};
    use super::*;

    fn encoder() -> DisplayEncoder<RecordingBus> {
        DisplayEncoder::new(RecordingBus::default(), DEFAULT_DEVICE_ADDRESS)
    }

    /// Expected words for one byte in the given mode.
    fn words(mode: Mode, byte: u8) -> Vec<u8> {
        let bits = mode.bits();
        let (hi, lo) = split_nibbles(byte);
        let hi = bits | (hi << 3);
        let lo = bits | (lo << 3);
        vec![hi | control::CLOCK, hi, lo | control::CLOCK, lo]
    }

    #[test]
    fn test_nibble_split_roundtrip() {
        for byte in 0..=255u8 {
            let (hi, lo) = split_nibbles(byte);
            assert!(hi <= 0x0F && lo <= 0x0F);
            assert_eq!((hi << 4) | lo, byte);
        }
    }

    #[test]
    fn test_words_are_seven_bit() {
        let mut enc = encoder();
        for byte in 0..=255u8 {
            enc.send_data(byte);
            assert!(enc.pending().iter().all(|w| w & 0x80 == 0));
            enc.flush().unwrap();
        }
    }

    #[test]
    fn test_mode_bits() {
        assert_eq!(Mode::COMMAND_WRITE.bits(), 0x00);
        assert_eq!(Mode::DATA_WRITE.bits(), 0x01);
        let read = Mode {
            register: Register::Data,
            direction: Direction::Read,
        };
        assert_eq!(read.bits(), 0x03);
    }

    #[test]
    fn test_clear_emits_four_words() {
        let mut enc = encoder();
        enc.clear();
        assert_eq!(enc.pending(), [0x04, 0x00, 0x0C, 0x08]);
        enc.flush().unwrap();

        assert_eq!(
            enc.bus().writes,
            vec![Write::Burst {
                address: 0x20,
                register: register::GPIO,
                words: vec![0x04, 0x00, 0x0C, 0x08],
            }]
        );
        assert!(enc.pending().is_empty());
    }

    #[test]
    fn test_home_and_set_address() {
        let mut enc = encoder();
        enc.home();
        assert_eq!(enc.pending(), words(Mode::COMMAND_WRITE, 0x02).as_slice());
        enc.flush().unwrap();

        enc.set_address(0x41);
        assert_eq!(enc.pending(), words(Mode::COMMAND_WRITE, 0xC1).as_slice());
    }

    #[test]
    fn test_set_address_masks_high_bit() {
        let mut enc = encoder();
        enc.set_address(0xFF);
        assert_eq!(enc.pending(), words(Mode::COMMAND_WRITE, 0xFF).as_slice());

        let mut enc = encoder();
        enc.set_address(0x80);
        assert_eq!(enc.pending(), words(Mode::COMMAND_WRITE, 0x80).as_slice());
    }

    #[test]
    fn test_echo_maps_through_code_page() {
        let mut enc = encoder();
        enc.echo(b"hi");

        let mut expected = words(Mode::DATA_WRITE, CODE_PAGE[b'h' as usize]);
        expected.extend(words(Mode::DATA_WRITE, CODE_PAGE[b'i' as usize]));
        assert_eq!(enc.pending(), expected.as_slice());
        assert_eq!(enc.mode(), Mode::DATA_WRITE);
    }

    #[test]
    fn test_flush_empty_is_noop() {
        let mut enc = encoder();
        enc.flush().unwrap();
        enc.flush().unwrap();
        assert!(enc.bus().writes.is_empty());
    }

    #[test]
    fn test_flush_writes_all_words_in_order() {
        let mut enc = encoder();
        enc.echo(b"abc");
        let queued = enc.pending().to_vec();
        assert_eq!(queued.len(), 12);

        enc.flush().unwrap();
        assert_eq!(enc.bus().bursts(), vec![queued]);
        assert!(enc.pending().is_empty());
    }

    #[test]
    fn test_full_buffer_flushes_implicitly() {
        let mut enc = encoder();
        // Nine characters need 36 words; the first 32 go out on their own
        enc.echo(b"123456789");
        assert_eq!(enc.bus().bursts().len(), 1);
        assert_eq!(enc.bus().bursts()[0].len(), MAX_BURST_LEN);
        assert_eq!(enc.pending().len(), 4);

        enc.flush().unwrap();
        let bursts = enc.bus().bursts();
        assert_eq!(bursts.len(), 2);
        let all: Vec<u8> = bursts.concat();
        let mut expected = Vec::new();
        for b in b"123456789" {
            expected.extend(words(Mode::DATA_WRITE, *b));
        }
        assert_eq!(all, expected);
    }

    #[test]
    fn test_mode_switch_never_mixes_burst() {
        let mut enc = encoder();
        enc.echo(b"x");
        enc.clear();
        enc.flush().unwrap();

        let bursts = enc.bus().bursts();
        assert_eq!(bursts.len(), 2);
        assert!(bursts[0].iter().all(|w| w & 0x01 == 0x01));
        assert!(bursts[1].iter().all(|w| w & 0x01 == 0x00));
        assert_eq!(enc.mode(), Mode::COMMAND_WRITE);
    }

    #[test]
    fn test_mode_latches_immediately() {
        let mut enc = encoder();
        assert_eq!(enc.mode(), Mode::COMMAND_WRITE);
        enc.send_data(b'a');
        assert_eq!(enc.mode(), Mode::DATA_WRITE);
        enc.send_command(instruction::HOME);
        assert_eq!(enc.mode(), Mode::COMMAND_WRITE);
    }

    #[test]
    fn test_initialize_sequence() {
        let mut enc = encoder();
        enc.initialize().unwrap();
        let writes = &enc.bus().writes;

        assert_eq!(
            writes[..3],
            [
                Write::Register { address: 0x20, register: register::IODIR, value: 0x00 },
                Write::Register { address: 0x20, register: register::GPPU, value: 0xFF },
                Write::Register { address: 0x20, register: register::IOCON, value: 0x20 },
            ]
        );

        let bursts = enc.bus().bursts();
        assert_eq!(bursts.len(), 2);
        assert_eq!(
            bursts[0],
            vec![0x1C, 0x18, 0x1C, 0x18, 0x1C, 0x18, 0x14, 0x10]
        );

        let mut expected = words(Mode::COMMAND_WRITE, instruction::DISPLAY_ON);
        expected.extend(words(Mode::COMMAND_WRITE, instruction::CLEAR));
        expected.extend(words(Mode::COMMAND_WRITE, instruction::HOME));
        assert_eq!(bursts[1], expected);
        assert!(enc.pending().is_empty());
    }

    #[test]
    fn test_initialize_propagates_bus_failure() {
        let mut enc = DisplayEncoder::new(
            RecordingBus {
                fail: true,
                ..Default::default()
            },
            0x21,
        );
        assert!(enc.initialize().is_err());
    }

    #[test]
    fn test_failed_flush_clears_buffer() {
        let mut enc = encoder();
        enc.echo(b"ok");
        enc.bus_mut().fail = true;

        assert!(enc.flush().is_err());
        assert!(enc.pending().is_empty());

        // The encoder keeps working once the bus recovers
        enc.bus_mut().fail = false;
        enc.home();
        enc.flush().unwrap();
        assert_eq!(enc.bus().bursts().len(), 1);
    }

    #[test]
    fn test_failed_implicit_flush_keeps_rest_of_line() {
        let mut enc = encoder();
        enc.bus_mut().reject_bursts = 1;

        // The first 32 words are rejected; '9' still reaches the bus
        enc.apply(&Command::Echo(b"123456789".to_vec()));
        assert_eq!(enc.pending().len(), 4);

        let err = enc.flush().unwrap_err();
        assert!(matches!(err, BusError::Write { address: 0x20, .. }));
        assert_eq!(enc.bus().bursts(), vec![words(Mode::DATA_WRITE, b'9')]);

        // Reported once only
        enc.home();
        enc.flush().unwrap();
        assert_eq!(enc.bus().bursts().len(), 2);
    }

    #[test]
    fn test_failed_mode_switch_flush_is_reported() {
        let mut enc = encoder();
        enc.echo(b"x");
        enc.bus_mut().reject_bursts = 1;

        enc.clear();
        assert_eq!(enc.pending(), [0x04, 0x00, 0x0C, 0x08]);
        assert!(enc.flush().is_err());
        assert_eq!(enc.bus().bursts(), vec![vec![0x04, 0x00, 0x0C, 0x08]]);
    }

    #[test]
    fn test_apply_matches_direct_calls() {
        let mut applied = encoder();
        applied.apply(&Command::SetAddress(0x41));
        applied.apply(&Command::Echo(b"hello".to_vec()));
        applied.flush().unwrap();

        let mut direct = encoder();
        direct.set_address(0x41);
        direct.echo(b"hello");
        direct.flush().unwrap();

        assert_eq!(applied.bus().writes, direct.bus().writes);
    }

    #[test]
    fn test_boxed_bus() {
        let bus: Box<RecordingBus> = Box::default();
        let mut enc = DisplayEncoder::new(bus, 0x20);
        enc.home();
        enc.flush().unwrap();
        assert_eq!(enc.bus().bursts().len(), 1);
    }
}
