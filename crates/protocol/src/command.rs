//! Client command decoding.
//!
//! # Line Format
//!
//! Every command is one line of bytes, `CR LF` already stripped. The first
//! byte selects the operation:
//!
//! | Prefix      | Operation                                   |
//! |-------------|---------------------------------------------|
//! | `A` / `a`   | set DDRAM address, two hex digits follow    |
//! | `C` / `c`   | clear display                               |
//! | `H` / `h`   | return cursor home                          |
//! | `\`         | print the rest of the line verbatim         |
//! | anything    | print the whole line                        |
//!
//! Decoding never fails: the worst case is an [`Command::Echo`] of the raw
//! bytes.

/// One logical display operation decoded from a client line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Move the cursor to a DDRAM address.
    SetAddress(u8),
    /// Clear the display.
    Clear,
    /// Return the cursor to the upper left corner.
    Home,
    /// Print bytes at the cursor position.
    Echo(Vec<u8>),
}

impl Command {
    /// Decode one complete line.
    ///
    /// An `A` line whose next two bytes are not hex digits is printed as
    /// text instead of being dropped, so words such as `Apple` still reach
    /// the display.
    pub fn decode(line: &[u8]) -> Self {
        match line.first() {
            Some(b'A' | b'a') => match parse_hex_byte(&line[1..]) {
                Some(address) => Command::SetAddress(address),
                None => Command::Echo(line.to_vec()),
            },
            Some(b'C' | b'c') => Command::Clear,
            Some(b'H' | b'h') => Command::Home,
            Some(b'\\') => Command::Echo(line[1..].to_vec()),
            _ => Command::Echo(line.to_vec()),
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetAddress(_) => "set_address",
            Command::Clear => "clear",
            Command::Home => "home",
            Command::Echo(_) => "echo",
        }
    }
}

/// Parse exactly two leading hex digits. Trailing bytes are ignored.
fn parse_hex_byte(bytes: &[u8]) -> Option<u8> {
    match bytes {
        [hi, lo, ..] => Some(hex_value(*hi)? << 4 | hex_value(*lo)?),
        _ => None,
    }
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}
