//! Line framing for client input.
//!
//! # Buffer Discipline
//!
//! Each client owns a fixed receive buffer of [`RECEIVE_CAPACITY`] bytes, of
//! which at most [`MAX_BUFFERED`] are ever occupied. Bytes are appended as
//! they arrive; every `CR LF` found closes a line, and whatever follows the
//! terminator moves to the front of the buffer so several pipelined lines
//! can arrive in one read.
//!
//! A client that fills the buffer without sending a terminator loses the
//! buffered bytes: the buffer is reset and appending starts over. Memory
//! never grows past the fixed capacity.

/// Size of the per-client receive buffer.
pub const RECEIVE_CAPACITY: usize = 256;

/// Largest number of bytes held at once. One slot of the buffer stays free.
pub const MAX_BUFFERED: usize = RECEIVE_CAPACITY - 1;

/// Line terminator on the wire.
pub const LINE_TERMINATOR: [u8; 2] = *b"\r\n";

/// Accumulates partial reads and yields complete lines.
#[derive(Clone)]
pub struct LineBuffer {
    buf: [u8; RECEIVE_CAPACITY],
    len: usize,
    overflows: u64,
}

impl LineBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            buf: [0; RECEIVE_CAPACITY],
            len: 0,
            overflows: 0,
        }
    }

    /// Number of bytes waiting for a terminator.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no partial line is buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The buffered partial line.
    #[inline]
    pub fn pending(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// How many times buffered bytes were discarded because no terminator
    /// arrived before the buffer filled up.
    #[inline]
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    /// Drop any buffered bytes.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Append received bytes and return every line they complete, in order.
    ///
    /// Lines are returned without their terminator. An empty result means no
    /// line is complete yet. The outcome does not depend on how the stream
    /// was split into reads.
    pub fn feed(&mut self, mut bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();

        while !bytes.is_empty() {
            let take = (MAX_BUFFERED - self.len).min(bytes.len());
            // A CR may already sit at the end of the buffer
            let scan_from = self.len.saturating_sub(1);

            self.buf[self.len..self.len + take].copy_from_slice(&bytes[..take]);
            self.len += take;
            bytes = &bytes[take..];

            self.extract_lines(scan_from, &mut lines);

            if self.len == MAX_BUFFERED {
                tracing::trace!(discarded = self.len, "Receive buffer overflow");
                self.len = 0;
                self.overflows += 1;
            }
        }

        lines
    }

    fn extract_lines(&mut self, scan_from: usize, lines: &mut Vec<Vec<u8>>) {
        let mut start = 0;
        let mut search = scan_from;

        while let Some(pos) = find_terminator(&self.buf[search..self.len]) {
            let end = search + pos;
            lines.push(self.buf[start..end].to_vec());
            start = end + LINE_TERMINATOR.len();
            search = start;
        }

        if start > 0 {
            self.buf.copy_within(start..self.len, 0);
            self.len -= start;
        }
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LineBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineBuffer")
            .field("len", &self.len)
            .field("overflows", &self.overflows)
            .finish()
    }
}

fn find_terminator(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(LINE_TERMINATOR.len())
        .position(|w| w == LINE_TERMINATOR)
}
