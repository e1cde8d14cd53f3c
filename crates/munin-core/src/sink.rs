//! Character sink handed to plugins.
//!
//! Plugins produce output one byte at a time through [`PluginOutput`]. The
//! connection side of the sink is a small [`CharBuffer`] that flushes on fill
//! or newline, so buffering and overflow are enforced in one place no matter
//! how a plugin behaves.

use std::fmt;

/// Usable bytes in the per-connection output buffer.
///
/// Sized for typical metric-line fragments; a full buffer is flushed
/// immediately.
pub const OUTPUT_BUFFER_CAPACITY: usize = 9;

/// Returns `true` for printable ASCII (32..=126).
#[inline]
pub(crate) fn is_printable(byte: u8) -> bool {
    (32..=126).contains(&byte)
}

// =============================================================================
// CharSink
// =============================================================================

/// Something that accepts plugin output one byte at a time.
pub trait CharSink {
    /// Accepts a single output byte.
    fn put_char(&mut self, c: u8);
}

/// Raw capture, handy for exercising plugins without a connection.
impl CharSink for Vec<u8> {
    fn put_char(&mut self, c: u8) {
        self.push(c);
    }
}

// =============================================================================
// PluginOutput
// =============================================================================

/// The only handle a plugin gets for writing output.
///
/// It is borrowed for the duration of a single `write_config`/`write_values`
/// call and cannot be retained.
///
/// ```rust,ignore
/// fn write_values(&self, out: &mut PluginOutput<'_>) -> PluginResult<()> {
///     writeln!(out, "temp.value {}", self.read_celsius()?)?;
///     Ok(())
/// }
/// ```
pub struct PluginOutput<'a> {
    sink: &'a mut dyn CharSink,
}

impl<'a> PluginOutput<'a> {
    /// Wraps a character sink.
    pub fn new(sink: &'a mut dyn CharSink) -> Self {
        Self { sink }
    }

    /// Writes one byte.
    #[inline]
    pub fn put_char(&mut self, c: u8) {
        self.sink.put_char(c);
    }

    /// Writes every byte of `s`, in order.
    pub fn put_str(&mut self, s: &str) {
        for byte in s.bytes() {
            self.sink.put_char(byte);
        }
    }
}

impl fmt::Write for PluginOutput<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.put_str(s);
        Ok(())
    }
}

// =============================================================================
// CharBuffer
// =============================================================================

/// What the caller must do after pushing a byte into a [`CharBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Push {
    /// Nothing to send yet.
    Buffered,
    /// The buffer reached capacity and must be flushed.
    Full,
    /// A newline arrived: flush any buffered text, then send `\n`.
    Newline,
}

/// Fixed-capacity accumulator for plugin output.
#[derive(Debug)]
pub(crate) struct CharBuffer {
    buf: [u8; OUTPUT_BUFFER_CAPACITY],
    len: usize,
}

impl CharBuffer {
    pub(crate) fn new() -> Self {
        Self {
            buf: [0; OUTPUT_BUFFER_CAPACITY],
            len: 0,
        }
    }

    /// Accepts one byte. Non-printable bytes other than `\n` are dropped.
    pub(crate) fn push(&mut self, c: u8) -> Push {
        // A full buffer that was never flushed is reset, not overrun.
        if self.len == OUTPUT_BUFFER_CAPACITY {
            self.len = 0;
        }
        if is_printable(c) {
            self.buf[self.len] = c;
            self.len += 1;
        }

        if self.len == OUTPUT_BUFFER_CAPACITY {
            Push::Full
        } else if c == b'\n' {
            Push::Newline
        } else {
            Push::Buffered
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }
}
