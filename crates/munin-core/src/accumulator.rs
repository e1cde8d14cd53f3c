//! Line accumulation for inbound command bytes.
//!
//! Bytes arrive in arbitrary fragments. The accumulator keeps printable ASCII
//! in a fixed buffer and yields one trimmed line per `\n`. Control bytes
//! (including `\r`) are dropped.
//!
//! # Overflow policy
//!
//! A printable byte arriving at a full buffer discards the line being
//! collected. Everything up to and including the next `\n` is dropped too,
//! so no fragment of an overlong line is ever dispatched.

use crate::sink::is_printable;

/// Capacity of the command buffer: the longest command plus a plugin name.
pub const COMMAND_BUFFER_CAPACITY: usize = 50;

/// Fixed-capacity command line buffer.
#[derive(Debug)]
pub struct CommandAccumulator {
    buf: [u8; COMMAND_BUFFER_CAPACITY],
    len: usize,
    overflowed: bool,
}

impl CommandAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self {
            buf: [0; COMMAND_BUFFER_CAPACITY],
            len: 0,
            overflowed: false,
        }
    }

    /// Feeds one inbound byte.
    ///
    /// Returns the completed line, trailing spaces removed, when `byte` is a
    /// newline. The returned line may be empty.
    pub fn feed(&mut self, byte: u8) -> Option<&str> {
        if byte == b'\n' {
            let len = std::mem::take(&mut self.len);
            if std::mem::take(&mut self.overflowed) {
                return None;
            }
            let line = trim_trailing_spaces(&self.buf[..len]);
            // Only printable ASCII is ever stored, so this cannot fail.
            return std::str::from_utf8(line).ok();
        }

        if !is_printable(byte) || self.overflowed {
            return None;
        }

        if self.len == COMMAND_BUFFER_CAPACITY {
            tracing::debug!(
                capacity = COMMAND_BUFFER_CAPACITY,
                "Command line overflow, discarding"
            );
            self.len = 0;
            self.overflowed = true;
            return None;
        }

        self.buf[self.len] = byte;
        self.len += 1;
        None
    }

    /// Number of bytes collected for the current line.
    pub fn pending_len(&self) -> usize {
        self.len
    }

    /// Forgets any partially collected line.
    pub fn reset(&mut self) {
        self.len = 0;
        self.overflowed = false;
    }
}

impl Default for CommandAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_trailing_spaces(line: &[u8]) -> &[u8] {
    let end = line.iter().rposition(|&b| b != b' ').map_or(0, |i| i + 1);
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feeds `input` and collects every dispatched line.
    fn lines(acc: &mut CommandAccumulator, input: &[u8]) -> Vec<String> {
        input
            .iter()
            .filter_map(|&b| acc.feed(b).map(str::to_owned))
            .collect()
    }

    #[test]
    fn test_no_dispatch_without_newline() {
        let mut acc = CommandAccumulator::new();
        assert!(lines(&mut acc, b"version").is_empty());
        assert_eq!(acc.pending_len(), 7);
        assert_eq!(lines(&mut acc, b"\n"), vec!["version"]);
        assert_eq!(acc.pending_len(), 0);
    }

    #[test]
    fn test_fragments_are_joined() {
        let mut acc = CommandAccumulator::new();
        assert!(lines(&mut acc, b"fet").is_empty());
        assert!(lines(&mut acc, b"ch te").is_empty());
        assert_eq!(lines(&mut acc, b"mp\nlist\n"), vec!["fetch temp", "list"]);
    }

    #[test]
    fn test_control_bytes_filtered_and_crlf_accepted() {
        let mut acc = CommandAccumulator::new();
        assert_eq!(lines(&mut acc, b"ve\x01rs\tion\r\n"), vec!["version"]);
    }

    #[test]
    fn test_trailing_spaces_trimmed_leading_kept() {
        let mut acc = CommandAccumulator::new();
        assert_eq!(lines(&mut acc, b" list   \n"), vec![" list"]);
        assert_eq!(lines(&mut acc, b"config \n"), vec!["config"]);
    }

    #[test]
    fn test_blank_lines_dispatch_empty() {
        let mut acc = CommandAccumulator::new();
        assert_eq!(lines(&mut acc, b"\n    \n"), vec!["", ""]);
    }

    #[test]
    fn test_exactly_full_line_dispatches() {
        let mut acc = CommandAccumulator::new();
        let mut input = vec![b'a'; COMMAND_BUFFER_CAPACITY];
        input.push(b'\n');
        let got = lines(&mut acc, &input);
        assert_eq!(got, vec!["a".repeat(COMMAND_BUFFER_CAPACITY)]);
    }

    #[test]
    fn test_overflow_drops_whole_line_then_recovers() {
        let mut acc = CommandAccumulator::new();
        let mut input = vec![b'a'; COMMAND_BUFFER_CAPACITY + 20];
        assert!(lines(&mut acc, &input).is_empty());

        input.clear();
        input.extend_from_slice(b"\nversion\n");
        assert_eq!(lines(&mut acc, &input), vec!["version"]);
    }

    #[test]
    fn test_reset_forgets_partial_line() {
        let mut acc = CommandAccumulator::new();
        lines(&mut acc, b"garbage");
        acc.reset();
        assert_eq!(lines(&mut acc, b"nodes\n"), vec!["nodes"]);
    }
}
