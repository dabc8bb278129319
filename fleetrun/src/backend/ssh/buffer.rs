//! Session output buffer with tail-only prompt search.
//!
//! Only the last `search_depth` bytes are searched for the prompt, which
//! keeps prompt detection cheap for large outputs such as full routing
//! tables. Terminal escape sequences are stripped on the way in; the parser
//! state persists between chunks so sequences split across reads are still
//! removed.

use std::fmt;

use bytes::{BufMut, BytesMut};
use regex::bytes::Regex;
use vte::{Parser, Perform};

/// Accumulates device output and searches its tail for patterns.
pub(crate) struct PatternBuffer {
    buffer: BytesMut,
    search_depth: usize,
    parser: Parser,
}

impl PatternBuffer {
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            search_depth,
            parser: Parser::new(),
        }
    }

    /// Append raw bytes, dropping escape sequences and control characters
    /// other than newline, carriage return and tab.
    pub fn extend(&mut self, data: &[u8]) {
        let mut sink = PlainText {
            out: &mut self.buffer,
        };
        self.parser.advance(&mut sink, data);
    }

    /// Search only the last `search_depth` bytes.
    pub fn search_tail(&self, pattern: &Regex) -> Option<regex::bytes::Match<'_>> {
        let start = self.buffer.len().saturating_sub(self.search_depth);
        pattern.find(&self.buffer[start..])
    }

    /// Whether the tail matches.
    pub fn tail_contains(&self, pattern: &Regex) -> bool {
        self.search_tail(pattern).is_some()
    }

    /// Take the contents and reset.
    pub fn take(&mut self) -> Vec<u8> {
        self.buffer.split().to_vec()
    }

    #[cfg(test)]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }
}

impl fmt::Debug for PatternBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternBuffer")
            .field("len", &self.buffer.len())
            .field("search_depth", &self.search_depth)
            .finish()
    }
}

/// `vte` performer that keeps printable text only.
struct PlainText<'a> {
    out: &'a mut BytesMut,
}

impl Perform for PlainText<'_> {
    fn print(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.out.put_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.out.put_u8(byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> Regex {
        Regex::new(r"(?m)^r1[>#]\s?$").unwrap()
    }

    #[test]
    fn test_plain_output_kept() {
        let mut buf = PatternBuffer::new(64);
        buf.extend(b"show clock\r\n*10:00:00 UTC\tMon\r\n");
        assert_eq!(buf.as_slice(), b"show clock\r\n*10:00:00 UTC\tMon\r\n");
    }

    #[test]
    fn test_colour_and_bell_removed() {
        let mut buf = PatternBuffer::new(64);
        buf.extend(b"\x1b[1;31mdown\x1b[m\x07\r\nr1#");
        assert_eq!(buf.as_slice(), b"down\r\nr1#");
        assert!(buf.tail_contains(&prompt()));
    }

    #[test]
    fn test_sequence_split_between_reads() {
        let mut buf = PatternBuffer::new(64);
        buf.extend(b"Gi0/1 up\x1b[");
        buf.extend(b"0Kr1#");
        assert_eq!(buf.as_slice(), b"Gi0/1 upr1#");
    }

    #[test]
    fn test_only_tail_is_searched() {
        let mut buf = PatternBuffer::new(16);
        buf.extend(b"r1#\n");
        buf.extend(&[b'.'; 64]);
        assert!(!buf.tail_contains(&prompt()));

        buf.extend(b"\nr1# ");
        assert!(buf.tail_contains(&prompt()));
    }

    #[test]
    fn test_take_resets() {
        let mut buf = PatternBuffer::new(64);
        buf.extend(b"r1>");
        assert_eq!(buf.take(), b"r1>".to_vec());
        assert_eq!(buf.len(), 0);
        assert!(!buf.tail_contains(&prompt()));
    }
}
