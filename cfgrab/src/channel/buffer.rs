//! Read buffer with a bounded sliding window.
//!
//! Only the last `search_depth` bytes of unconsumed output are retained for
//! pattern matching. Older bytes are evicted from the front and handed to
//! the caller (which either captures or discards them), so memory stays
//! O(search_depth) no matter how long a configuration dump runs.

use bytes::{Bytes, BytesMut};

/// Unconsumed terminal output awaiting a pattern match.
#[derive(Debug)]
pub struct ReadBuffer {
    /// Bytes read but not yet consumed by a match or eviction.
    buffer: BytesMut,

    /// How many bytes are kept for searching.
    search_depth: usize,
}

impl ReadBuffer {
    /// Create a buffer that keeps at most `search_depth` bytes after eviction.
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(search_depth * 2),
            search_depth,
        }
    }

    /// Append newly read bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// The bytes currently available for matching.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Remove and return everything that no longer fits the window.
    ///
    /// Returns `None` when the buffer is within `search_depth`.
    pub fn evict(&mut self) -> Option<Bytes> {
        if self.buffer.len() <= self.search_depth {
            return None;
        }
        let excess = self.buffer.len() - self.search_depth;
        Some(self.buffer.split_to(excess).freeze())
    }

    /// Consume a matched region: returns the bytes before `start`, drops
    /// `start..end`, and keeps everything after `end`.
    pub fn consume(&mut self, start: usize, end: usize) -> Bytes {
        let before = self.buffer.split_to(start).freeze();
        let _ = self.buffer.split_to(end - start);
        before
    }

    /// Remove and return all buffered bytes.
    pub fn take(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    /// Last `n` bytes of the buffer.
    pub fn tail(&self, n: usize) -> &[u8] {
        let start = self.buffer.len().saturating_sub(n);
        &self.buffer[start..]
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Get the search depth setting.
    pub fn search_depth(&self) -> usize {
        self.search_depth
    }
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_extend() {
        let mut buffer = ReadBuffer::new(100);
        buffer.extend(b"Hello, ");
        buffer.extend(b"world!");
        assert_eq!(buffer.as_slice(), b"Hello, world!");
        assert!(buffer.evict().is_none());
    }

    #[test]
    fn test_evict_keeps_window() {
        let mut buffer = ReadBuffer::new(10);
        buffer.extend(&[b'x'; 25]);
        buffer.extend(b"router#");

        let evicted = buffer.evict().unwrap();
        assert_eq!(evicted.len(), 22);
        assert_eq!(buffer.len(), 10);
        assert!(buffer.as_slice().ends_with(b"router#"));
    }

    #[test]
    fn test_consume_drops_match() {
        let mut buffer = ReadBuffer::new(100);
        buffer.extend(b"line1\nr1#\r\nleftover");

        let before = buffer.consume(6, 9);
        assert_eq!(&before[..], b"line1\n");
        assert_eq!(buffer.as_slice(), b"\r\nleftover");
    }

    #[test]
    fn test_tail_and_take() {
        let mut buffer = ReadBuffer::new(100);
        buffer.extend(b"abcdef");
        assert_eq!(buffer.tail(3), b"def");
        assert_eq!(buffer.tail(50), b"abcdef");
        assert_eq!(&buffer.take()[..], b"abcdef");
        assert!(buffer.is_empty());
    }
}
