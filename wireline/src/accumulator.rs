//! Per-connection read buffer.
//!
//! Adapters always see a contiguous `&[u8]` and report the number of bytes
//! consumed. Unconsumed bytes are retained via O(1) `advance()` instead of
//! shifting, so consumed bytes are never parsed twice.

use bytes::{Buf, BytesMut};

pub struct RecvAccumulator {
    buf: BytesMut,
}

impl RecvAccumulator {
    /// Create a new accumulator with the given initial capacity.
    pub fn new(capacity: usize) -> Self {
        RecvAccumulator {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Append received bytes. Grows the buffer if necessary.
    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Get a reference to the accumulated data.
    pub fn data(&self) -> &[u8] {
        &self.buf[..]
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Consume `n` bytes from the front.
    pub fn consume(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        debug_assert!(n <= self.buf.len(), "consume({n}) exceeds buffer length {}", self.buf.len());
        let n = n.min(self.buf.len());
        self.buf.advance(n);
    }

    /// Discard all buffered data.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}
