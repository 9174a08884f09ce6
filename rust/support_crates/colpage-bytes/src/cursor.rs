use bytes::{Buf, Bytes};

/// A read cursor over shared immutable bytes.
///
/// A thin layer over [`Buf`] for [`Bytes`] whose reads return `None` on
/// short input instead of panicking. Slices returned by the cursor are
/// zero-copy views into the same allocation, so decoded byte arrays may
/// alias the page buffer.
#[derive(Debug, Clone, Default)]
pub struct ByteCursor {
    buf: Bytes,
}

impl ByteCursor {
    pub fn new(data: Bytes) -> ByteCursor {
        ByteCursor { buf: data }
    }

    /// Rebinds the cursor to a new buffer, starting at its first byte.
    pub fn reset(&mut self, data: Bytes) {
        self.buf = data;
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Consumes `n` bytes and returns them as a shared view, or `None`
    /// if fewer than `n` bytes remain.
    pub fn read_bytes(&mut self, n: usize) -> Option<Bytes> {
        (n <= self.buf.remaining()).then(|| self.buf.copy_to_bytes(n))
    }

    /// Reads a little-endian `i32`.
    pub fn read_i32_le(&mut self) -> Option<i32> {
        (self.buf.remaining() >= 4).then(|| self.buf.get_i32_le())
    }

    /// Advances the cursor by `n` bytes; returns `false` (without moving)
    /// if fewer than `n` bytes remain.
    pub fn skip(&mut self, n: usize) -> bool {
        if n > self.buf.remaining() {
            return false;
        }
        self.buf.advance(n);
        true
    }
}
