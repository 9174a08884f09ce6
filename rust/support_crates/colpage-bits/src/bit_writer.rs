use std::borrow::{Borrow, BorrowMut};

use colpage_bytes::ByteBuffer;

use crate::{MAX_VLQ_BYTE_LEN, zigzag_encode};

/// Writes unsigned integers of arbitrary bit width, LSB-first, into a byte buffer.
///
/// Values are accumulated in a 64-bit word and spilled to the buffer whenever
/// the word fills up. Byte-aligned writes (VLQ integers, raw byte runs,
/// reserved header slots) first flush the partially filled word, padding it
/// with zero bits to the next byte boundary.
///
/// The sink is anything that can lend out a [`ByteBuffer`]: an owned buffer
/// or a guard checked out from a buffer pool.
#[derive(Debug, Default)]
pub struct BitWriter<B = ByteBuffer> {
    buffer: B,
    buffered_values: u64,
    bit_offset: u32,
}

impl BitWriter<ByteBuffer> {
    pub fn new() -> Self {
        Self::with_buffer(ByteBuffer::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_buffer(ByteBuffer::with_capacity(capacity))
    }
}

impl<B> BitWriter<B>
where
    B: BorrowMut<ByteBuffer>,
{
    /// Creates a writer appending to `buffer` after its current contents.
    pub fn with_buffer(buffer: B) -> Self {
        BitWriter {
            buffer,
            buffered_values: 0,
            bit_offset: 0,
        }
    }

    /// Writes the low `num_bits` bits of `value`.
    ///
    /// `num_bits` must not exceed 64 and `value` must fit into `num_bits` bits.
    #[inline]
    pub fn write_value(&mut self, value: u64, num_bits: u32) {
        debug_assert!(num_bits <= 64);
        debug_assert!(num_bits == 64 || value >> num_bits == 0);
        if num_bits == 0 {
            return;
        }

        self.buffered_values |= value << self.bit_offset;
        self.bit_offset += num_bits;

        if self.bit_offset >= 64 {
            let word = self.buffered_values.to_le_bytes();
            self.sink().extend_from_slice(&word);
            self.bit_offset -= 64;
            self.buffered_values = if self.bit_offset == 0 {
                0
            } else {
                value >> (num_bits - self.bit_offset)
            };
        }
    }

    /// Writes the lowest `num_bytes` bytes of `value` little-endian, starting
    /// at the next byte boundary.
    pub fn write_aligned_value(&mut self, value: u64, num_bytes: usize) {
        debug_assert!(num_bytes <= 8);
        self.flush();
        self.sink().extend_from_slice(&value.to_le_bytes()[..num_bytes]);
    }

    /// Appends a run of raw bytes at the next byte boundary.
    pub fn write_aligned_bytes(&mut self, bytes: &[u8]) {
        self.flush();
        self.sink().extend_from_slice(bytes);
    }

    /// Writes an unsigned integer 7 bits at a time, least significant group
    /// first, with the high bit of each byte flagging a continuation.
    pub fn write_vlq_int(&mut self, mut value: u64) {
        self.flush();
        let mut encoded = [0u8; MAX_VLQ_BYTE_LEN];
        let mut len = 0;
        while value >= 0x80 {
            encoded[len] = (value as u8 & 0x7f) | 0x80;
            value >>= 7;
            len += 1;
        }
        encoded[len] = value as u8;
        self.sink().extend_from_slice(&encoded[..len + 1]);
    }

    /// Writes a signed integer as a zig-zag mapped VLQ integer.
    pub fn write_zigzag_vlq_int(&mut self, value: i64) {
        self.write_vlq_int(zigzag_encode(value));
    }

    /// Reserves `n` zeroed bytes at the next byte boundary and returns their
    /// offset, so they can be patched with [`BitWriter::write_at`].
    pub fn skip_bytes(&mut self, n: usize) -> usize {
        self.flush();
        self.sink().reserve_zeroed(n)
    }

    /// Overwrites bytes previously reserved with [`BitWriter::skip_bytes`].
    /// The write position is not affected.
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) {
        self.sink().write_at(offset, bytes);
    }

    /// Spills pending bits to the buffer, padding to a byte boundary.
    pub fn flush(&mut self) {
        if self.bit_offset == 0 {
            return;
        }
        let num_bytes = self.bit_offset.div_ceil(8) as usize;
        let word = self.buffered_values.to_le_bytes();
        self.sink().extend_from_slice(&word[..num_bytes]);
        self.buffered_values = 0;
        self.bit_offset = 0;
    }

    /// Number of bytes written so far, counting a partially filled trailing byte.
    pub fn bytes_written(&self) -> usize {
        let buffer: &ByteBuffer = self.buffer.borrow();
        buffer.len() + self.bit_offset.div_ceil(8) as usize
    }

    /// Flushes pending bits and returns the written bytes.
    pub fn buffer(&mut self) -> &[u8] {
        self.flush();
        self.sink().as_slice()
    }

    /// Flushes pending bits, copies out the written bytes and resets the
    /// writer to empty.
    pub fn consume(&mut self) -> bytes::Bytes {
        self.flush();
        self.sink().take_bytes()
    }

    /// Discards everything written so far.
    pub fn clear(&mut self) {
        self.sink().clear();
        self.buffered_values = 0;
        self.bit_offset = 0;
    }

    #[inline]
    fn sink(&mut self) -> &mut ByteBuffer {
        self.buffer.borrow_mut()
    }

    /// Flushes pending bits and returns the underlying sink.
    pub fn into_inner(mut self) -> B {
        self.flush();
        self.buffer
    }
}
