//! Bit-level utilities for the colpage codecs.
//!
//! - [`bit_writer::BitWriter`] / [`bit_reader::BitReader`]: LSB-first packing of
//!   arbitrary-width unsigned integers, byte-aligned runs, VLQ and zig-zag VLQ integers.
//! - [`bitmap`]: helpers over caller-owned validity bitmaps (bit access, popcount,
//!   forward and reverse runs of set bits) and boolean bit packing.

pub mod bit_reader;
pub mod bit_writer;
pub mod bitmap;

pub use bit_reader::BitReader;
pub use bit_writer::BitWriter;

/// Maximum number of bytes a VLQ-encoded 64-bit integer can occupy.
pub const MAX_VLQ_BYTE_LEN: usize = 10;

/// Number of bits required to represent `value` (zero for zero).
#[inline]
pub fn num_required_bits(value: u64) -> u32 {
    64 - value.leading_zeros()
}

/// `ceil(log2(n))`, the bit width needed to store indices `0..n`.
/// Returns zero for `n <= 1`.
#[inline]
pub fn log2_ceil(n: u64) -> u32 {
    if n <= 1 {
        0
    } else {
        num_required_bits(n - 1)
    }
}

#[inline]
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[inline]
pub fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}
