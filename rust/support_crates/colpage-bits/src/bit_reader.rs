use bytes::Bytes;
use num_traits::AsPrimitive;

use crate::{MAX_VLQ_BYTE_LEN, zigzag_decode};

/// Reads LSB-first packed unsigned integers, byte-aligned runs and VLQ
/// integers from a shared byte buffer.
///
/// Every read returns `None` when the buffer does not hold enough bits, in
/// which case the read position is left unchanged.
#[derive(Debug, Clone, Default)]
pub struct BitReader {
    data: Bytes,
    /// Absolute read position, in bits.
    bit_pos: usize,
}

impl BitReader {
    pub fn new(data: Bytes) -> Self {
        BitReader { data, bit_pos: 0 }
    }

    /// Rebinds the reader to a new buffer.
    pub fn reset(&mut self, data: Bytes) {
        self.data = data;
        self.bit_pos = 0;
    }

    /// Offset of the first byte that has not been touched by a read.
    #[inline]
    pub fn byte_offset(&self) -> usize {
        self.bit_pos.div_ceil(8)
    }

    /// Number of whole bytes remaining after [`BitReader::byte_offset`].
    #[inline]
    pub fn bytes_left(&self) -> usize {
        self.data.len() - self.byte_offset()
    }

    #[inline]
    fn bits_left(&self) -> usize {
        self.data.len() * 8 - self.bit_pos
    }

    /// Reads a `num_bits` wide unsigned integer (`num_bits <= 64`).
    #[inline]
    pub fn get_value(&mut self, num_bits: u32) -> Option<u64> {
        if num_bits > 64 || num_bits as usize > self.bits_left() {
            return None;
        }
        if num_bits == 0 {
            return Some(0);
        }
        let byte = self.bit_pos / 8;
        let shift = (self.bit_pos % 8) as u32;
        let mut value = self.load_word(byte) >> shift;
        if shift + num_bits > 64 {
            value |= (self.data[byte + 8] as u64) << (64 - shift);
        }
        if num_bits < 64 {
            value &= (1u64 << num_bits) - 1;
        }
        self.bit_pos += num_bits as usize;
        Some(value)
    }

    /// Reads up to `out.len()` values of `num_bits` each; returns the number read.
    pub fn get_batch<T>(&mut self, num_bits: u32, out: &mut [T]) -> usize
    where
        T: Copy + 'static,
        u64: AsPrimitive<T>,
    {
        if num_bits > 64 {
            return 0;
        }
        let available = if num_bits == 0 {
            out.len()
        } else {
            self.bits_left() / num_bits as usize
        };
        let count = out.len().min(available);
        for slot in out[..count].iter_mut() {
            // Bounds were checked above.
            *slot = self.get_value(num_bits).unwrap_or_default().as_();
        }
        count
    }

    /// Advances past `count` values of `num_bits` each without decoding them.
    pub fn skip_values(&mut self, num_bits: u32, count: usize) -> bool {
        let Some(bits) = (num_bits as usize).checked_mul(count) else {
            return false;
        };
        if bits > self.bits_left() {
            return false;
        }
        self.bit_pos += bits;
        true
    }

    /// Moves the read position to the next byte boundary.
    #[inline]
    pub fn align_to_byte(&mut self) {
        self.bit_pos = self.byte_offset() * 8;
    }

    /// Reads a `num_bytes` wide little-endian integer starting at the next byte boundary.
    pub fn get_aligned(&mut self, num_bytes: usize) -> Option<u64> {
        if num_bytes > 8 || num_bytes > self.bytes_left() {
            return None;
        }
        let start = self.byte_offset();
        let mut word = [0u8; 8];
        word[..num_bytes].copy_from_slice(&self.data[start..start + num_bytes]);
        self.bit_pos = (start + num_bytes) * 8;
        Some(u64::from_le_bytes(word))
    }

    /// Returns the next `n` bytes, starting at the next byte boundary, as a shared view.
    pub fn get_aligned_bytes(&mut self, n: usize) -> Option<Bytes> {
        if n > self.bytes_left() {
            return None;
        }
        let start = self.byte_offset();
        self.bit_pos = (start + n) * 8;
        Some(self.data.slice(start..start + n))
    }

    /// Reads a VLQ-encoded unsigned integer starting at the next byte boundary.
    pub fn get_vlq_int(&mut self) -> Option<u64> {
        let start = self.byte_offset();
        let mut value = 0u64;
        for (i, &byte) in self.data[start..].iter().take(MAX_VLQ_BYTE_LEN).enumerate() {
            let group = (byte & 0x7f) as u64;
            let shift = 7 * i as u32;
            if shift == 63 && group > 1 {
                return None;
            }
            value |= group << shift;
            if byte & 0x80 == 0 {
                self.bit_pos = (start + i + 1) * 8;
                return Some(value);
            }
        }
        None
    }

    /// Reads a zig-zag VLQ integer.
    pub fn get_zigzag_vlq_int(&mut self) -> Option<i64> {
        self.get_vlq_int().map(zigzag_decode)
    }

    /// Loads up to eight bytes starting at `byte`, zero-padding past the end.
    #[inline]
    fn load_word(&self, byte: usize) -> u64 {
        let end = (byte + 8).min(self.data.len());
        let mut word = [0u8; 8];
        word[..end - byte].copy_from_slice(&self.data[byte..end]);
        u64::from_le_bytes(word)
    }
}

#[cfg(test)]
mod tests {
    use super::BitReader;
    use crate::BitWriter;
    use bytes::Bytes;

    #[test]
    fn test_read_values() {
        let mut reader = BitReader::new(Bytes::from_static(&[0b1010_1010, 0b101]));
        for i in 0..8u64 {
            assert_eq!(reader.get_value(1), Some(i % 2));
        }
        assert_eq!(reader.get_value(3), Some(0b101));
        assert_eq!(reader.get_value(5), Some(0));
        assert_eq!(reader.get_value(1), None);
    }

    #[test]
    fn test_mixed_width_round_trip() {
        let mut values = Vec::new();
        let mut writer = BitWriter::new();
        for _ in 0..1000 {
            let width = fastrand::u32(0..=64);
            let value = if width == 64 {
                fastrand::u64(..)
            } else {
                fastrand::u64(..) & ((1u64 << width) - 1)
            };
            writer.write_value(value, width);
            values.push((value, width));
        }
        let mut reader = BitReader::new(writer.consume());
        for (value, width) in values {
            assert_eq!(reader.get_value(width), Some(value));
        }
    }

    #[test]
    fn test_get_batch() {
        let mut writer = BitWriter::new();
        for i in 0..100u64 {
            writer.write_value(i % 8, 3);
        }
        let mut reader = BitReader::new(writer.consume());
        let mut out = vec![0u32; 128];
        let read = reader.get_batch(3, &mut out);
        // 100 values occupy 300 bits, padded to 304: one more value fits.
        assert_eq!(read, 101);
        for (i, v) in out[..100].iter().enumerate() {
            assert_eq!(*v as usize, i % 8);
        }
    }

    #[test]
    fn test_vlq_and_aligned() {
        let mut writer = BitWriter::new();
        writer.write_vlq_int(300);
        writer.write_zigzag_vlq_int(-12345);
        writer.write_value(1, 1);
        writer.write_aligned_value(0xabcdef, 3);
        writer.write_aligned_bytes(b"tail");
        let mut reader = BitReader::new(writer.consume());
        assert_eq!(reader.get_vlq_int(), Some(300));
        assert_eq!(reader.get_zigzag_vlq_int(), Some(-12345));
        assert_eq!(reader.get_value(1), Some(1));
        assert_eq!(reader.get_aligned(3), Some(0xabcdef));
        assert_eq!(&reader.get_aligned_bytes(4).unwrap()[..], b"tail");
        assert_eq!(reader.bytes_left(), 0);
    }

    #[test]
    fn test_vlq_extremes() {
        let mut writer = BitWriter::new();
        writer.write_vlq_int(u64::MAX);
        writer.write_zigzag_vlq_int(i64::MIN);
        let mut reader = BitReader::new(writer.consume());
        assert_eq!(reader.get_vlq_int(), Some(u64::MAX));
        assert_eq!(reader.get_zigzag_vlq_int(), Some(i64::MIN));
    }

    #[test]
    fn test_truncated_vlq() {
        let mut reader = BitReader::new(Bytes::from_static(&[0x80, 0x80]));
        assert_eq!(reader.get_vlq_int(), None);
        assert_eq!(reader.byte_offset(), 0);

        let overlong = Bytes::from_static(&[0xff; 11]);
        let mut reader = BitReader::new(overlong);
        assert_eq!(reader.get_vlq_int(), None);
    }

    #[test]
    fn test_skip_values() {
        let mut writer = BitWriter::new();
        for i in 0..16u64 {
            writer.write_value(i, 4);
        }
        let mut reader = BitReader::new(writer.consume());
        assert!(reader.skip_values(4, 10));
        assert_eq!(reader.get_value(4), Some(10));
        assert!(!reader.skip_values(4, 6));
        assert_eq!(reader.get_value(4), Some(11));
    }

    #[test]
    fn test_rejects_oversized_width() {
        let mut reader = BitReader::new(Bytes::from_static(&[0xff; 16]));
        assert_eq!(reader.get_value(65), None);
        assert_eq!(reader.get_value(64), Some(u64::MAX));
    }
}
