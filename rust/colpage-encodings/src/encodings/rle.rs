//! Run-length / bit-packing hybrid, shared by boolean values, dictionary
//! indices and definition/repetition levels.
//!
//! ```text
//! stream          := run*
//! run             := bit-packed-run | rle-run
//! bit-packed-run  := VLQ((groups << 1) | 1) <groups * 8 values, bit-packed LSB first>
//! rle-run         := VLQ(count << 1) <value, ceil(bit_width / 8) bytes little endian>
//! ```
//!
//! The value width is supplied out-of-band by the owner of the stream.

use colpage_bits::{BitReader, BitWriter, MAX_VLQ_BYTE_LEN};
use colpage_bytes::{ByteBuffer, align::bytes_for_bits};
use colpage_common::{Result, error::Error, verify_arg};
use num_traits::AsPrimitive;
use std::borrow::BorrowMut;

/// Longest bit-packed run the encoder emits, in groups of 8 values. Keeps
/// the indicator of a bit-packed run within a single reserved byte.
const MAX_GROUPS_PER_BIT_PACKED_RUN: usize = 1 << 6;
const MAX_VALUES_PER_BIT_PACKED_RUN: usize = MAX_GROUPS_PER_BIT_PACKED_RUN * 8;

/// Values decoded per step when indices are mapped through a dictionary.
const INDEX_BATCH_SIZE: usize = 1024;

/// Encodes a stream of unsigned values of a fixed bit width.
///
/// Values are gathered in groups of 8. A group of 8 identical values starts
/// (or extends) a repeated run; anything else is appended to the current
/// bit-packed run, whose indicator byte is reserved up front and patched
/// once the run is complete.
pub struct RleEncoder<B = ByteBuffer> {
    bit_writer: BitWriter<B>,
    bit_width: u32,
    buffered_values: [u64; 8],
    num_buffered_values: usize,
    current_value: u64,
    repeat_count: usize,
    /// Number of values in the current bit-packed run, a multiple of 8
    /// outside of `flush_buffered_values`.
    bit_packed_count: usize,
    indicator_offset: Option<usize>,
}

impl RleEncoder<ByteBuffer> {
    pub fn new(bit_width: u32) -> Self {
        Self::with_buffer(ByteBuffer::new(), bit_width)
    }
}

impl<B> RleEncoder<B>
where
    B: BorrowMut<ByteBuffer>,
{
    /// Creates an encoder appending to `buffer`.
    pub fn with_buffer(buffer: B, bit_width: u32) -> Self {
        debug_assert!(bit_width <= 64);
        RleEncoder {
            bit_writer: BitWriter::with_buffer(buffer),
            bit_width,
            buffered_values: [0; 8],
            num_buffered_values: 0,
            current_value: 0,
            repeat_count: 0,
            bit_packed_count: 0,
            indicator_offset: None,
        }
    }

    pub fn bit_width(&self) -> u32 {
        self.bit_width
    }

    /// Upper bound of the encoded size of `num_values` values.
    pub fn max_buffer_size(bit_width: u32, num_values: usize) -> usize {
        let num_groups = num_values.div_ceil(8);
        let bit_packed_max_size = num_groups + num_groups * bit_width as usize;
        let rle_max_size = num_groups * (1 + bytes_for_bits(bit_width as usize));
        bit_packed_max_size.max(rle_max_size)
    }

    /// Smallest buffer that can hold the longest single run the encoder emits.
    pub fn min_buffer_size(bit_width: u32) -> usize {
        let max_bit_packed_run_size =
            1 + bytes_for_bits(MAX_VALUES_PER_BIT_PACKED_RUN * bit_width as usize);
        let max_rle_run_size = MAX_VLQ_BYTE_LEN + bytes_for_bits(bit_width as usize);
        max_bit_packed_run_size.max(max_rle_run_size)
    }

    #[inline]
    pub fn put(&mut self, value: u64) {
        if self.current_value == value {
            self.repeat_count += 1;
            if self.repeat_count > 8 {
                // Continuation of a repeated run; nothing to buffer.
                return;
            }
        } else {
            if self.repeat_count >= 8 {
                debug_assert_eq!(self.bit_packed_count, 0);
                self.flush_rle_run();
            }
            self.repeat_count = 1;
            self.current_value = value;
        }

        self.buffered_values[self.num_buffered_values] = value;
        self.num_buffered_values += 1;
        if self.num_buffered_values == 8 {
            debug_assert_eq!(self.bit_packed_count % 8, 0);
            self.flush_buffered_values();
        }
    }

    /// Number of bytes written so far, excluding buffered values.
    pub fn len(&self) -> usize {
        self.bit_writer.bytes_written()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Completes the pending run and returns the encoded stream, leaving the
    /// encoder empty.
    pub fn consume(&mut self) -> bytes::Bytes {
        self.flush();
        self.bit_writer.consume()
    }

    /// Completes the pending run and returns the sink.
    pub fn into_inner(mut self) -> B {
        self.flush();
        self.bit_writer.into_inner()
    }

    /// Writes out all pending values, padding an incomplete bit-packed group
    /// with zeros.
    pub fn flush(&mut self) {
        if self.bit_packed_count == 0 && self.repeat_count == 0 && self.num_buffered_values == 0 {
            return;
        }
        let all_repeat = self.bit_packed_count == 0
            && (self.repeat_count == self.num_buffered_values || self.num_buffered_values == 0);
        if self.repeat_count > 0 && all_repeat {
            self.flush_rle_run();
        } else {
            if self.num_buffered_values > 0 {
                self.buffered_values[self.num_buffered_values..].fill(0);
                self.num_buffered_values = 8;
            }
            self.bit_packed_count += self.num_buffered_values;
            self.flush_bit_packed_run(true);
            self.repeat_count = 0;
        }
    }

    /// Discards everything written and buffered.
    pub fn clear(&mut self) {
        self.bit_writer.clear();
        self.num_buffered_values = 0;
        self.current_value = 0;
        self.repeat_count = 0;
        self.bit_packed_count = 0;
        self.indicator_offset = None;
    }

    fn flush_rle_run(&mut self) {
        debug_assert!(self.repeat_count > 0);
        self.bit_writer.write_vlq_int((self.repeat_count as u64) << 1);
        self.bit_writer
            .write_aligned_value(self.current_value, bytes_for_bits(self.bit_width as usize));
        self.num_buffered_values = 0;
        self.repeat_count = 0;
    }

    fn flush_bit_packed_run(&mut self, update_indicator: bool) {
        let indicator_offset = match self.indicator_offset {
            Some(offset) => offset,
            None => {
                let offset = self.bit_writer.skip_bytes(1);
                self.indicator_offset = Some(offset);
                offset
            }
        };
        for &value in &self.buffered_values[..self.num_buffered_values] {
            self.bit_writer.write_value(value, self.bit_width);
        }
        self.num_buffered_values = 0;
        if update_indicator {
            let num_groups = self.bit_packed_count / 8;
            let indicator = ((num_groups << 1) | 1) as u8;
            // Whole groups end on a byte boundary, so the packed bits before
            // the patched byte are already in the buffer.
            self.bit_writer.flush();
            self.bit_writer.write_at(indicator_offset, &[indicator]);
            self.indicator_offset = None;
            self.bit_packed_count = 0;
        }
    }

    fn flush_buffered_values(&mut self) {
        if self.repeat_count >= 8 {
            self.num_buffered_values = 0;
            if self.bit_packed_count > 0 {
                debug_assert_eq!(self.bit_packed_count % 8, 0);
                self.flush_bit_packed_run(true);
            }
            return;
        }

        self.bit_packed_count += self.num_buffered_values;
        let num_groups = self.bit_packed_count / 8;
        if num_groups + 1 >= MAX_GROUPS_PER_BIT_PACKED_RUN {
            self.flush_bit_packed_run(true);
        } else {
            self.flush_bit_packed_run(false);
        }
        self.repeat_count = 0;
    }
}

/// Decodes a stream produced by [`RleEncoder`].
#[derive(Debug, Clone, Default)]
pub struct RleDecoder {
    bit_reader: BitReader,
    bit_width: u32,
    current_value: u64,
    rle_left: usize,
    bit_packed_left: usize,
}

impl RleDecoder {
    pub fn new(bit_width: u32) -> Result<Self> {
        verify_arg!(bit_width, bit_width <= 64);
        Ok(RleDecoder {
            bit_width,
            ..Default::default()
        })
    }

    pub fn bit_width(&self) -> u32 {
        self.bit_width
    }

    pub fn set_data(&mut self, data: bytes::Bytes) {
        self.bit_reader.reset(data);
        self.rle_left = 0;
        self.bit_packed_left = 0;
    }

    /// Decodes up to `out.len()` values; fewer only at the end of the stream.
    pub fn get_batch<T>(&mut self, out: &mut [T]) -> Result<usize>
    where
        T: Copy + 'static,
        u64: AsPrimitive<T>,
    {
        let mut read = 0;
        while read < out.len() {
            let wanted = out.len() - read;
            if self.rle_left > 0 {
                let n = wanted.min(self.rle_left);
                out[read..read + n].fill(self.current_value.as_());
                self.rle_left -= n;
                read += n;
            } else if self.bit_packed_left > 0 {
                let n = wanted.min(self.bit_packed_left);
                let got = self
                    .bit_reader
                    .get_batch(self.bit_width, &mut out[read..read + n]);
                read += got;
                if got < n {
                    // The final group was cut short by the end of the data.
                    self.bit_packed_left = 0;
                } else {
                    self.bit_packed_left -= got;
                }
            } else if !self.next_counts()? {
                break;
            }
        }
        Ok(read)
    }

    /// Decodes indices and writes `dictionary[index]` for each of them.
    /// An index outside of the dictionary is an error.
    pub fn get_batch_with_dict<V: Clone>(&mut self, dictionary: &[V], out: &mut [V]) -> Result<usize> {
        let mut indices = [0u32; INDEX_BATCH_SIZE];
        let mut read = 0;
        while read < out.len() {
            let batch = (out.len() - read).min(INDEX_BATCH_SIZE);
            let got = self.get_batch(&mut indices[..batch])?;
            for (slot, &index) in out[read..read + got].iter_mut().zip(&indices[..got]) {
                *slot = dictionary
                    .get(index as usize)
                    .ok_or_else(|| {
                        Error::invalid_value(
                            "dictionary index",
                            format!("{index} is out of range for {} entries", dictionary.len()),
                        )
                    })?
                    .clone();
            }
            read += got;
            if got < batch {
                break;
            }
        }
        Ok(read)
    }

    /// Skips up to `num_values` values; returns how many were skipped.
    pub fn skip(&mut self, num_values: usize) -> Result<usize> {
        let mut skipped = 0;
        while skipped < num_values {
            let wanted = num_values - skipped;
            if self.rle_left > 0 {
                let n = wanted.min(self.rle_left);
                self.rle_left -= n;
                skipped += n;
            } else if self.bit_packed_left > 0 {
                let n = wanted.min(self.bit_packed_left);
                if self.bit_reader.skip_values(self.bit_width, n) {
                    self.bit_packed_left -= n;
                    skipped += n;
                } else {
                    while self.bit_reader.get_value(self.bit_width).is_some() {
                        skipped += 1;
                    }
                    self.bit_packed_left = 0;
                }
            } else if !self.next_counts()? {
                break;
            }
        }
        Ok(skipped)
    }

    /// Reads the next run header. Returns `false` at the end of the stream.
    fn next_counts(&mut self) -> Result<bool> {
        if self.bit_reader.bytes_left() == 0 {
            return Ok(false);
        }
        let indicator = self
            .bit_reader
            .get_vlq_int()
            .ok_or_else(|| Error::invalid_value("rle indicator", "malformed VLQ integer"))?;
        let count = usize::try_from(indicator >> 1)?;
        if count == 0 {
            return Err(Error::invalid_value(
                "rle indicator",
                format!("run of zero values (indicator {indicator})"),
            ));
        }
        if indicator & 1 == 1 {
            self.bit_packed_left = count
                .checked_mul(8)
                .ok_or_else(|| Error::overflow("bit-packed run length"))?;
        } else {
            let value_width = bytes_for_bits(self.bit_width as usize);
            let available = self.bit_reader.bytes_left();
            self.current_value = self
                .bit_reader
                .get_aligned(value_width)
                .ok_or_else(|| Error::truncated("rle run value", value_width, available))?;
            self.rle_left = count;
        }
        Ok(true)
    }
}

/// Prepends the 4-byte little-endian length of `data`, the framing used by
/// RLE boolean pages and V1 level streams.
pub(crate) fn with_length_prefix(data: &[u8]) -> Result<bytes::Bytes> {
    let len = i32::try_from(data.len())?;
    let mut framed = ByteBuffer::with_capacity(4 + data.len());
    framed.extend_from_slice(&len.to_le_bytes());
    framed.extend_from_slice(data);
    Ok(framed.take_bytes())
}

/// Splits a length-prefixed stream off the front of `data`. Returns the
/// stream and the total number of bytes it occupies, prefix included.
pub(crate) fn split_length_prefix(data: &bytes::Bytes, element: &str) -> Result<(bytes::Bytes, usize)> {
    if data.len() < 4 {
        return Err(Error::truncated(element, 4, data.len()));
    }
    let len = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let len = usize::try_from(len)
        .map_err(|_| Error::invalid_value(element, format!("negative length {len}")))?;
    let available = data.len() - 4;
    if len > available {
        return Err(Error::truncated(element, len, available));
    }
    Ok((data.slice(4..4 + len), 4 + len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use colpage_common::error::ErrorKind;

    fn round_trip(values: &[u64], bit_width: u32) -> Bytes {
        let mut encoder = RleEncoder::new(bit_width);
        for &v in values {
            encoder.put(v);
        }
        let encoded = encoder.consume();
        assert!(encoded.len() <= RleEncoder::<ByteBuffer>::max_buffer_size(bit_width, values.len()));

        let mut decoder = RleDecoder::new(bit_width).unwrap();
        decoder.set_data(encoded.clone());
        let mut out = vec![0u64; values.len()];
        assert_eq!(decoder.get_batch(&mut out).unwrap(), values.len());
        assert_eq!(out, values);
        encoded
    }

    #[test]
    fn test_repeated_runs_layout() {
        let mut values = vec![0u64; 50];
        values.resize(100, 1);
        for bit_width in [1u32, 8, 9, 20] {
            let encoded = round_trip(&values, bit_width);
            let value_bytes = bytes_for_bits(bit_width as usize);
            let mut expected = vec![100u8];
            expected.extend(std::iter::repeat_n(0u8, value_bytes));
            expected.push(100);
            expected.push(1);
            expected.extend(std::iter::repeat_n(0u8, value_bytes - 1));
            assert_eq!(&encoded[..], &expected[..]);
        }
    }

    #[test]
    fn test_bit_packed_layout() {
        let values: Vec<u64> = (0..100).map(|i| i % 2).collect();
        let encoded = round_trip(&values, 1);
        let mut expected = vec![(13 << 1) | 1];
        expected.extend(std::iter::repeat_n(0b1010_1010u8, 12));
        expected.push(0b0000_1010);
        assert_eq!(&encoded[..], &expected[..]);
    }

    #[test]
    fn test_long_bit_packed_runs_split() {
        let values: Vec<u64> = (0..2000).map(|i| i % 7).collect();
        let encoded = round_trip(&values, 3);
        // First run is capped at 63 groups.
        assert_eq!(encoded[0], (63 << 1) | 1);
    }

    #[test]
    fn test_random_round_trip() {
        for bit_width in [0u32, 1, 2, 5, 8, 13, 32, 33, 64] {
            let max = if bit_width == 64 {
                u64::MAX
            } else {
                (1u64 << bit_width).saturating_sub(1)
            };
            let mut values = Vec::new();
            while values.len() < 3000 {
                let value = if max == 0 { 0 } else { fastrand::u64(0..=max) };
                let run = if fastrand::bool() { fastrand::usize(1..40) } else { 1 };
                values.extend(std::iter::repeat_n(value, run));
            }
            round_trip(&values, bit_width);
        }
    }

    #[test]
    fn test_empty_and_single() {
        let encoded = round_trip(&[], 3);
        assert!(encoded.is_empty());
        let encoded = round_trip(&[5], 3);
        assert_eq!(&encoded[..], &[2, 5]);
    }

    #[test]
    fn test_skip_then_read() {
        let mut values: Vec<u64> = (0..64).map(|i| i % 5).collect();
        values.extend(std::iter::repeat_n(3, 100));
        values.extend((0..37).map(|i| i % 4));
        let mut encoder = RleEncoder::new(3);
        for &v in &values {
            encoder.put(v);
        }
        let mut decoder = RleDecoder::new(3).unwrap();
        decoder.set_data(encoder.consume());
        assert_eq!(decoder.skip(10).unwrap(), 10);
        let mut out = vec![0u8; 100];
        assert_eq!(decoder.get_batch(&mut out).unwrap(), 100);
        for (i, &v) in out.iter().enumerate() {
            assert_eq!(v as u64, values[10 + i]);
        }
        // The final bit-packed group may be padded with zeros.
        let rest = decoder.skip(1000).unwrap();
        assert!(rest >= values.len() - 110 && rest < values.len() - 110 + 8);
    }

    #[test]
    fn test_dictionary_lookup() {
        let dictionary = ["a", "b", "c"];
        let mut encoder = RleEncoder::new(2);
        for i in [0u64, 1, 2, 2, 1, 0] {
            encoder.put(i);
        }
        let mut decoder = RleDecoder::new(2).unwrap();
        decoder.set_data(encoder.consume());
        let mut out = vec![""; 6];
        assert_eq!(decoder.get_batch_with_dict(&dictionary, &mut out).unwrap(), 6);
        assert_eq!(out, ["a", "b", "c", "c", "b", "a"]);

        let mut encoder = RleEncoder::new(2);
        encoder.put(3);
        decoder.set_data(encoder.consume());
        let err = decoder.get_batch_with_dict(&dictionary, &mut out).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidValue { .. }));
    }

    #[test]
    fn test_corrupt_indicators() {
        let mut decoder = RleDecoder::new(8).unwrap();
        let mut out = vec![0u8; 4];

        decoder.set_data(Bytes::from_static(&[0, 1, 2]));
        assert!(matches!(
            decoder.get_batch(&mut out).unwrap_err().kind(),
            ErrorKind::InvalidValue { .. }
        ));

        decoder.set_data(Bytes::from_static(&[0x80, 0x80]));
        assert!(matches!(
            decoder.get_batch(&mut out).unwrap_err().kind(),
            ErrorKind::InvalidValue { .. }
        ));

        let mut decoder = RleDecoder::new(16).unwrap();
        decoder.set_data(Bytes::from_static(&[4, 1]));
        assert!(matches!(
            decoder.get_batch(&mut out).unwrap_err().kind(),
            ErrorKind::Truncated { .. }
        ));

        assert!(RleDecoder::new(65).is_err());
    }

    #[test]
    fn test_length_prefix() {
        let framed = with_length_prefix(b"abc").unwrap();
        assert_eq!(&framed[..], &[3, 0, 0, 0, b'a', b'b', b'c']);
        let (stream, consumed) = split_length_prefix(&framed, "stream").unwrap();
        assert_eq!(&stream[..], b"abc");
        assert_eq!(consumed, 7);

        let short = Bytes::from_static(&[9, 0, 0, 0, 1]);
        assert!(matches!(
            split_length_prefix(&short, "stream").unwrap_err().kind(),
            ErrorKind::Truncated {
                needed: 9,
                available: 1,
                ..
            }
        ));
        let negative = Bytes::from_static(&[0xff, 0xff, 0xff, 0xff]);
        assert!(matches!(
            split_length_prefix(&negative, "stream").unwrap_err().kind(),
            ErrorKind::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_buffer_size_bounds() {
        assert_eq!(RleEncoder::<ByteBuffer>::max_buffer_size(1, 8), 2);
        assert_eq!(RleEncoder::<ByteBuffer>::max_buffer_size(0, 0), 0);
        assert_eq!(RleEncoder::<ByteBuffer>::min_buffer_size(1), 65);
        assert_eq!(RleEncoder::<ByteBuffer>::min_buffer_size(0), 10);
    }
}
