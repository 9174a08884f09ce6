//! Delta binary packing for 32- and 64-bit integers.
//!
//! ```text
//! page   := header block*
//! header := VLQ(block_size) VLQ(miniblocks_per_block) VLQ(total_values) ZigZagVLQ(first_value)
//! block  := ZigZagVLQ(min_delta) <1 byte bit width per miniblock> <miniblocks>
//! ```
//!
//! Each miniblock stores `delta - min_delta` for its values, bit-packed at
//! the miniblock's width and padded with zeros to a full miniblock. Trailing
//! miniblocks of the last block that hold no values have no body.
//!
//! Deltas are computed with wrapping arithmetic in the width of the value
//! type, so every 32-bit delta fits in 32 bits.

use super::{Decoder, Encoder, EncodingKind, ensure_initialized};
use crate::{
    buffers_pool::{BufferPoolRef, BuffersPool},
    types::PhysicalType,
};
use bytes::Bytes;
use colpage_bits::{BitReader, BitWriter, MAX_VLQ_BYTE_LEN, num_required_bits};
use colpage_bytes::ByteBuffer;
use colpage_common::{Result, error::Error, verify_data};
use std::{fmt::Debug, marker::PhantomData};

pub const BLOCK_SIZE: usize = 128;
pub const MINIBLOCKS_PER_BLOCK: usize = 4;
pub const VALUES_PER_MINIBLOCK: usize = BLOCK_SIZE / MINIBLOCKS_PER_BLOCK;

/// Upper bound of the header size: two single-byte VLQs and two full ones.
const MAX_HEADER_SIZE: usize = 2 + 2 * MAX_VLQ_BYTE_LEN;

/// Integer types the delta codec operates on.
pub trait DeltaInteger: Copy + Ord + Default + Debug + Send + Sync + 'static {
    const BITS: u32;

    fn wrapping_add(self, rhs: Self) -> Self;

    fn wrapping_sub(self, rhs: Self) -> Self;

    /// Two's complement bits, zero-extended to 64 bits.
    fn to_raw(self) -> u64;

    /// Keeps the low `BITS` bits of `raw`.
    fn from_raw(raw: u64) -> Self;

    fn to_i64(self) -> i64;

    /// Converts `value`, failing when it does not fit.
    fn try_from_i64(value: i64) -> Option<Self>;
}

macro_rules! impl_delta_integer {
    ($T:ty, $U:ty) => {
        impl DeltaInteger for $T {
            const BITS: u32 = <$T>::BITS;

            #[inline]
            fn wrapping_add(self, rhs: Self) -> Self {
                <$T>::wrapping_add(self, rhs)
            }

            #[inline]
            fn wrapping_sub(self, rhs: Self) -> Self {
                <$T>::wrapping_sub(self, rhs)
            }

            #[inline]
            fn to_raw(self) -> u64 {
                self as $U as u64
            }

            #[inline]
            fn from_raw(raw: u64) -> Self {
                raw as $U as $T
            }

            #[inline]
            fn to_i64(self) -> i64 {
                self as i64
            }

            #[inline]
            fn try_from_i64(value: i64) -> Option<Self> {
                <$T>::try_from(value).ok()
            }
        }
    };
}

impl_delta_integer!(i32, u32);
impl_delta_integer!(i64, u64);

pub struct DeltaBitPackEncoder<T: PhysicalType>
where
    T::Value: DeltaInteger,
{
    /// Encoded blocks; the header is only known once the page is complete.
    bit_writer: BitWriter<BufferPoolRef<'static>>,
    total_values: usize,
    first_value: T::Value,
    current_value: T::Value,
    deltas: [T::Value; BLOCK_SIZE],
    values_in_block: usize,
    _marker: PhantomData<T>,
}

impl<T> DeltaBitPackEncoder<T>
where
    T: PhysicalType,
    T::Value: DeltaInteger,
{
    pub fn new() -> Self {
        DeltaBitPackEncoder {
            bit_writer: BitWriter::with_buffer(BuffersPool::global().get_buffer()),
            total_values: 0,
            first_value: T::Value::default(),
            current_value: T::Value::default(),
            deltas: [T::Value::default(); BLOCK_SIZE],
            values_in_block: 0,
            _marker: PhantomData,
        }
    }

    /// Appends one integer to the page.
    pub fn put_value(&mut self, value: T::Value) {
        if self.total_values == 0 {
            self.first_value = value;
            self.current_value = value;
            self.total_values = 1;
            return;
        }
        self.deltas[self.values_in_block] = value.wrapping_sub(self.current_value);
        self.current_value = value;
        self.values_in_block += 1;
        self.total_values += 1;
        if self.values_in_block == BLOCK_SIZE {
            self.flush_block_values();
        }
    }

    /// Number of values put since the last flush.
    pub fn num_values(&self) -> usize {
        self.total_values
    }

    fn flush_block_values(&mut self) {
        if self.values_in_block == 0 {
            return;
        }
        let deltas = &self.deltas[..self.values_in_block];
        let min_delta = deltas
            .iter()
            .copied()
            .min()
            .unwrap_or_default();
        self.bit_writer.write_zigzag_vlq_int(min_delta.to_i64());
        let widths_offset = self.bit_writer.skip_bytes(MINIBLOCKS_PER_BLOCK);

        let mut widths = [0u8; MINIBLOCKS_PER_BLOCK];
        for (i, width) in widths.iter_mut().enumerate() {
            let start = i * VALUES_PER_MINIBLOCK;
            if start >= self.values_in_block {
                break;
            }
            let end = (start + VALUES_PER_MINIBLOCK).min(self.values_in_block);
            let miniblock = &self.deltas[start..end];
            let max_delta = miniblock.iter().copied().max().unwrap_or(min_delta);
            let bit_width = num_required_bits(max_delta.wrapping_sub(min_delta).to_raw());
            *width = bit_width as u8;

            for j in 0..VALUES_PER_MINIBLOCK {
                let packed = miniblock
                    .get(j)
                    .map_or(0, |delta| delta.wrapping_sub(min_delta).to_raw());
                self.bit_writer.write_value(packed, bit_width);
            }
        }
        self.bit_writer.flush();
        self.bit_writer.write_at(widths_offset, &widths);
        self.values_in_block = 0;
    }

    fn write_header(&self, out: &mut BitWriter<ByteBuffer>) {
        out.write_vlq_int(BLOCK_SIZE as u64);
        out.write_vlq_int(MINIBLOCKS_PER_BLOCK as u64);
        out.write_vlq_int(self.total_values as u64);
        out.write_zigzag_vlq_int(self.first_value.to_i64());
    }
}

impl<T> Default for DeltaBitPackEncoder<T>
where
    T: PhysicalType,
    T::Value: DeltaInteger,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Encoder<T> for DeltaBitPackEncoder<T>
where
    T: PhysicalType,
    T::Value: DeltaInteger,
{
    fn encoding(&self) -> EncodingKind {
        EncodingKind::DeltaBinaryPacked
    }

    fn put(&mut self, values: &[T::Value]) -> Result<()> {
        for &value in values {
            self.put_value(value);
        }
        Ok(())
    }

    fn estimated_encoded_size(&self) -> usize {
        MAX_HEADER_SIZE
            + self.bit_writer.bytes_written()
            + self.values_in_block * std::mem::size_of::<T::Value>()
    }

    fn flush(&mut self) -> Result<Bytes> {
        self.flush_block_values();
        let blocks = self.bit_writer.buffer();
        let mut page = BitWriter::with_capacity(MAX_HEADER_SIZE + blocks.len());
        self.write_header(&mut page);
        page.write_aligned_bytes(self.bit_writer.buffer());
        self.bit_writer.clear();
        self.total_values = 0;
        self.first_value = T::Value::default();
        self.current_value = T::Value::default();
        Ok(page.consume())
    }
}

#[derive(Clone)]
pub struct DeltaBitPackDecoder<T: PhysicalType>
where
    T::Value: DeltaInteger,
{
    bit_reader: BitReader,
    initialized: bool,
    miniblocks_per_block: usize,
    values_per_miniblock: usize,
    /// Values the page header declares.
    total_values: usize,
    values_left: usize,
    /// Whether the caller asked for every value the header declares.
    reads_whole_page: bool,
    first_value_pending: bool,
    last_value: T::Value,
    min_delta: T::Value,
    miniblock_widths: Bytes,
    miniblock_index: usize,
    miniblock_bit_width: u32,
    values_left_in_miniblock: usize,
    _marker: PhantomData<T>,
}

impl<T> DeltaBitPackDecoder<T>
where
    T: PhysicalType,
    T::Value: DeltaInteger,
{
    pub fn new() -> Self {
        DeltaBitPackDecoder {
            bit_reader: BitReader::default(),
            initialized: false,
            miniblocks_per_block: 0,
            values_per_miniblock: 0,
            total_values: 0,
            values_left: 0,
            reads_whole_page: false,
            first_value_pending: false,
            last_value: T::Value::default(),
            min_delta: T::Value::default(),
            miniblock_widths: Bytes::new(),
            miniblock_index: 0,
            miniblock_bit_width: 0,
            values_left_in_miniblock: 0,
            _marker: PhantomData,
        }
    }

    /// Number of values declared by the header of the current page.
    pub fn total_values(&self) -> usize {
        self.total_values
    }

    /// Number of bytes of the page consumed so far. Once every value of the
    /// page has been decoded this is the size of the encoded stream.
    pub fn bytes_consumed(&self) -> usize {
        self.bit_reader.byte_offset()
    }

    fn read_vlq(&mut self, element: &str) -> Result<u64> {
        let available = self.bit_reader.bytes_left();
        self.bit_reader
            .get_vlq_int()
            .ok_or_else(|| Error::truncated(element, 1, available))
    }

    fn read_value(&mut self, element: &str) -> Result<T::Value> {
        let available = self.bit_reader.bytes_left();
        let value = self
            .bit_reader
            .get_zigzag_vlq_int()
            .ok_or_else(|| Error::truncated(element, 1, available))?;
        T::Value::try_from_i64(value).ok_or_else(|| {
            Error::invalid_value(element, format!("{value} does not fit in {} bits", T::Value::BITS))
        })
    }

    fn next_block(&mut self) -> Result<()> {
        self.min_delta = self.read_value("delta min_delta")?;
        let available = self.bit_reader.bytes_left();
        self.miniblock_widths = self
            .bit_reader
            .get_aligned_bytes(self.miniblocks_per_block)
            .ok_or_else(|| {
                Error::truncated("delta miniblock widths", self.miniblocks_per_block, available)
            })?;
        self.miniblock_index = 0;
        Ok(())
    }

    fn next_miniblock(&mut self) -> Result<()> {
        if self.miniblock_index + 1 >= self.miniblocks_per_block || self.miniblock_widths.is_empty() {
            self.next_block()?;
        } else {
            self.miniblock_index += 1;
        }
        let width = self.miniblock_widths[self.miniblock_index] as u32;
        if width > T::Value::BITS {
            return Err(Error::invalid_value(
                "delta miniblock bit width",
                format!("{width} exceeds {} bits", T::Value::BITS),
            ));
        }
        self.miniblock_bit_width = width;
        self.values_left_in_miniblock = self.values_per_miniblock;
        Ok(())
    }

    /// Moves to the end of the values this decoder would still produce
    /// without materializing them, validating block headers and widths on
    /// the way. Afterwards [`Self::bytes_consumed`] is the end of those
    /// values and the decoder has no values left.
    pub fn skip_page(&mut self) -> Result<()> {
        ensure_initialized(self.initialized, "skip_page")?;
        let mut remaining = self.values_left;
        if remaining > 0 && self.first_value_pending {
            self.first_value_pending = false;
            remaining -= 1;
        }
        while remaining > 0 {
            if self.values_left_in_miniblock == 0 {
                self.next_miniblock()?;
            }
            let n = remaining.min(self.values_left_in_miniblock);
            if !self.bit_reader.skip_values(self.miniblock_bit_width, n) {
                return Err(Error::truncated(
                    "delta miniblock",
                    (self.miniblock_bit_width as usize)
                        .saturating_mul(n)
                        .div_ceil(8),
                    self.bit_reader.bytes_left(),
                ));
            }
            remaining -= n;
            self.values_left_in_miniblock -= n;
        }
        self.values_left = 0;
        if self.reads_whole_page {
            self.finish_page();
        }
        Ok(())
    }

    /// Moves past the padding of the last miniblock once the page is done.
    fn finish_page(&mut self) {
        if self.values_left_in_miniblock > 0 {
            self.bit_reader
                .skip_values(self.miniblock_bit_width, self.values_left_in_miniblock);
            self.values_left_in_miniblock = 0;
        }
        let unused_widths = self
            .miniblock_widths
            .get(self.miniblock_index + 1..)
            .unwrap_or_default();
        if unused_widths.iter().any(|&w| w != 0) {
            log::warn!("delta page has non-zero bit widths {unused_widths:?} for unused miniblocks");
        }
    }
}

impl<T> Default for DeltaBitPackDecoder<T>
where
    T: PhysicalType,
    T::Value: DeltaInteger,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Decoder<T> for DeltaBitPackDecoder<T>
where
    T: PhysicalType,
    T::Value: DeltaInteger,
{
    fn encoding(&self) -> EncodingKind {
        EncodingKind::DeltaBinaryPacked
    }

    fn set_data(&mut self, num_values: usize, data: Bytes) -> Result<()> {
        self.bit_reader.reset(data);
        self.initialized = false;

        let block_size = usize::try_from(self.read_vlq("delta block size")?)?;
        let miniblocks = usize::try_from(self.read_vlq("delta miniblock count")?)?;
        let total_values = usize::try_from(self.read_vlq("delta value count")?)?;
        let first_value = self.read_value("delta first value")?;

        verify_data!(block_size, block_size > 0 && block_size % 128 == 0);
        verify_data!(miniblocks, miniblocks > 0 && block_size % miniblocks == 0);
        let values_per_miniblock = block_size / miniblocks;
        verify_data!(values_per_miniblock, values_per_miniblock % 32 == 0);
        log::trace!(
            "delta page: block_size={block_size}, miniblocks={miniblocks}, total_values={total_values}"
        );

        self.miniblocks_per_block = miniblocks;
        self.values_per_miniblock = values_per_miniblock;
        self.total_values = total_values;
        self.values_left = num_values.min(total_values);
        self.reads_whole_page = num_values >= total_values;
        self.first_value_pending = true;
        self.last_value = first_value;
        self.min_delta = T::Value::default();
        self.miniblock_widths = Bytes::new();
        self.miniblock_index = 0;
        self.miniblock_bit_width = 0;
        self.values_left_in_miniblock = 0;
        self.initialized = true;
        Ok(())
    }

    fn decode(&mut self, out: &mut [T::Value]) -> Result<usize> {
        ensure_initialized(self.initialized, "decode")?;
        let count = out.len().min(self.values_left);
        if count == 0 {
            return Ok(0);
        }

        let mut read = 0;
        if self.first_value_pending {
            out[0] = self.last_value;
            self.first_value_pending = false;
            read = 1;
        }
        while read < count {
            if self.values_left_in_miniblock == 0 {
                self.next_miniblock()?;
            }
            let n = (count - read).min(self.values_left_in_miniblock);
            for slot in out[read..read + n].iter_mut() {
                let available = self.bit_reader.bytes_left();
                let packed = self
                    .bit_reader
                    .get_value(self.miniblock_bit_width)
                    .ok_or_else(|| {
                        Error::truncated(
                            "delta miniblock",
                            self.miniblock_bit_width.div_ceil(8) as usize,
                            available,
                        )
                    })?;
                let delta = T::Value::from_raw(packed).wrapping_add(self.min_delta);
                self.last_value = self.last_value.wrapping_add(delta);
                *slot = self.last_value;
            }
            read += n;
            self.values_left_in_miniblock -= n;
        }

        self.values_left -= count;
        if self.values_left == 0 && self.reads_whole_page {
            self.finish_page();
        }
        Ok(count)
    }

    fn values_left(&self) -> usize {
        self.values_left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Int32Type, Int64Type};
    use colpage_common::error::ErrorKind;

    fn encode<T>(values: &[T::Value]) -> Bytes
    where
        T: PhysicalType,
        T::Value: DeltaInteger,
    {
        let mut encoder = DeltaBitPackEncoder::<T>::new();
        encoder.put(values).unwrap();
        encoder.flush().unwrap()
    }

    fn round_trip<T>(values: &[T::Value])
    where
        T: PhysicalType,
        T::Value: DeltaInteger,
    {
        let page = encode::<T>(values);
        let mut decoder = DeltaBitPackDecoder::<T>::new();
        decoder.set_data(values.len(), page.clone()).unwrap();
        let mut out = vec![T::Value::default(); values.len() + 3];
        assert_eq!(decoder.decode(&mut out).unwrap(), values.len());
        assert_eq!(&out[..values.len()], values);
        assert_eq!(decoder.values_left(), 0);
        assert_eq!(decoder.bytes_consumed(), page.len());
    }

    #[test]
    fn test_small_sequence_layout() {
        let page = encode::<Int32Type>(&[1, 2, 3, 4]);
        // header: 128, 4 miniblocks, 4 values, first value 1;
        // block: min delta 1, all widths zero, no miniblock bodies.
        assert_eq!(&page[..], &[0x80, 0x01, 4, 4, 2, 2, 0, 0, 0, 0]);

        let mut decoder = DeltaBitPackDecoder::<Int32Type>::new();
        decoder.set_data(4, page).unwrap();
        let mut out = [0; 4];
        assert_eq!(decoder.decode(&mut out).unwrap(), 4);
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_empty_and_single() {
        let page = encode::<Int64Type>(&[]);
        assert_eq!(&page[..], &[0x80, 0x01, 4, 0, 0]);
        round_trip::<Int64Type>(&[]);
        round_trip::<Int64Type>(&[-7]);
        round_trip::<Int32Type>(&[i32::MIN]);
    }

    #[test]
    fn test_constant_step_has_zero_widths() {
        for step in [0i64, 1, -3, 1000] {
            let values: Vec<i64> = (0..1000).map(|i| 17 + i * step).collect();
            let page = encode::<Int64Type>(&values);
            let mut reader = BitReader::new(page);
            assert_eq!(reader.get_vlq_int(), Some(128));
            assert_eq!(reader.get_vlq_int(), Some(4));
            assert_eq!(reader.get_vlq_int(), Some(1000));
            assert_eq!(reader.get_zigzag_vlq_int(), Some(17));
            // 999 deltas fill 7 full blocks and one partial block.
            for _ in 0..8 {
                assert_eq!(reader.get_zigzag_vlq_int(), Some(step));
                assert_eq!(&reader.get_aligned_bytes(4).unwrap()[..], &[0, 0, 0, 0]);
            }
            assert_eq!(reader.bytes_left(), 0);
            round_trip::<Int64Type>(&values);
        }
    }

    #[test]
    fn test_extremes_wrap() {
        let values = [i32::MAX, i32::MIN, i32::MAX, 0, i32::MIN, -1, 1];
        round_trip::<Int32Type>(&values);
        let values = [i64::MIN, i64::MAX, i64::MIN, 0, i64::MAX];
        round_trip::<Int64Type>(&values);
    }

    #[test]
    fn test_random_round_trip() {
        for len in [2usize, 33, 127, 128, 129, 1000, 4097] {
            let values: Vec<i32> = (0..len).map(|_| fastrand::i32(..)).collect();
            round_trip::<Int32Type>(&values);
            let values: Vec<i64> = (0..len).map(|_| fastrand::i64(-1000..1000)).collect();
            round_trip::<Int64Type>(&values);
        }
    }

    #[test]
    fn test_partial_reads_and_discard() {
        let values: Vec<i64> = (0..700).map(|i| (i * i) % 97 - 40).collect();
        let page = encode::<Int64Type>(&values);
        let mut decoder = DeltaBitPackDecoder::<Int64Type>::new();
        decoder.set_data(values.len(), page).unwrap();
        let mut out = vec![0i64; 50];
        assert_eq!(decoder.decode(&mut out).unwrap(), 50);
        assert_eq!(&out[..], &values[..50]);
        assert_eq!(decoder.discard(333).unwrap(), 333);
        let mut rest = vec![0i64; 400];
        assert_eq!(decoder.decode(&mut rest).unwrap(), 317);
        assert_eq!(&rest[..317], &values[383..]);
    }

    #[test]
    fn test_fewer_values_than_header() {
        let page = encode::<Int32Type>(&[5, 6, 7, 8, 9]);
        let mut decoder = DeltaBitPackDecoder::<Int32Type>::new();
        decoder.set_data(3, page.clone()).unwrap();
        assert_eq!(decoder.values_left(), 3);
        assert_eq!(decoder.total_values(), 5);
        decoder.set_data(10, page).unwrap();
        assert_eq!(decoder.values_left(), 5);
    }

    #[test]
    fn test_corrupt_headers() {
        let mut decoder = DeltaBitPackDecoder::<Int32Type>::new();
        // block size not a multiple of 128
        let err = decoder
            .set_data(1, Bytes::from_static(&[100, 4, 1, 2]))
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidValue { .. }));
        // miniblock count does not divide the block
        let err = decoder
            .set_data(1, Bytes::from_static(&[0x80, 0x01, 3, 1, 2]))
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidValue { .. }));
        // first value out of the 32-bit range
        let err = decoder
            .set_data(1, Bytes::from_static(&[0x80, 0x01, 4, 1, 0xff, 0xff, 0xff, 0xff, 0x1f]))
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidValue { .. }));
        // truncated header
        let err = decoder.set_data(1, Bytes::from_static(&[0x80])).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Truncated { .. }));
        assert!(decoder.decode(&mut [0; 1]).is_err());
    }

    #[test]
    fn test_skip_page_finds_stream_end() {
        let values: Vec<i32> = (0..300).map(|i| (i * 37) % 1000 - 500).collect();
        let mut page = encode::<Int32Type>(&values).to_vec();
        let end = page.len();
        page.extend_from_slice(b"trailing");

        let mut decoder = DeltaBitPackDecoder::<Int32Type>::new();
        decoder.set_data(usize::MAX, Bytes::from(page)).unwrap();
        let mut scan = decoder.clone();
        scan.skip_page().unwrap();
        assert_eq!(scan.bytes_consumed(), end);
        assert_eq!(scan.values_left(), 0);

        let mut out = vec![0; 300];
        assert_eq!(decoder.decode(&mut out).unwrap(), 300);
        assert_eq!(out, values);
    }

    #[test]
    fn test_skip_page_rejects_unbacked_value_count() {
        // block size 2^40, 4 miniblocks, 2^41 values, one block of zero widths
        let page = Bytes::from_static(&[
            0x80, 0x80, 0x80, 0x80, 0x80, 0x20, 4, 0x80, 0x80, 0x80, 0x80, 0x80, 0x40, 0, 0, 0, 0,
            0, 0,
        ]);
        let mut decoder = DeltaBitPackDecoder::<Int64Type>::new();
        decoder.set_data(usize::MAX, page).unwrap();
        assert_eq!(decoder.values_left(), 1 << 41);
        let err = decoder.skip_page().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Truncated { .. }));
    }

    #[test]
    fn test_oversized_miniblock_width() {
        // two values, min delta 0, first miniblock width 33
        let page = Bytes::from_static(&[0x80, 0x01, 4, 2, 0, 0, 33, 0, 0, 0]);
        let mut decoder = DeltaBitPackDecoder::<Int32Type>::new();
        decoder.set_data(2, page).unwrap();
        let mut out = [0; 2];
        let err = decoder.decode(&mut out).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidValue { .. }));
    }
}
