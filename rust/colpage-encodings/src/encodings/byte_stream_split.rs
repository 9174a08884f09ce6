//! Byte stream split: `N` values of `W` bytes each are stored as `W`
//! streams of `N` bytes, stream `s` holding byte `s` of every value.
//! The permutation carries no value semantics.

use super::{
    Decoder, Encoder, EncodingKind, ensure_initialized,
    plain::{PlainValue, plain_type_length},
};
use crate::{
    buffers_pool::{BufferPoolRef, BuffersPool},
    config::EncodingConfig,
    types::PhysicalType,
};
use bytes::{Bytes, BytesMut};
use colpage_bytes::{ByteBuffer, ByteCursor};
use colpage_common::{Result, error::Error, verify_arg};
use std::marker::PhantomData;

#[inline]
fn split_fixed<const W: usize>(src: &[u8], out: &mut [u8]) {
    let num_values = src.len() / W;
    for (i, value) in src.chunks_exact(W).enumerate() {
        for (s, &byte) in value.iter().enumerate() {
            out[s * num_values + i] = byte;
        }
    }
}

#[inline]
fn join_fixed<const W: usize>(src: &[u8], stride: usize, start: usize, out: &mut [u8]) {
    for (i, value) in out.chunks_exact_mut(W).enumerate() {
        for (s, byte) in value.iter_mut().enumerate() {
            *byte = src[s * stride + start + i];
        }
    }
}

/// Transposes `src`, a sequence of `width`-byte values, into `width`
/// byte streams written to `out` (`out.len() == src.len()`).
pub fn split_streams(src: &[u8], width: usize, out: &mut [u8]) {
    debug_assert_eq!(src.len(), out.len());
    debug_assert!(width > 0 && src.len() % width == 0);
    match width {
        2 => split_fixed::<2>(src, out),
        4 => split_fixed::<4>(src, out),
        8 => split_fixed::<8>(src, out),
        _ => {
            let num_values = src.len() / width;
            for (i, value) in src.chunks_exact(width).enumerate() {
                for (s, &byte) in value.iter().enumerate() {
                    out[s * num_values + i] = byte;
                }
            }
        }
    }
}

/// Gathers `out.len() / width` values starting at value `start` from the
/// `width` streams of `src`, each `stride` bytes long.
pub fn join_streams(src: &[u8], width: usize, stride: usize, start: usize, out: &mut [u8]) {
    debug_assert!(width > 0 && out.len() % width == 0);
    debug_assert!(src.len() >= width * stride);
    match width {
        2 => join_fixed::<2>(src, stride, start, out),
        4 => join_fixed::<4>(src, stride, start, out),
        8 => join_fixed::<8>(src, stride, start, out),
        _ => {
            for (i, value) in out.chunks_exact_mut(width).enumerate() {
                for (s, byte) in value.iter_mut().enumerate() {
                    *byte = src[s * stride + start + i];
                }
            }
        }
    }
}

/// Width in bytes of one value of kind `T`.
fn value_width<T: PhysicalType>(config: &EncodingConfig) -> Result<usize> {
    let width = match T::KIND.fixed_width() {
        Some(width) => width,
        None => plain_type_length::<T>(config)?,
    };
    verify_arg!(type_length, width > 0);
    Ok(width)
}

pub struct ByteStreamSplitEncoder<T: PhysicalType> {
    /// Plain-encoded values of the current page.
    buffer: BufferPoolRef<'static>,
    width: usize,
    _marker: PhantomData<T>,
}

impl<T> ByteStreamSplitEncoder<T>
where
    T: PhysicalType,
    T::Value: PlainValue,
{
    pub fn new(config: &EncodingConfig) -> Result<Self> {
        Ok(ByteStreamSplitEncoder {
            buffer: BuffersPool::global().get_buffer(),
            width: value_width::<T>(config)?,
            _marker: PhantomData,
        })
    }
}

impl<T> Encoder<T> for ByteStreamSplitEncoder<T>
where
    T: PhysicalType,
    T::Value: PlainValue,
{
    fn encoding(&self) -> EncodingKind {
        EncodingKind::ByteStreamSplit
    }

    fn put(&mut self, values: &[T::Value]) -> Result<()> {
        T::Value::encode_plain(values, self.width, &mut self.buffer)
    }

    fn estimated_encoded_size(&self) -> usize {
        self.buffer.len()
    }

    fn flush(&mut self) -> Result<Bytes> {
        let mut page = ByteBuffer::zeroed(self.buffer.len());
        split_streams(&self.buffer, self.width, &mut page);
        self.buffer.clear();
        Ok(page.take_bytes())
    }
}

pub struct ByteStreamSplitDecoder<T: PhysicalType> {
    data: Bytes,
    /// Joined values of the current batch; its allocation is reclaimed
    /// once the previous batch's bytes are no longer referenced.
    scratch: BytesMut,
    width: usize,
    /// Number of values in the page, the length of every stream.
    stride: usize,
    /// Index of the next value to decode.
    position: usize,
    num_values: usize,
    initialized: bool,
    _marker: PhantomData<T>,
}

impl<T> ByteStreamSplitDecoder<T>
where
    T: PhysicalType,
    T::Value: PlainValue,
{
    pub fn new(config: &EncodingConfig) -> Result<Self> {
        Ok(ByteStreamSplitDecoder {
            data: Bytes::new(),
            scratch: BytesMut::new(),
            width: value_width::<T>(config)?,
            stride: 0,
            position: 0,
            num_values: 0,
            initialized: false,
            _marker: PhantomData,
        })
    }
}

impl<T> Decoder<T> for ByteStreamSplitDecoder<T>
where
    T: PhysicalType,
    T::Value: PlainValue,
{
    fn encoding(&self) -> EncodingKind {
        EncodingKind::ByteStreamSplit
    }

    fn set_data(&mut self, num_values: usize, data: Bytes) -> Result<()> {
        self.initialized = false;
        if data.len() % self.width != 0 {
            return Err(Error::invalid_value(
                "byte stream split page",
                format!(
                    "{} bytes is not a multiple of the value width {}",
                    data.len(),
                    self.width
                ),
            ));
        }
        self.stride = data.len() / self.width;
        self.num_values = num_values.min(self.stride);
        self.position = 0;
        self.data = data;
        self.initialized = true;
        Ok(())
    }

    fn decode(&mut self, out: &mut [T::Value]) -> Result<usize> {
        ensure_initialized(self.initialized, "decode")?;
        let count = out.len().min(self.num_values);
        self.scratch.clear();
        self.scratch.resize(count * self.width, 0);
        join_streams(&self.data, self.width, self.stride, self.position, &mut self.scratch);
        let mut cursor = ByteCursor::new(self.scratch.split().freeze());
        T::Value::decode_plain(&mut cursor, self.width, &mut out[..count])?;
        self.position += count;
        self.num_values -= count;
        Ok(count)
    }

    fn discard(&mut self, num_values: usize) -> Result<usize> {
        ensure_initialized(self.initialized, "discard")?;
        let count = num_values.min(self.num_values);
        self.position += count;
        self.num_values -= count;
        Ok(count)
    }

    fn values_left(&self) -> usize {
        self.num_values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DoubleType, FixedLenByteArray, FixedLenByteArrayType, FloatType, Int32Type};
    use colpage_common::error::ErrorKind;

    #[test]
    fn test_layout() {
        let mut encoder = ByteStreamSplitEncoder::<Int32Type>::new(&EncodingConfig::default()).unwrap();
        encoder.put(&[0x0403_0201, 0x0807_0605]).unwrap();
        let page = encoder.flush().unwrap();
        assert_eq!(&page[..], &[1, 5, 2, 6, 3, 7, 4, 8]);
    }

    #[test]
    fn test_streams_self_inverse() {
        for width in [2usize, 4, 8, 12, 3] {
            for num_values in [0usize, 1, 17, 256] {
                let src: Vec<u8> = (0..width * num_values).map(|_| fastrand::u8(..)).collect();
                let mut split = vec![0u8; src.len()];
                split_streams(&src, width, &mut split);
                let mut joined = vec![0u8; src.len()];
                join_streams(&split, width, num_values, 0, &mut joined);
                assert_eq!(joined, src);

                if num_values > 2 {
                    let mut tail = vec![0u8; width * (num_values - 2)];
                    join_streams(&split, width, num_values, 2, &mut tail);
                    assert_eq!(&tail[..], &src[2 * width..]);
                }
            }
        }
    }

    #[test]
    fn test_float_round_trip_with_discard() {
        let values: Vec<f32> = (0..100).map(|i| i as f32 * 0.25 - 3.0).collect();
        let mut encoder = ByteStreamSplitEncoder::<FloatType>::new(&EncodingConfig::default()).unwrap();
        encoder.put(&values).unwrap();
        let page = encoder.flush().unwrap();

        let mut decoder = ByteStreamSplitDecoder::<FloatType>::new(&EncodingConfig::default()).unwrap();
        decoder.set_data(values.len(), page).unwrap();
        let mut out = vec![0.0f32; 30];
        assert_eq!(decoder.decode(&mut out).unwrap(), 30);
        assert_eq!(&out[..], &values[..30]);
        assert_eq!(decoder.discard(50).unwrap(), 50);
        assert_eq!(decoder.decode(&mut out).unwrap(), 20);
        assert_eq!(&out[..20], &values[80..]);
    }

    #[test]
    fn test_double_extremes() {
        let values = [f64::MIN, f64::MAX, -0.0, f64::INFINITY, f64::MIN_POSITIVE];
        let mut encoder = ByteStreamSplitEncoder::<DoubleType>::new(&EncodingConfig::default()).unwrap();
        encoder.put(&values).unwrap();
        let mut decoder = ByteStreamSplitDecoder::<DoubleType>::new(&EncodingConfig::default()).unwrap();
        decoder.set_data(5, encoder.flush().unwrap()).unwrap();
        let mut out = [0.0f64; 5];
        decoder.decode(&mut out).unwrap();
        for (a, b) in out.iter().zip(&values) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_fixed_len_byte_array_width_12() {
        let config = EncodingConfig::default().with_type_length(12);
        let values: Vec<FixedLenByteArray> = (0..9u8)
            .map(|i| FixedLenByteArray::from((0..12).map(|j| i * 16 + j).collect::<Vec<u8>>()))
            .collect();
        let mut encoder = ByteStreamSplitEncoder::<FixedLenByteArrayType>::new(&config).unwrap();
        encoder.put(&values).unwrap();
        let page = encoder.flush().unwrap();
        assert_eq!(page[1], 16);

        let mut decoder = ByteStreamSplitDecoder::<FixedLenByteArrayType>::new(&config).unwrap();
        decoder.set_data(9, page).unwrap();
        let mut out = vec![FixedLenByteArray::default(); 9];
        assert_eq!(decoder.decode(&mut out).unwrap(), 9);
        assert_eq!(out, values);
    }

    #[test]
    fn test_batches_keep_earlier_values_intact() {
        let config = EncodingConfig::default().with_type_length(3);
        let values: Vec<FixedLenByteArray> = (0..50u8)
            .map(|i| FixedLenByteArray::from(vec![i, i.wrapping_mul(7), 255 - i]))
            .collect();
        let mut encoder = ByteStreamSplitEncoder::<FixedLenByteArrayType>::new(&config).unwrap();
        encoder.put(&values).unwrap();
        let mut decoder = ByteStreamSplitDecoder::<FixedLenByteArrayType>::new(&config).unwrap();
        decoder.set_data(values.len(), encoder.flush().unwrap()).unwrap();

        let mut decoded = Vec::new();
        let mut batch = vec![FixedLenByteArray::default(); 4];
        loop {
            let n = decoder.decode(&mut batch).unwrap();
            if n == 0 {
                break;
            }
            decoded.extend_from_slice(&batch[..n]);
        }
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_ragged_page_is_rejected() {
        let mut decoder = ByteStreamSplitDecoder::<Int32Type>::new(&EncodingConfig::default()).unwrap();
        let err = decoder.set_data(2, Bytes::from_static(&[0; 7])).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidValue { .. }));
    }
}
