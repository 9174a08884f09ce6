//! Plain encoding: values are stored back to back in their natural
//! little-endian layout. Variable-length byte arrays carry a 4-byte
//! little-endian length prefix; fixed-length byte arrays are raw.

use super::{Decoder, Encoder, EncodingKind, ensure_initialized};
use crate::{
    buffers_pool::{BufferPoolRef, BuffersPool},
    config::EncodingConfig,
    types::{ByteArray, FixedLenByteArray, Int96, PhysicalKind, PhysicalType},
};
use bytes::Bytes;
use colpage_bytes::{ByteBuffer, ByteCursor};
use colpage_common::{Result, error::Error};
use std::marker::PhantomData;

/// Values that have a plain representation.
///
/// `type_length` is the column-wide width of fixed-length byte arrays and is
/// ignored by every other kind.
pub trait PlainValue: Sized + Clone + Default + Send + Sync + 'static {
    /// Number of bytes `values` occupy once plain-encoded.
    fn plain_size(values: &[Self], type_length: usize) -> usize;

    fn encode_plain(values: &[Self], type_length: usize, out: &mut ByteBuffer) -> Result<()>;

    /// Decodes exactly `out.len()` values.
    fn decode_plain(cursor: &mut ByteCursor, type_length: usize, out: &mut [Self]) -> Result<()>;

    /// Advances past exactly `count` values.
    fn skip_plain(cursor: &mut ByteCursor, type_length: usize, count: usize) -> Result<()>;
}

fn fixed_byte_len(count: usize, width: usize) -> Result<usize> {
    count
        .checked_mul(width)
        .ok_or_else(|| Error::overflow(format!("{count} values of {width} bytes")))
}

macro_rules! impl_pod_plain_value {
    ($($T:ty),*) => {
        $(
            impl PlainValue for $T {
                #[inline]
                fn plain_size(values: &[Self], _type_length: usize) -> usize {
                    std::mem::size_of_val(values)
                }

                fn encode_plain(values: &[Self], _type_length: usize, out: &mut ByteBuffer) -> Result<()> {
                    out.extend_from_typed_slice(values);
                    Ok(())
                }

                fn decode_plain(cursor: &mut ByteCursor, _type_length: usize, out: &mut [Self]) -> Result<()> {
                    let needed = fixed_byte_len(out.len(), std::mem::size_of::<$T>())?;
                    let available = cursor.remaining();
                    let bytes = cursor
                        .read_bytes(needed)
                        .ok_or_else(|| Error::truncated("plain values", needed, available))?;
                    bytemuck::cast_slice_mut::<$T, u8>(out).copy_from_slice(&bytes);
                    Ok(())
                }

                fn skip_plain(cursor: &mut ByteCursor, _type_length: usize, count: usize) -> Result<()> {
                    let needed = fixed_byte_len(count, std::mem::size_of::<$T>())?;
                    if !cursor.skip(needed) {
                        return Err(Error::truncated("plain values", needed, cursor.remaining()));
                    }
                    Ok(())
                }
            }
        )*
    };
}

impl_pod_plain_value!(i32, i64, f32, f64, Int96);

/// Reads one length prefix, rejecting negative lengths.
fn read_length_prefix(cursor: &mut ByteCursor) -> Result<usize> {
    let available = cursor.remaining();
    let len = cursor
        .read_i32_le()
        .ok_or_else(|| Error::truncated("byte array length", 4, available))?;
    usize::try_from(len)
        .map_err(|_| Error::invalid_value("byte array length", format!("negative length {len}")))
}

impl PlainValue for ByteArray {
    fn plain_size(values: &[Self], _type_length: usize) -> usize {
        values.iter().map(|v| 4 + v.len()).sum()
    }

    fn encode_plain(values: &[Self], _type_length: usize, out: &mut ByteBuffer) -> Result<()> {
        for value in values {
            i32::try_from(value.len())?;
        }
        out.reserve(Self::plain_size(values, 0));
        for value in values {
            let len = i32::try_from(value.len())?;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(value.as_bytes());
        }
        Ok(())
    }

    fn decode_plain(cursor: &mut ByteCursor, _type_length: usize, out: &mut [Self]) -> Result<()> {
        for slot in out.iter_mut() {
            let len = read_length_prefix(cursor)?;
            let available = cursor.remaining();
            let data = cursor
                .read_bytes(len)
                .ok_or_else(|| Error::truncated("byte array value", len, available))?;
            *slot = ByteArray::new(data);
        }
        Ok(())
    }

    fn skip_plain(cursor: &mut ByteCursor, _type_length: usize, count: usize) -> Result<()> {
        for _ in 0..count {
            let len = read_length_prefix(cursor)?;
            if !cursor.skip(len) {
                return Err(Error::truncated("byte array value", len, cursor.remaining()));
            }
        }
        Ok(())
    }
}

impl PlainValue for FixedLenByteArray {
    fn plain_size(values: &[Self], type_length: usize) -> usize {
        values.len() * type_length
    }

    /// An empty value stands for a null slot and is written as `type_length`
    /// zero bytes. Nothing is written when any value has the wrong width.
    fn encode_plain(values: &[Self], type_length: usize, out: &mut ByteBuffer) -> Result<()> {
        check_fixed_widths(values.iter().map(|v| v.len()), type_length, true)?;
        out.reserve(fixed_byte_len(values.len(), type_length)?);
        for value in values {
            if value.is_empty() {
                out.reserve_zeroed(type_length);
            } else {
                out.extend_from_slice(value.as_bytes());
            }
        }
        Ok(())
    }

    fn decode_plain(cursor: &mut ByteCursor, type_length: usize, out: &mut [Self]) -> Result<()> {
        let needed = fixed_byte_len(out.len(), type_length)?;
        let available = cursor.remaining();
        let data = cursor
            .read_bytes(needed)
            .ok_or_else(|| Error::truncated("fixed-length byte array values", needed, available))?;
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = FixedLenByteArray::new(data.slice(i * type_length..(i + 1) * type_length));
        }
        Ok(())
    }

    fn skip_plain(cursor: &mut ByteCursor, type_length: usize, count: usize) -> Result<()> {
        let needed = fixed_byte_len(count, type_length)?;
        if !cursor.skip(needed) {
            return Err(Error::truncated(
                "fixed-length byte array values",
                needed,
                cursor.remaining(),
            ));
        }
        Ok(())
    }
}

/// Fails with `InvalidArgument` on the first length that is not
/// `type_length` (or zero, when `allow_empty` is set).
pub(crate) fn check_fixed_widths(
    lengths: impl IntoIterator<Item = usize>,
    type_length: usize,
    allow_empty: bool,
) -> Result<()> {
    for len in lengths {
        if len != type_length && !(allow_empty && len == 0) {
            return Err(Error::invalid_arg(
                "value",
                format!("fixed-length byte array of {len} bytes, expected {type_length}"),
            ));
        }
    }
    Ok(())
}

/// Width passed to [`PlainValue`] methods for values of kind `T`.
pub(crate) fn plain_type_length<T: PhysicalType>(config: &EncodingConfig) -> Result<usize> {
    if T::KIND == PhysicalKind::FixedLenByteArray {
        config.require_type_length()
    } else {
        Ok(0)
    }
}

pub struct PlainEncoder<T: PhysicalType> {
    buffer: BufferPoolRef<'static>,
    type_length: usize,
    _marker: PhantomData<T>,
}

impl<T> PlainEncoder<T>
where
    T: PhysicalType,
    T::Value: PlainValue,
{
    pub fn new(config: &EncodingConfig) -> Result<Self> {
        Ok(PlainEncoder {
            buffer: BuffersPool::global().get_buffer(),
            type_length: plain_type_length::<T>(config)?,
            _marker: PhantomData,
        })
    }
}

impl<T> Encoder<T> for PlainEncoder<T>
where
    T: PhysicalType,
    T::Value: PlainValue,
{
    fn encoding(&self) -> EncodingKind {
        EncodingKind::Plain
    }

    fn put(&mut self, values: &[T::Value]) -> Result<()> {
        T::Value::encode_plain(values, self.type_length, &mut self.buffer)
    }

    fn estimated_encoded_size(&self) -> usize {
        self.buffer.len()
    }

    fn flush(&mut self) -> Result<Bytes> {
        Ok(self.buffer.take_bytes())
    }
}

pub struct PlainDecoder<T: PhysicalType> {
    cursor: ByteCursor,
    num_values: usize,
    type_length: usize,
    initialized: bool,
    _marker: PhantomData<T>,
}

impl<T> PlainDecoder<T>
where
    T: PhysicalType,
    T::Value: PlainValue,
{
    pub fn new(config: &EncodingConfig) -> Result<Self> {
        Ok(PlainDecoder {
            cursor: ByteCursor::default(),
            num_values: 0,
            type_length: plain_type_length::<T>(config)?,
            initialized: false,
            _marker: PhantomData,
        })
    }
}

impl<T> Decoder<T> for PlainDecoder<T>
where
    T: PhysicalType,
    T::Value: PlainValue,
{
    fn encoding(&self) -> EncodingKind {
        EncodingKind::Plain
    }

    fn set_data(&mut self, num_values: usize, data: Bytes) -> Result<()> {
        self.cursor.reset(data);
        self.num_values = num_values;
        self.initialized = true;
        Ok(())
    }

    fn decode(&mut self, out: &mut [T::Value]) -> Result<usize> {
        ensure_initialized(self.initialized, "decode")?;
        let count = out.len().min(self.num_values);
        T::Value::decode_plain(&mut self.cursor, self.type_length, &mut out[..count])?;
        self.num_values -= count;
        Ok(count)
    }

    fn discard(&mut self, num_values: usize) -> Result<usize> {
        ensure_initialized(self.initialized, "discard")?;
        let count = num_values.min(self.num_values);
        T::Value::skip_plain(&mut self.cursor, self.type_length, count)?;
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
    use crate::types::{ByteArrayType, DoubleType, FixedLenByteArrayType, Int32Type, Int96Type};
    use colpage_common::error::ErrorKind;

    #[test]
    fn test_int32_layout_and_round_trip() {
        let values = [1, -1, i32::MIN, i32::MAX, 0];
        let mut encoder = PlainEncoder::<Int32Type>::new(&EncodingConfig::default()).unwrap();
        encoder.put(&values).unwrap();
        assert_eq!(encoder.estimated_encoded_size(), 20);
        let page = encoder.flush().unwrap();
        assert_eq!(&page[..8], &[1, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(encoder.estimated_encoded_size(), 0);

        let mut decoder = PlainDecoder::<Int32Type>::new(&EncodingConfig::default()).unwrap();
        decoder.set_data(values.len(), page).unwrap();
        let mut out = vec![0; 8];
        assert_eq!(decoder.decode(&mut out).unwrap(), 5);
        assert_eq!(&out[..5], &values);
        assert_eq!(decoder.values_left(), 0);
        assert_eq!(decoder.decode(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_truncated_numeric_page() {
        let mut decoder = PlainDecoder::<DoubleType>::new(&EncodingConfig::default()).unwrap();
        decoder.set_data(2, Bytes::from_static(&[0; 12])).unwrap();
        let mut out = vec![0.0; 2];
        let err = decoder.decode(&mut out).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::Truncated {
                needed: 16,
                available: 12,
                ..
            }
        ));
    }

    #[test]
    fn test_int96_round_trip() {
        let values = [Int96::new([1, 2, 3]), Int96::new([u32::MAX, 0, 7])];
        let mut encoder = PlainEncoder::<Int96Type>::new(&EncodingConfig::default()).unwrap();
        encoder.put(&values).unwrap();
        let page = encoder.flush().unwrap();
        assert_eq!(page.len(), 24);
        assert_eq!(&page[..12], &values[0].to_le_bytes());

        let mut decoder = PlainDecoder::<Int96Type>::new(&EncodingConfig::default()).unwrap();
        decoder.set_data(2, page).unwrap();
        let mut out = vec![Int96::default(); 2];
        decoder.decode(&mut out).unwrap();
        assert_eq!(out, values);
    }

    #[test]
    fn test_byte_array_values_alias_page() {
        let values: Vec<ByteArray> = ["a", "", "hello world"].into_iter().map(ByteArray::from).collect();
        let mut encoder = PlainEncoder::<ByteArrayType>::new(&EncodingConfig::default()).unwrap();
        encoder.put(&values).unwrap();
        let page = encoder.flush().unwrap();
        assert_eq!(page.len(), 3 * 4 + 12);

        let mut decoder = PlainDecoder::<ByteArrayType>::new(&EncodingConfig::default()).unwrap();
        decoder.set_data(3, page.clone()).unwrap();
        let mut out = vec![ByteArray::default(); 3];
        decoder.decode(&mut out).unwrap();
        assert_eq!(out, values);
        let page_range = page.as_ptr() as usize..page.as_ptr() as usize + page.len();
        assert!(page_range.contains(&(out[2].as_bytes().as_ptr() as usize)));
    }

    #[test]
    fn test_byte_array_corrupt_lengths() {
        let mut decoder = PlainDecoder::<ByteArrayType>::new(&EncodingConfig::default()).unwrap();
        let mut out = vec![ByteArray::default(); 1];

        decoder.set_data(1, Bytes::from_static(&[0xff, 0xff, 0xff, 0xff])).unwrap();
        let err = decoder.decode(&mut out).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidValue { .. }));

        decoder.set_data(1, Bytes::from_static(&[5, 0, 0, 0, b'a', b'b'])).unwrap();
        let err = decoder.decode(&mut out).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::Truncated {
                needed: 5,
                available: 2,
                ..
            }
        ));

        decoder.set_data(1, Bytes::from_static(&[1, 0])).unwrap();
        let err = decoder.discard(1).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Truncated { .. }));
    }

    #[test]
    fn test_fixed_len_byte_array() {
        let config = EncodingConfig::default().with_type_length(3);
        let values = vec![
            FixedLenByteArray::from(&b"abc"[..]),
            FixedLenByteArray::default(),
            FixedLenByteArray::from(&b"xyz"[..]),
        ];
        let mut encoder = PlainEncoder::<FixedLenByteArrayType>::new(&config).unwrap();
        encoder.put(&values).unwrap();
        let page = encoder.flush().unwrap();
        assert_eq!(&page[..], b"abc\0\0\0xyz");

        let err = encoder
            .put(&[FixedLenByteArray::from(&b"toolong"[..])])
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));

        // a bad value late in a batch rejects the whole batch
        let err = encoder
            .put(&[
                FixedLenByteArray::from(&b"abc"[..]),
                FixedLenByteArray::from(&b"ab"[..]),
            ])
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
        assert_eq!(encoder.estimated_encoded_size(), 0);
        assert!(encoder.flush().unwrap().is_empty());

        let mut decoder = PlainDecoder::<FixedLenByteArrayType>::new(&config).unwrap();
        decoder.set_data(3, page).unwrap();
        assert_eq!(decoder.discard(1).unwrap(), 1);
        let mut out = vec![FixedLenByteArray::default(); 2];
        assert_eq!(decoder.decode(&mut out).unwrap(), 2);
        assert_eq!(out[0].as_bytes(), b"\0\0\0");
        assert_eq!(out[1].as_bytes(), b"xyz");

        assert!(PlainDecoder::<FixedLenByteArrayType>::new(&EncodingConfig::default()).is_err());
    }

    #[test]
    fn test_decode_before_set_data() {
        let mut decoder = PlainDecoder::<Int32Type>::new(&EncodingConfig::default()).unwrap();
        let err = decoder.decode(&mut [0; 1]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));
    }

    #[test]
    fn test_spaced_round_trip() {
        // rows 0..10, every third row null
        let mut bits = [0u8; 2];
        let mut values = Vec::new();
        for i in 0..10 {
            if i % 3 != 0 {
                colpage_bits::bitmap::set_bit(&mut bits, i);
            }
            values.push(i as i32 * 10);
        }
        let mut encoder = PlainEncoder::<Int32Type>::new(&EncodingConfig::default()).unwrap();
        encoder.put_spaced(&values, &bits, 0).unwrap();
        let page = encoder.flush().unwrap();
        assert_eq!(page.len(), 6 * 4);

        let mut decoder = PlainDecoder::<Int32Type>::new(&EncodingConfig::default()).unwrap();
        decoder.set_data(6, page).unwrap();
        let mut out = vec![0; 10];
        assert_eq!(decoder.decode_spaced(&mut out, 4, &bits, 0).unwrap(), 10);
        for i in 0..10 {
            if i % 3 != 0 {
                assert_eq!(out[i], values[i]);
            }
        }
    }
}
