//! Delta byte array (incremental / front compression): for every value the
//! length of the prefix it shares with the previous value, delta binary
//! packed, followed by the remaining suffixes as a delta length byte array.

use super::{
    Decoder, Encoder, EncodingKind,
    delta_bit_pack::{DeltaBitPackDecoder, DeltaBitPackEncoder},
    delta_length_byte_array::{DeltaLengthByteArrayDecoder, DeltaLengthByteArrayEncoder},
    ensure_initialized,
    plain::check_fixed_widths,
};
use crate::{
    config::EncodingConfig,
    types::{ByteArray, ByteArrayType, BytesValue, Int32Type, PhysicalKind, PhysicalType},
};
use bytes::Bytes;
use colpage_bytes::ByteBuffer;
use colpage_common::{Result, error::Error};
use std::marker::PhantomData;

/// Column width to enforce for fixed-length byte arrays.
fn fixed_width<T: PhysicalType>(config: &EncodingConfig) -> Result<Option<usize>> {
    if T::KIND == PhysicalKind::FixedLenByteArray {
        config.require_type_length().map(Some)
    } else {
        Ok(None)
    }
}

pub struct DeltaByteArrayEncoder<T: PhysicalType> {
    prefix_len_encoder: DeltaBitPackEncoder<Int32Type>,
    suffix_encoder: DeltaLengthByteArrayEncoder<ByteArrayType>,
    previous: Vec<u8>,
    type_length: Option<usize>,
    _marker: PhantomData<T>,
}

impl<T> DeltaByteArrayEncoder<T>
where
    T: PhysicalType,
    T::Value: BytesValue,
{
    pub fn new(config: &EncodingConfig) -> Result<Self> {
        Ok(DeltaByteArrayEncoder {
            prefix_len_encoder: DeltaBitPackEncoder::new(),
            suffix_encoder: DeltaLengthByteArrayEncoder::new(),
            previous: Vec::new(),
            type_length: fixed_width::<T>(config)?,
            _marker: PhantomData,
        })
    }
}

impl<T> Encoder<T> for DeltaByteArrayEncoder<T>
where
    T: PhysicalType,
    T::Value: BytesValue,
{
    fn encoding(&self) -> EncodingKind {
        EncodingKind::DeltaByteArray
    }

    /// Nothing is encoded when any value of the batch is rejected.
    fn put(&mut self, values: &[T::Value]) -> Result<()> {
        if let Some(width) = self.type_length {
            check_fixed_widths(values.iter().map(|v| v.bytes().len()), width, false)?;
        }
        for value in values {
            i32::try_from(value.bytes().len())?;
        }
        for value in values {
            let bytes = value.bytes();
            let prefix_len = self
                .previous
                .iter()
                .zip(bytes)
                .take_while(|(a, b)| a == b)
                .count();
            self.prefix_len_encoder
                .put_value(i32::try_from(prefix_len)?);
            self.suffix_encoder.put_bytes(&bytes[prefix_len..])?;
            self.previous.clear();
            self.previous.extend_from_slice(bytes);
        }
        Ok(())
    }

    fn estimated_encoded_size(&self) -> usize {
        self.prefix_len_encoder.estimated_encoded_size()
            + self.suffix_encoder.estimated_encoded_size()
    }

    fn flush(&mut self) -> Result<Bytes> {
        let prefixes = self.prefix_len_encoder.flush()?;
        let suffixes = self.suffix_encoder.flush()?;
        self.previous.clear();
        let mut page = ByteBuffer::with_capacity(prefixes.len() + suffixes.len());
        page.extend_from_slice(&prefixes);
        page.extend_from_slice(&suffixes);
        Ok(page.take_bytes())
    }
}

/// Values rebuilt per step; bounds the scratch space of a decode call.
const VALUE_BATCH_SIZE: usize = 1024;

pub struct DeltaByteArrayDecoder<T: PhysicalType> {
    /// Positioned at the prefix length of the next value.
    prefix_len_decoder: DeltaBitPackDecoder<Int32Type>,
    suffix_decoder: DeltaLengthByteArrayDecoder<ByteArrayType>,
    suffixes: Vec<ByteArray>,
    /// The value decoded (or skipped) last; prefixes refer to it.
    previous: Bytes,
    num_values: usize,
    type_length: Option<usize>,
    initialized: bool,
    _marker: PhantomData<T>,
}

impl<T> DeltaByteArrayDecoder<T>
where
    T: PhysicalType,
    T::Value: BytesValue,
{
    pub fn new(config: &EncodingConfig) -> Result<Self> {
        Ok(DeltaByteArrayDecoder {
            prefix_len_decoder: DeltaBitPackDecoder::new(),
            suffix_decoder: DeltaLengthByteArrayDecoder::new(),
            suffixes: Vec::new(),
            previous: Bytes::new(),
            num_values: 0,
            type_length: fixed_width::<T>(config)?,
            initialized: false,
            _marker: PhantomData,
        })
    }

    /// Rebuilds the next value from its prefix length and `suffix`.
    fn next_value(&mut self, prefix_len: i32, suffix: Bytes) -> Result<Bytes> {
        let prefix_len = usize::try_from(prefix_len)
            .ok()
            .filter(|&len| len <= self.previous.len())
            .ok_or_else(|| {
                Error::invalid_value(
                    "prefix length",
                    format!(
                        "{prefix_len} with a previous value of {} bytes",
                        self.previous.len()
                    ),
                )
            })?;

        let value = if prefix_len == 0 {
            suffix
        } else if suffix.is_empty() {
            self.previous.slice(..prefix_len)
        } else {
            let mut value = Vec::with_capacity(prefix_len + suffix.len());
            value.extend_from_slice(&self.previous[..prefix_len]);
            value.extend_from_slice(&suffix);
            Bytes::from(value)
        };

        if let Some(width) = self.type_length {
            if value.len() != width {
                return Err(Error::invalid_value(
                    "fixed-length byte array",
                    format!("decoded {} bytes, expected {width}", value.len()),
                ));
            }
        }
        self.previous = value.clone();
        Ok(value)
    }
}

impl<T> Decoder<T> for DeltaByteArrayDecoder<T>
where
    T: PhysicalType,
    T::Value: BytesValue,
{
    fn encoding(&self) -> EncodingKind {
        EncodingKind::DeltaByteArray
    }

    fn set_data(&mut self, num_values: usize, data: Bytes) -> Result<()> {
        self.initialized = false;
        self.prefix_len_decoder.set_data(usize::MAX, data.clone())?;
        let total = self.prefix_len_decoder.values_left();
        // The suffix stream starts where the prefix lengths end.
        let mut prefixes_end = self.prefix_len_decoder.clone();
        prefixes_end.skip_page()?;

        let suffixes = data.slice(prefixes_end.bytes_consumed()..);
        self.suffix_decoder.set_data(total, suffixes)?;
        if self.suffix_decoder.values_left() != total {
            return Err(Error::count_mismatch(total, self.suffix_decoder.values_left()));
        }

        self.previous = Bytes::new();
        self.num_values = num_values.min(total);
        self.initialized = true;
        Ok(())
    }

    fn decode(&mut self, out: &mut [T::Value]) -> Result<usize> {
        ensure_initialized(self.initialized, "decode")?;
        let count = out.len().min(self.num_values);
        let mut prefix_lengths = [0i32; VALUE_BATCH_SIZE];
        let mut suffixes = std::mem::take(&mut self.suffixes);
        let mut done = 0;
        while done < count {
            let batch = (count - done).min(VALUE_BATCH_SIZE);
            let read = self.prefix_len_decoder.decode(&mut prefix_lengths[..batch])?;
            if read != batch {
                return Err(Error::count_mismatch(batch, read));
            }
            suffixes.clear();
            suffixes.resize(batch, ByteArray::default());
            let read = self.suffix_decoder.decode(&mut suffixes)?;
            if read != batch {
                return Err(Error::count_mismatch(batch, read));
            }
            let values = out[done..done + batch]
                .iter_mut()
                .zip(&prefix_lengths[..batch])
                .zip(suffixes.drain(..));
            for ((slot, &prefix_len), suffix) in values {
                *slot = T::Value::from_bytes(self.next_value(prefix_len, suffix.into_inner())?);
            }
            done += batch;
        }
        self.suffixes = suffixes;
        self.num_values -= count;
        Ok(count)
    }

    fn values_left(&self) -> usize {
        self.num_values
    }
}
