//! Delta length byte array: the lengths of all values, delta binary packed,
//! followed by the concatenated value bytes.

use super::{
    Decoder, Encoder, EncodingKind,
    delta_bit_pack::{DeltaBitPackDecoder, DeltaBitPackEncoder},
    ensure_initialized,
};
use crate::{
    buffers_pool::{BufferPoolRef, BuffersPool},
    types::{BytesValue, Int32Type, PhysicalType},
};
use bytes::Bytes;
use colpage_bytes::ByteBuffer;
use colpage_common::{Result, error::Error};
use std::marker::PhantomData;

pub struct DeltaLengthByteArrayEncoder<T: PhysicalType> {
    len_encoder: DeltaBitPackEncoder<Int32Type>,
    data: BufferPoolRef<'static>,
    _marker: PhantomData<T>,
}

impl<T> DeltaLengthByteArrayEncoder<T>
where
    T: PhysicalType,
    T::Value: BytesValue,
{
    pub fn new() -> Self {
        DeltaLengthByteArrayEncoder {
            len_encoder: DeltaBitPackEncoder::new(),
            data: BuffersPool::global().get_buffer(),
            _marker: PhantomData,
        }
    }

    /// Appends one value given as raw bytes.
    pub fn put_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.len_encoder.put_value(i32::try_from(value.len())?);
        self.data.extend_from_slice(value);
        Ok(())
    }
}

impl<T> Default for DeltaLengthByteArrayEncoder<T>
where
    T: PhysicalType,
    T::Value: BytesValue,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Encoder<T> for DeltaLengthByteArrayEncoder<T>
where
    T: PhysicalType,
    T::Value: BytesValue,
{
    fn encoding(&self) -> EncodingKind {
        EncodingKind::DeltaLengthByteArray
    }

    fn put(&mut self, values: &[T::Value]) -> Result<()> {
        for value in values {
            i32::try_from(value.bytes().len())?;
        }
        for value in values {
            self.put_bytes(value.bytes())?;
        }
        Ok(())
    }

    fn estimated_encoded_size(&self) -> usize {
        self.len_encoder.estimated_encoded_size() + self.data.len()
    }

    fn flush(&mut self) -> Result<Bytes> {
        let lengths = self.len_encoder.flush()?;
        let mut page = ByteBuffer::with_capacity(lengths.len() + self.data.len());
        page.extend_from_slice(&lengths);
        page.extend_from_slice(&self.data);
        self.data.clear();
        Ok(page.take_bytes())
    }
}

/// Lengths decoded per step while values are produced or skipped.
const LENGTH_BATCH_SIZE: usize = 1024;

pub struct DeltaLengthByteArrayDecoder<T: PhysicalType> {
    /// Positioned at the next length to produce.
    len_decoder: DeltaBitPackDecoder<Int32Type>,
    /// Concatenated value bytes following the lengths stream.
    data: Bytes,
    offset: usize,
    num_values: usize,
    initialized: bool,
    _marker: PhantomData<T>,
}

impl<T> DeltaLengthByteArrayDecoder<T>
where
    T: PhysicalType,
    T::Value: BytesValue,
{
    pub fn new() -> Self {
        DeltaLengthByteArrayDecoder {
            len_decoder: DeltaBitPackDecoder::new(),
            data: Bytes::new(),
            offset: 0,
            num_values: 0,
            initialized: false,
            _marker: PhantomData,
        }
    }

    /// Consumes the bytes of one value of length `len`.
    fn next_value(&mut self, len: i32) -> Result<Bytes> {
        let len = usize::try_from(len)
            .map_err(|_| Error::invalid_value("byte array length", format!("negative length {len}")))?;
        let available = self.data.len() - self.offset;
        if len > available {
            return Err(Error::truncated("delta length byte array value", len, available));
        }
        let value = self.data.slice(self.offset..self.offset + len);
        self.offset += len;
        Ok(value)
    }

    /// Reads the next `count` values in batches, handing each to `sink`.
    fn read_values(&mut self, count: usize, mut sink: impl FnMut(usize, Bytes)) -> Result<()> {
        let mut lengths = [0i32; LENGTH_BATCH_SIZE];
        let mut done = 0;
        while done < count {
            let batch = (count - done).min(LENGTH_BATCH_SIZE);
            let read = self.len_decoder.decode(&mut lengths[..batch])?;
            if read != batch {
                return Err(Error::count_mismatch(batch, read));
            }
            for (i, &len) in lengths[..batch].iter().enumerate() {
                sink(done + i, self.next_value(len)?);
            }
            done += batch;
        }
        Ok(())
    }
}

impl<T> Default for DeltaLengthByteArrayDecoder<T>
where
    T: PhysicalType,
    T::Value: BytesValue,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Decoder<T> for DeltaLengthByteArrayDecoder<T>
where
    T: PhysicalType,
    T::Value: BytesValue,
{
    fn encoding(&self) -> EncodingKind {
        EncodingKind::DeltaLengthByteArray
    }

    fn set_data(&mut self, num_values: usize, data: Bytes) -> Result<()> {
        self.initialized = false;
        self.len_decoder.set_data(usize::MAX, data.clone())?;
        let total = self.len_decoder.values_left();
        // The value bytes start where the lengths end.
        let mut lengths_end = self.len_decoder.clone();
        lengths_end.skip_page()?;

        self.data = data.slice(lengths_end.bytes_consumed()..);
        self.offset = 0;
        self.num_values = num_values.min(total);
        self.initialized = true;
        Ok(())
    }

    fn decode(&mut self, out: &mut [T::Value]) -> Result<usize> {
        ensure_initialized(self.initialized, "decode")?;
        let count = out.len().min(self.num_values);
        let out = &mut out[..count];
        self.read_values(count, |i, value| out[i] = T::Value::from_bytes(value))?;
        self.num_values -= count;
        Ok(count)
    }

    fn discard(&mut self, num_values: usize) -> Result<usize> {
        ensure_initialized(self.initialized, "discard")?;
        let count = num_values.min(self.num_values);
        self.read_values(count, |_, _| ())?;
        self.num_values -= count;
        Ok(count)
    }

    fn values_left(&self) -> usize {
        self.num_values
    }
}
