//! Boolean value codecs: plain (one bit per value, LSB first) and RLE
//! (length-prefixed run-length / bit-packed hybrid of width 1).

use super::{
    Decoder, Encoder, EncodingKind, ensure_initialized,
    rle::{RleDecoder, RleEncoder, split_length_prefix, with_length_prefix},
};
use crate::{
    buffers_pool::{BufferPoolRef, BuffersPool},
    types::BooleanType,
};
use bytes::Bytes;
use colpage_bits::bitmap::{pack_bools, set_bit_to, unpack_bools};
use colpage_bytes::{ByteBuffer, align::bytes_for_bits};
use colpage_common::{Result, error::Error};

/// Values decoded per step through the scratch buffer of the RLE decoder.
const BOOL_BATCH_SIZE: usize = 1024;

pub struct PlainBooleanEncoder {
    /// Packed bits; the last byte is partial when `num_values % 8 != 0`.
    buffer: BufferPoolRef<'static>,
    num_values: usize,
}

impl PlainBooleanEncoder {
    pub fn new() -> Self {
        PlainBooleanEncoder {
            buffer: BuffersPool::global().get_buffer(),
            num_values: 0,
        }
    }
}

impl Default for PlainBooleanEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<BooleanType> for PlainBooleanEncoder {
    fn encoding(&self) -> EncodingKind {
        EncodingKind::Plain
    }

    fn put(&mut self, mut values: &[bool]) -> Result<()> {
        let used = self.num_values % 8;
        if used != 0 {
            let fill = (8 - used).min(values.len());
            let last = self.buffer.len() - 1;
            let byte = &mut self.buffer.as_mut_slice()[last..];
            for (i, &value) in values[..fill].iter().enumerate() {
                set_bit_to(byte, used + i, value);
            }
            self.num_values += fill;
            values = &values[fill..];
        }
        let offset = self.buffer.reserve_zeroed(bytes_for_bits(values.len()));
        pack_bools(values, &mut self.buffer.as_mut_slice()[offset..]);
        self.num_values += values.len();
        Ok(())
    }

    fn estimated_encoded_size(&self) -> usize {
        self.buffer.len()
    }

    fn flush(&mut self) -> Result<Bytes> {
        self.num_values = 0;
        Ok(self.buffer.take_bytes())
    }
}

#[derive(Default)]
pub struct PlainBooleanDecoder {
    data: Bytes,
    /// Index of the next bit to read.
    bit_offset: usize,
    num_values: usize,
    initialized: bool,
}

impl PlainBooleanDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails unless `count` more bits are available.
    fn check_available(&self, count: usize) -> Result<()> {
        let available = self.data.len().saturating_mul(8) - self.bit_offset;
        if count > available {
            return Err(Error::truncated(
                "plain booleans",
                bytes_for_bits(self.bit_offset.saturating_add(count)),
                self.data.len(),
            ));
        }
        Ok(())
    }
}

impl Decoder<BooleanType> for PlainBooleanDecoder {
    fn encoding(&self) -> EncodingKind {
        EncodingKind::Plain
    }

    fn set_data(&mut self, num_values: usize, data: Bytes) -> Result<()> {
        self.data = data;
        self.bit_offset = 0;
        self.num_values = num_values;
        self.initialized = true;
        Ok(())
    }

    fn decode(&mut self, out: &mut [bool]) -> Result<usize> {
        ensure_initialized(self.initialized, "decode")?;
        let count = out.len().min(self.num_values);
        self.check_available(count)?;
        unpack_bools(&self.data, self.bit_offset, &mut out[..count]);
        self.bit_offset += count;
        self.num_values -= count;
        Ok(count)
    }

    fn discard(&mut self, num_values: usize) -> Result<usize> {
        ensure_initialized(self.initialized, "discard")?;
        let count = num_values.min(self.num_values);
        self.check_available(count)?;
        self.bit_offset += count;
        self.num_values -= count;
        Ok(count)
    }

    fn values_left(&self) -> usize {
        self.num_values
    }
}

/// RLE boolean pages: a 4-byte little-endian length followed by a
/// run-length / bit-packed stream of width 1.
pub struct RleBooleanEncoder {
    encoder: RleEncoder<BufferPoolRef<'static>>,
    num_values: usize,
}

impl RleBooleanEncoder {
    pub fn new() -> Self {
        RleBooleanEncoder {
            encoder: RleEncoder::with_buffer(BuffersPool::global().get_buffer(), 1),
            num_values: 0,
        }
    }
}

impl Default for RleBooleanEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<BooleanType> for RleBooleanEncoder {
    fn encoding(&self) -> EncodingKind {
        EncodingKind::Rle
    }

    fn put(&mut self, values: &[bool]) -> Result<()> {
        for &value in values {
            self.encoder.put(value as u64);
        }
        self.num_values += values.len();
        Ok(())
    }

    fn estimated_encoded_size(&self) -> usize {
        4 + RleEncoder::<ByteBuffer>::max_buffer_size(1, self.num_values)
    }

    fn flush(&mut self) -> Result<Bytes> {
        let stream = self.encoder.consume();
        self.num_values = 0;
        with_length_prefix(&stream)
    }
}

#[derive(Default)]
pub struct RleBooleanDecoder {
    decoder: RleDecoder,
    num_values: usize,
    initialized: bool,
}

impl RleBooleanDecoder {
    pub fn new() -> Result<Self> {
        Ok(RleBooleanDecoder {
            decoder: RleDecoder::new(1)?,
            num_values: 0,
            initialized: false,
        })
    }
}

impl Decoder<BooleanType> for RleBooleanDecoder {
    fn encoding(&self) -> EncodingKind {
        EncodingKind::Rle
    }

    fn set_data(&mut self, num_values: usize, data: Bytes) -> Result<()> {
        let (stream, _) = split_length_prefix(&data, "rle boolean stream")?;
        self.decoder.set_data(stream);
        self.num_values = num_values;
        self.initialized = true;
        Ok(())
    }

    fn decode(&mut self, out: &mut [bool]) -> Result<usize> {
        ensure_initialized(self.initialized, "decode")?;
        let count = out.len().min(self.num_values);
        let mut scratch = [0u8; BOOL_BATCH_SIZE];
        let mut read = 0;
        while read < count {
            let batch = (count - read).min(BOOL_BATCH_SIZE);
            let got = self.decoder.get_batch(&mut scratch[..batch])?;
            for (slot, &bit) in out[read..read + got].iter_mut().zip(&scratch[..got]) {
                *slot = bit != 0;
            }
            read += got;
            if got < batch {
                return Err(Error::truncated("rle booleans", count, read));
            }
        }
        self.num_values -= count;
        Ok(count)
    }

    fn discard(&mut self, num_values: usize) -> Result<usize> {
        ensure_initialized(self.initialized, "discard")?;
        let count = num_values.min(self.num_values);
        let skipped = self.decoder.skip(count)?;
        if skipped < count {
            return Err(Error::truncated("rle booleans", count, skipped));
        }
        self.num_values -= count;
        Ok(count)
    }

    fn values_left(&self) -> usize {
        self.num_values
    }
}
