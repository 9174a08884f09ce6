//! Definition and repetition level streams.
//!
//! Levels are small non-negative integers bounded by a column-wide maximum
//! and stored at `num_required_bits(max_level)` bits each. Three layouts are
//! supported:
//! - RLE with a 4-byte little-endian length prefix (V1 data pages),
//! - RLE without a prefix, its length known from the page header (V2),
//! - the legacy BIT_PACKED layout, values packed LSB first with no header.

use super::{
    EncodingKind,
    rle::{RleDecoder, RleEncoder, split_length_prefix, with_length_prefix},
};
use crate::buffers_pool::{BufferPoolRef, BuffersPool};
use bytes::Bytes;
use colpage_bits::{BitReader, BitWriter, num_required_bits};
use colpage_bytes::{ByteBuffer, align::bytes_for_bits};
use colpage_common::{Result, error::Error, verify_arg};

/// Bit width of levels bounded by `max_level`.
#[inline]
pub fn level_bit_width(max_level: i16) -> u32 {
    num_required_bits(max_level.max(0) as u64)
}

/// Upper bound of the size of `num_values` levels encoded with `encoding`
/// (`Rle` in its V1 form, length prefix included, or `BitPacked`).
pub fn max_level_buffer_size(
    encoding: EncodingKind,
    max_level: i16,
    num_values: usize,
) -> Result<usize> {
    let bit_width = level_bit_width(max_level);
    match encoding {
        EncodingKind::Rle => Ok(4 + RleEncoder::<ByteBuffer>::max_buffer_size(bit_width, num_values)),
        EncodingKind::BitPacked => {
            let bits = num_values
                .checked_mul(bit_width as usize)
                .ok_or_else(|| Error::overflow(format!("{num_values} levels of {bit_width} bits")))?;
            Ok(bytes_for_bits(bits))
        }
        other => Err(Error::not_implemented(format!("{other:?} level encoding"))),
    }
}

enum LevelSink {
    Rle {
        encoder: RleEncoder<BufferPoolRef<'static>>,
        length_prefix: bool,
    },
    BitPacked(BitWriter<BufferPoolRef<'static>>),
}

pub struct LevelEncoder {
    sink: LevelSink,
    max_level: i16,
    bit_width: u32,
    num_values: usize,
}

impl LevelEncoder {
    /// Encoder for V1 data pages: `Rle` (length-prefixed) or `BitPacked`.
    pub fn v1(encoding: EncodingKind, max_level: i16) -> Result<Self> {
        verify_arg!(max_level, max_level >= 0);
        let bit_width = level_bit_width(max_level);
        let buffer = BuffersPool::global().get_buffer();
        let sink = match encoding {
            EncodingKind::Rle => LevelSink::Rle {
                encoder: RleEncoder::with_buffer(buffer, bit_width),
                length_prefix: true,
            },
            EncodingKind::BitPacked => LevelSink::BitPacked(BitWriter::with_buffer(buffer)),
            other => {
                return Err(Error::not_implemented(format!("{other:?} level encoding")));
            }
        };
        Ok(LevelEncoder {
            sink,
            max_level,
            bit_width,
            num_values: 0,
        })
    }

    /// Encoder for V2 data pages: RLE without a length prefix.
    pub fn v2(max_level: i16) -> Result<Self> {
        verify_arg!(max_level, max_level >= 0);
        let bit_width = level_bit_width(max_level);
        Ok(LevelEncoder {
            sink: LevelSink::Rle {
                encoder: RleEncoder::with_buffer(BuffersPool::global().get_buffer(), bit_width),
                length_prefix: false,
            },
            max_level,
            bit_width,
            num_values: 0,
        })
    }

    pub fn encoding(&self) -> EncodingKind {
        match self.sink {
            LevelSink::Rle { .. } => EncodingKind::Rle,
            LevelSink::BitPacked(_) => EncodingKind::BitPacked,
        }
    }

    pub fn bit_width(&self) -> u32 {
        self.bit_width
    }

    /// Appends `levels`; every level must lie in `0..=max_level`.
    pub fn put(&mut self, levels: &[i16]) -> Result<()> {
        if let Some(&level) = levels.iter().find(|&&l| l < 0 || l > self.max_level) {
            return Err(Error::invalid_arg(
                "levels",
                format!("level {level} outside of 0..={}", self.max_level),
            ));
        }
        match &mut self.sink {
            LevelSink::Rle { encoder, .. } => {
                for &level in levels {
                    encoder.put(level as u64);
                }
            }
            LevelSink::BitPacked(writer) => {
                for &level in levels {
                    writer.write_value(level as u64, self.bit_width);
                }
            }
        }
        self.num_values += levels.len();
        Ok(())
    }

    pub fn estimated_encoded_size(&self) -> usize {
        match &self.sink {
            LevelSink::Rle { length_prefix, .. } => {
                let prefix = if *length_prefix { 4 } else { 0 };
                prefix + RleEncoder::<ByteBuffer>::max_buffer_size(self.bit_width, self.num_values)
            }
            LevelSink::BitPacked(writer) => writer.bytes_written(),
        }
    }

    /// Returns the encoded levels and resets the encoder.
    pub fn flush(&mut self) -> Result<Bytes> {
        self.num_values = 0;
        match &mut self.sink {
            LevelSink::Rle {
                encoder,
                length_prefix: true,
            } => with_length_prefix(&encoder.consume()),
            LevelSink::Rle { encoder, .. } => Ok(encoder.consume()),
            LevelSink::BitPacked(writer) => Ok(writer.consume()),
        }
    }
}

enum LevelSource {
    Rle {
        decoder: RleDecoder,
        length_prefix: bool,
    },
    BitPacked(BitReader),
}

pub struct LevelDecoder {
    source: LevelSource,
    max_level: i16,
    bit_width: u32,
    num_values: usize,
    initialized: bool,
}

impl LevelDecoder {
    /// Decoder for V1 data pages: `Rle` (length-prefixed) or `BitPacked`.
    pub fn v1(encoding: EncodingKind, max_level: i16) -> Result<Self> {
        verify_arg!(max_level, max_level >= 0);
        let bit_width = level_bit_width(max_level);
        let source = match encoding {
            EncodingKind::Rle => LevelSource::Rle {
                decoder: RleDecoder::new(bit_width)?,
                length_prefix: true,
            },
            EncodingKind::BitPacked => LevelSource::BitPacked(BitReader::default()),
            other => {
                return Err(Error::not_implemented(format!("{other:?} level encoding")));
            }
        };
        Ok(LevelDecoder {
            source,
            max_level,
            bit_width,
            num_values: 0,
            initialized: false,
        })
    }

    /// Decoder for V2 data pages, whose level streams carry no length prefix.
    pub fn v2(max_level: i16) -> Result<Self> {
        verify_arg!(max_level, max_level >= 0);
        let bit_width = level_bit_width(max_level);
        Ok(LevelDecoder {
            source: LevelSource::Rle {
                decoder: RleDecoder::new(bit_width)?,
                length_prefix: false,
            },
            max_level,
            bit_width,
            num_values: 0,
            initialized: false,
        })
    }

    pub fn bit_width(&self) -> u32 {
        self.bit_width
    }

    /// Binds the decoder to the level stream at the start of `data`, holding
    /// `num_values` levels. Returns the number of bytes the stream occupies,
    /// so the caller can locate what follows it in the page.
    pub fn set_data(&mut self, num_values: usize, data: Bytes) -> Result<usize> {
        self.initialized = false;
        let consumed = match &mut self.source {
            LevelSource::Rle {
                decoder,
                length_prefix: true,
            } => {
                let (stream, consumed) = split_length_prefix(&data, "level stream")?;
                decoder.set_data(stream);
                consumed
            }
            LevelSource::Rle { decoder, .. } => {
                let consumed = data.len();
                decoder.set_data(data);
                consumed
            }
            LevelSource::BitPacked(reader) => {
                let bits = num_values.checked_mul(self.bit_width as usize).ok_or_else(|| {
                    Error::overflow(format!("{num_values} levels of {} bits", self.bit_width))
                })?;
                let needed = bytes_for_bits(bits);
                if needed > data.len() {
                    return Err(Error::truncated("bit-packed levels", needed, data.len()));
                }
                reader.reset(data.slice(..needed));
                needed
            }
        };
        self.num_values = num_values;
        self.initialized = true;
        Ok(consumed)
    }

    /// Decodes up to `out.len()` levels. Returns the number of levels read
    /// and how many of them equal the maximum level, which is the number of
    /// physical values present for them.
    pub fn decode(&mut self, out: &mut [i16]) -> Result<(usize, usize)> {
        if !self.initialized {
            return Err(Error::invalid_operation("decode called before set_data"));
        }
        let count = out.len().min(self.num_values);
        let out = &mut out[..count];
        let read = match &mut self.source {
            LevelSource::Rle { decoder, .. } => decoder.get_batch(out)?,
            LevelSource::BitPacked(reader) => reader.get_batch(self.bit_width, out),
        };
        if read < count {
            return Err(Error::truncated("levels", count, read));
        }

        let mut at_max = 0;
        for &level in out.iter() {
            if level < 0 || level > self.max_level {
                return Err(Error::invalid_value(
                    "level",
                    format!("{level} exceeds the maximum level {}", self.max_level),
                ));
            }
            at_max += (level == self.max_level) as usize;
        }
        self.num_values -= count;
        Ok((count, at_max))
    }

    /// Skips up to `num_values` levels and returns how many were skipped.
    pub fn discard(&mut self, num_values: usize) -> Result<usize> {
        if !self.initialized {
            return Err(Error::invalid_operation("discard called before set_data"));
        }
        let count = num_values.min(self.num_values);
        let skipped = match &mut self.source {
            LevelSource::Rle { decoder, .. } => decoder.skip(count)?,
            LevelSource::BitPacked(reader) => {
                if reader.skip_values(self.bit_width, count) {
                    count
                } else {
                    0
                }
            }
        };
        if skipped < count {
            return Err(Error::truncated("levels", count, skipped));
        }
        self.num_values -= count;
        Ok(count)
    }

    pub fn values_left(&self) -> usize {
        self.num_values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colpage_common::error::ErrorKind;

    fn random_levels(len: usize, max_level: i16) -> Vec<i16> {
        let mut levels = Vec::with_capacity(len);
        while levels.len() < len {
            let level = fastrand::i16(0..=max_level);
            let run = fastrand::usize(1..12).min(len - levels.len());
            levels.extend(std::iter::repeat_n(level, run));
        }
        levels
    }

    #[test]
    fn test_level_bit_width() {
        assert_eq!(level_bit_width(0), 0);
        assert_eq!(level_bit_width(1), 1);
        assert_eq!(level_bit_width(2), 2);
        assert_eq!(level_bit_width(3), 2);
        assert_eq!(level_bit_width(4), 3);
        assert_eq!(level_bit_width(i16::MAX), 15);
    }

    #[test]
    fn test_v1_rle_round_trip() {
        for max_level in [1i16, 3, 7, 100] {
            let levels = random_levels(1000, max_level);
            let mut encoder = LevelEncoder::v1(EncodingKind::Rle, max_level).unwrap();
            encoder.put(&levels).unwrap();
            let mut page = encoder.flush().unwrap().to_vec();
            let stream_len = page.len();
            page.extend_from_slice(b"values");
            assert!(stream_len <= max_level_buffer_size(EncodingKind::Rle, max_level, 1000).unwrap());

            let mut decoder = LevelDecoder::v1(EncodingKind::Rle, max_level).unwrap();
            let consumed = decoder.set_data(levels.len(), Bytes::from(page.clone())).unwrap();
            assert_eq!(consumed, stream_len);
            assert_eq!(&page[consumed..], b"values");

            let mut out = vec![0i16; levels.len()];
            let (read, at_max) = decoder.decode(&mut out).unwrap();
            assert_eq!(read, levels.len());
            assert_eq!(out, levels);
            assert_eq!(at_max, levels.iter().filter(|&&l| l == max_level).count());
        }
    }

    #[test]
    fn test_v2_without_prefix() {
        let levels = random_levels(77, 2);
        let mut encoder = LevelEncoder::v2(2).unwrap();
        encoder.put(&levels).unwrap();
        let page = encoder.flush().unwrap();

        let mut decoder = LevelDecoder::v2(2).unwrap();
        assert_eq!(decoder.set_data(77, page.clone()).unwrap(), page.len());
        assert_eq!(decoder.discard(7).unwrap(), 7);
        let mut out = vec![0i16; 100];
        let (read, _) = decoder.decode(&mut out).unwrap();
        assert_eq!(read, 70);
        assert_eq!(&out[..70], &levels[7..]);
    }

    #[test]
    fn test_bit_packed_layout() {
        let mut encoder = LevelEncoder::v1(EncodingKind::BitPacked, 3).unwrap();
        assert_eq!(encoder.encoding(), EncodingKind::BitPacked);
        encoder.put(&[0, 1, 2, 3, 3]).unwrap();
        let page = encoder.flush().unwrap();
        assert_eq!(&page[..], &[0b1110_0100, 0b0000_0011]);

        let mut decoder = LevelDecoder::v1(EncodingKind::BitPacked, 3).unwrap();
        assert_eq!(decoder.set_data(5, page).unwrap(), 2);
        let mut out = [0i16; 5];
        assert_eq!(decoder.decode(&mut out).unwrap(), (5, 2));
        assert_eq!(out, [0, 1, 2, 3, 3]);
        assert_eq!(max_level_buffer_size(EncodingKind::BitPacked, 3, 5).unwrap(), 2);
    }

    #[test]
    fn test_zero_max_level() {
        let mut encoder = LevelEncoder::v1(EncodingKind::Rle, 0).unwrap();
        encoder.put(&[0; 10]).unwrap();
        let page = encoder.flush().unwrap();
        let mut decoder = LevelDecoder::v1(EncodingKind::Rle, 0).unwrap();
        decoder.set_data(10, page).unwrap();
        let mut out = [5i16; 10];
        assert_eq!(decoder.decode(&mut out).unwrap(), (10, 10));
        assert_eq!(out, [0; 10]);
    }

    #[test]
    fn test_level_out_of_range() {
        let mut encoder = LevelEncoder::v2(1).unwrap();
        let err = encoder.put(&[0, 2]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));

        // A run of one level 3 in a stream whose maximum is 1; width 1 still
        // stores the run value in one whole byte.
        let mut decoder = LevelDecoder::v2(1).unwrap();
        decoder.set_data(1, Bytes::from_static(&[2, 3])).unwrap();
        let err = decoder.decode(&mut [0i16; 1]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidValue { .. }));
    }

    #[test]
    fn test_corrupt_streams() {
        let mut decoder = LevelDecoder::v1(EncodingKind::Rle, 1).unwrap();
        let err = decoder.set_data(4, Bytes::from_static(&[9, 0, 0, 0, 1])).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Truncated { .. }));
        let err = decoder.decode(&mut [0i16; 4]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));

        let mut decoder = LevelDecoder::v1(EncodingKind::BitPacked, 7).unwrap();
        let err = decoder.set_data(10, Bytes::from_static(&[0xff; 3])).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Truncated { needed: 4, .. }));

        assert!(LevelDecoder::v1(EncodingKind::Plain, 1).is_err());
        assert!(LevelEncoder::v2(-1).is_err());
    }
}
