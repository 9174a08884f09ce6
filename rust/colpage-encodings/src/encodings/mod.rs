use crate::types::PhysicalType;
use bytes::Bytes;
use colpage_bytes::ByteBuffer;
use colpage_common::{Result, error::Error};

pub mod boolean;
pub mod byte_stream_split;
pub mod delta_bit_pack;
pub mod delta_byte_array;
pub mod delta_length_byte_array;
pub mod dictionary;
pub mod levels;
pub mod plain;
pub mod rle;
pub mod spacing;

/// Page value encodings, numbered as they appear in the container's page headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum EncodingKind {
    Plain = 0,
    PlainDictionary = 2,
    Rle = 3,
    BitPacked = 4,
    DeltaBinaryPacked = 5,
    DeltaLengthByteArray = 6,
    DeltaByteArray = 7,
    RleDictionary = 8,
    ByteStreamSplit = 9,
}

impl EncodingKind {
    /// Whether the encoding stores dictionary indices rather than values.
    pub fn is_dictionary(&self) -> bool {
        matches!(
            self,
            EncodingKind::PlainDictionary | EncodingKind::RleDictionary
        )
    }
}

impl TryFrom<i32> for EncodingKind {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(EncodingKind::Plain),
            2 => Ok(EncodingKind::PlainDictionary),
            3 => Ok(EncodingKind::Rle),
            4 => Ok(EncodingKind::BitPacked),
            5 => Ok(EncodingKind::DeltaBinaryPacked),
            6 => Ok(EncodingKind::DeltaLengthByteArray),
            7 => Ok(EncodingKind::DeltaByteArray),
            8 => Ok(EncodingKind::RleDictionary),
            9 => Ok(EncodingKind::ByteStreamSplit),
            _ => Err(Error::invalid_value(
                "encoding",
                format!("unknown encoding code {value}"),
            )),
        }
    }
}

/// Number of values materialized per step when a decoder skips values
/// by decoding them into scratch space.
const DISCARD_BATCH_SIZE: usize = 1024;

/// Reconstructs values of one physical kind from an encoded page.
///
/// A decoder is bound to a page with [`Decoder::set_data`] and can be rebound
/// to any number of subsequent pages. Calling any decoding method before the
/// first `set_data` fails with `InvalidOperation`.
pub trait Decoder<T: PhysicalType>: Send {
    fn encoding(&self) -> EncodingKind;

    /// Binds the decoder to `data`, which holds `num_values` encoded values.
    fn set_data(&mut self, num_values: usize, data: Bytes) -> Result<()>;

    /// Decodes up to `out.len()` values and returns how many were produced.
    /// Returns fewer only when the page holds fewer remaining values.
    fn decode(&mut self, out: &mut [T::Value]) -> Result<usize>;

    /// Decodes `out.len() - null_count` values and spreads them over `out`
    /// so that the slots of null rows (unset bits of `valid_bits`, starting
    /// at `valid_bits_offset`) are skipped. Null slots are left with
    /// unspecified contents.
    fn decode_spaced(
        &mut self,
        out: &mut [T::Value],
        null_count: usize,
        valid_bits: &[u8],
        valid_bits_offset: usize,
    ) -> Result<usize> {
        let num_values = out.len();
        let values_to_read = num_values
            .checked_sub(null_count)
            .ok_or_else(|| Error::invalid_arg("null_count", "exceeds the output length"))?;
        let values_read = self.decode(&mut out[..values_to_read])?;
        if values_read != values_to_read {
            return Err(Error::count_mismatch(values_to_read, values_read));
        }
        spacing::spaced_expand(out, null_count, valid_bits, valid_bits_offset)
    }

    /// Skips up to `num_values` values and returns how many were skipped.
    fn discard(&mut self, num_values: usize) -> Result<usize> {
        let mut scratch = vec![T::Value::default(); num_values.min(DISCARD_BATCH_SIZE)];
        let mut skipped = 0;
        while skipped < num_values {
            let batch = (num_values - skipped).min(scratch.len());
            let read = self.decode(&mut scratch[..batch])?;
            skipped += read;
            if read < batch {
                break;
            }
        }
        Ok(skipped)
    }

    /// Number of values not yet produced from the current page.
    fn values_left(&self) -> usize;
}

/// Accumulates values of one physical kind and produces an encoded page.
pub trait Encoder<T: PhysicalType>: Send {
    fn encoding(&self) -> EncodingKind;

    fn put(&mut self, values: &[T::Value]) -> Result<()>;

    /// Encodes only the values whose bit in `valid_bits` (starting at
    /// `valid_bits_offset`) is set; `values` holds one slot per row.
    fn put_spaced(
        &mut self,
        values: &[T::Value],
        valid_bits: &[u8],
        valid_bits_offset: usize,
    ) -> Result<()> {
        let compacted = spacing::spaced_compress(values, valid_bits, valid_bits_offset)?;
        self.put(&compacted)
    }

    /// Estimate of the size of the page `flush` would produce now.
    fn estimated_encoded_size(&self) -> usize;

    /// Finishes the page, returning its bytes, and resets the encoder so it
    /// can start the next page.
    fn flush(&mut self) -> Result<Bytes>;
}

/// An encoder that replaces values with indices into a dictionary it builds
/// along the way. The dictionary is written out separately as a plain page.
pub trait DictionaryEncoder<T: PhysicalType>: Encoder<T> {
    /// Appends the plain-encoded dictionary entries, in index order, to `out`.
    fn write_dictionary(&self, out: &mut ByteBuffer) -> Result<()>;

    /// Size in bytes of the plain-encoded dictionary.
    fn dictionary_encoded_size(&self) -> usize;

    fn num_entries(&self) -> usize;

    /// Width of the indices the next `flush` will write.
    fn bit_width(&self) -> u32;

    /// Seeds the dictionary with distinct, non-null `values`. Only valid
    /// before anything else was inserted.
    fn put_dictionary(&mut self, values: &[T::Value]) -> Result<()>;
}

/// Fails with `InvalidOperation` when a decoder is used before it was bound to data.
#[inline]
pub(crate) fn ensure_initialized(initialized: bool, operation: &str) -> Result<()> {
    if initialized {
        Ok(())
    } else {
        Err(Error::invalid_operation(format!(
            "{operation} called before set_data"
        )))
    }
}
