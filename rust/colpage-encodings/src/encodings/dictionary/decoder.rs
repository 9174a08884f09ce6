use super::MAX_INDEX_BIT_WIDTH;
use crate::{
    encodings::{Decoder, EncodingKind, ensure_initialized, rle::RleDecoder},
    types::PhysicalType,
};
use bytes::Bytes;
use colpage_common::{Result, error::Error, verify_data};

/// Decodes dictionary index pages against a dictionary materialized with
/// [`DictDecoder::set_dict`].
pub struct DictDecoder<T: PhysicalType> {
    dictionary: Vec<T::Value>,
    has_dictionary: bool,
    rle: RleDecoder,
    num_values: usize,
    initialized: bool,
    encoding: EncodingKind,
}

impl<T: PhysicalType> DictDecoder<T> {
    pub fn new() -> Self {
        Self::with_encoding(EncodingKind::RleDictionary)
    }

    /// A decoder reporting `encoding`, one of the two dictionary encodings.
    /// Both share the same index page layout.
    pub fn with_encoding(encoding: EncodingKind) -> Self {
        debug_assert!(encoding.is_dictionary());
        DictDecoder {
            dictionary: Vec::new(),
            has_dictionary: false,
            rle: RleDecoder::default(),
            num_values: 0,
            initialized: false,
            encoding,
        }
    }

    /// Materializes every value left in `decoder` as the dictionary.
    /// `decoder` is normally a plain decoder bound to the dictionary page.
    pub fn set_dict(&mut self, decoder: &mut dyn Decoder<T>) -> Result<()> {
        let num_entries = decoder.values_left();
        let mut entries = vec![T::Value::default(); num_entries];
        let read = decoder.decode(&mut entries)?;
        if read != num_entries {
            return Err(Error::count_mismatch(num_entries, read));
        }
        log::debug!(
            "materialized dictionary of {num_entries} {:?} entries",
            T::KIND
        );
        self.dictionary = entries;
        self.has_dictionary = true;
        Ok(())
    }

    pub fn dictionary(&self) -> &[T::Value] {
        &self.dictionary
    }
}

impl<T: PhysicalType> Default for DictDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PhysicalType> Decoder<T> for DictDecoder<T> {
    fn encoding(&self) -> EncodingKind {
        self.encoding
    }

    fn set_data(&mut self, num_values: usize, data: Bytes) -> Result<()> {
        self.initialized = false;
        if !self.has_dictionary {
            return Err(Error::invalid_operation("set_data called before set_dict"));
        }
        if data.is_empty() {
            return Err(Error::truncated("dictionary index bit width", 1, 0));
        }
        let bit_width = data[0] as u32;
        verify_data!(bit_width, bit_width <= MAX_INDEX_BIT_WIDTH);
        self.rle = RleDecoder::new(bit_width)?;
        self.rle.set_data(data.slice(1..));
        self.num_values = num_values;
        self.initialized = true;
        Ok(())
    }

    fn decode(&mut self, out: &mut [T::Value]) -> Result<usize> {
        ensure_initialized(self.initialized, "decode")?;
        let count = out.len().min(self.num_values);
        let read = self
            .rle
            .get_batch_with_dict(&self.dictionary, &mut out[..count])?;
        if read < count {
            return Err(Error::truncated("dictionary indices", count, read));
        }
        self.num_values -= count;
        Ok(count)
    }

    fn discard(&mut self, num_values: usize) -> Result<usize> {
        ensure_initialized(self.initialized, "discard")?;
        let count = num_values.min(self.num_values);
        let skipped = self.rle.skip(count)?;
        if skipped < count {
            return Err(Error::truncated("dictionary indices", count, skipped));
        }
        self.num_values -= count;
        Ok(count)
    }

    fn values_left(&self) -> usize {
        self.num_values
    }
}
