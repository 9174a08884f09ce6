use super::{index_bit_width, memo_table::MemoTable};
use crate::{
    buffers_pool::{BufferPoolRef, BuffersPool},
    config::EncodingConfig,
    encodings::{
        DictionaryEncoder, Encoder, EncodingKind,
        plain::{PlainValue, plain_type_length},
        rle::RleEncoder,
    },
    types::{DictionaryValue, PhysicalType},
};
use bytes::Bytes;
use colpage_bytes::ByteBuffer;
use colpage_common::{Result, error::Error};
use std::marker::PhantomData;

/// Dictionary encoder for one column.
///
/// The dictionary outlives data pages: `flush` emits the indices buffered
/// since the previous flush and keeps the table, so later pages keep
/// referring to the same entries.
pub struct DictEncoder<T>
where
    T: PhysicalType,
    T::Value: DictionaryValue,
{
    table: MemoTable<T::Value>,
    /// Plain encoding of the table entries, in index order.
    dictionary: BufferPoolRef<'static>,
    indices: Vec<u32>,
    type_length: usize,
    _marker: PhantomData<T>,
}

impl<T> DictEncoder<T>
where
    T: PhysicalType,
    T::Value: DictionaryValue + PlainValue,
{
    pub fn new(config: &EncodingConfig) -> Result<Self> {
        Ok(DictEncoder {
            table: MemoTable::new(),
            dictionary: BuffersPool::global().get_buffer(),
            indices: Vec::new(),
            type_length: plain_type_length::<T>(config)?,
            _marker: PhantomData,
        })
    }

    pub fn memo_table(&self) -> &MemoTable<T::Value> {
        &self.table
    }

    /// Number of indices buffered for the next data page.
    pub fn num_buffered_indices(&self) -> usize {
        self.indices.len()
    }

    fn index_of(&mut self, value: &T::Value) -> Result<u32> {
        let index = match self.table.get(value) {
            Some(index) => index,
            None => {
                T::Value::encode_plain(
                    std::slice::from_ref(value),
                    self.type_length,
                    &mut self.dictionary,
                )?;
                self.table.get_or_insert(value).0
            }
        };
        Ok(u32::try_from(index)?)
    }
}

impl<T> Encoder<T> for DictEncoder<T>
where
    T: PhysicalType,
    T::Value: DictionaryValue + PlainValue,
{
    fn encoding(&self) -> EncodingKind {
        EncodingKind::RleDictionary
    }

    fn put(&mut self, values: &[T::Value]) -> Result<()> {
        self.indices.reserve(values.len());
        for value in values {
            let index = self.index_of(value)?;
            self.indices.push(index);
        }
        Ok(())
    }

    fn estimated_encoded_size(&self) -> usize {
        1 + RleEncoder::<ByteBuffer>::max_buffer_size(self.bit_width(), self.indices.len())
    }

    fn flush(&mut self) -> Result<Bytes> {
        let bit_width = self.bit_width();
        let mut rle = RleEncoder::with_buffer(BuffersPool::global().get_buffer(), bit_width);
        for &index in &self.indices {
            rle.put(index as u64);
        }
        let stream = rle.consume();
        self.indices.clear();

        let mut page = ByteBuffer::with_capacity(1 + stream.len());
        page.push(bit_width as u8);
        page.extend_from_slice(&stream);
        Ok(page.take_bytes())
    }
}

impl<T> DictionaryEncoder<T> for DictEncoder<T>
where
    T: PhysicalType,
    T::Value: DictionaryValue + PlainValue,
{
    fn write_dictionary(&self, out: &mut ByteBuffer) -> Result<()> {
        out.extend_from_slice(&self.dictionary);
        Ok(())
    }

    fn dictionary_encoded_size(&self) -> usize {
        self.dictionary.len()
    }

    fn num_entries(&self) -> usize {
        self.table.len()
    }

    fn bit_width(&self) -> u32 {
        index_bit_width(self.table.len())
    }

    fn put_dictionary(&mut self, values: &[T::Value]) -> Result<()> {
        if !self.table.is_empty() || !self.indices.is_empty() {
            return Err(Error::invalid_operation(
                "put_dictionary on a dictionary that already has entries",
            ));
        }
        for value in values {
            if self.table.get(value).is_some() {
                self.table.clear();
                self.dictionary.clear();
                return Err(Error::invalid_arg(
                    "values",
                    format!("duplicate dictionary entry {value:?}"),
                ));
            }
            if let Err(e) = self.index_of(value) {
                self.table.clear();
                self.dictionary.clear();
                return Err(e);
            }
        }
        log::debug!(
            "dictionary seeded with {} entries ({} bytes)",
            self.table.len(),
            self.dictionary.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ByteArray, ByteArrayType, FixedLenByteArray, FixedLenByteArrayType, Int32Type,
    };
    use colpage_common::error::ErrorKind;

    #[test]
    fn test_indices_page_layout() {
        let mut encoder = DictEncoder::<Int32Type>::new(&EncodingConfig::default()).unwrap();
        encoder.put(&[10, 20, 10, 30, 20, 10, 40, 10]).unwrap();
        assert_eq!(encoder.num_entries(), 4);
        assert_eq!(encoder.bit_width(), 2);
        assert_eq!(encoder.dictionary_encoded_size(), 16);

        let page = encoder.flush().unwrap();
        // Width byte, then one bit-packed group: indices 0 1 0 2 1 0 3 0.
        assert_eq!(&page[..], &[2, 3, 0b1000_0100, 0b0011_0001]);

        let mut dictionary = ByteBuffer::new();
        encoder.write_dictionary(&mut dictionary).unwrap();
        assert_eq!(dictionary.typed_data::<i32>(), &[10, 20, 30, 40]);
    }

    #[test]
    fn test_table_survives_flush() {
        let mut encoder = DictEncoder::<ByteArrayType>::new(&EncodingConfig::default()).unwrap();
        encoder.put(&[ByteArray::from("x"), ByteArray::from("y")]).unwrap();
        encoder.flush().unwrap();
        assert_eq!(encoder.num_buffered_indices(), 0);
        encoder.put(&[ByteArray::from("y"), ByteArray::from("z")]).unwrap();
        assert_eq!(encoder.num_entries(), 3);
        assert_eq!(encoder.memo_table().get(&ByteArray::from("y")), Some(1));
        assert_eq!(encoder.dictionary_encoded_size(), 3 * 5);
    }

    #[test]
    fn test_empty_and_single_entry_widths() {
        let mut encoder = DictEncoder::<Int32Type>::new(&EncodingConfig::default()).unwrap();
        assert_eq!(encoder.bit_width(), 0);
        assert_eq!(&encoder.flush().unwrap()[..], &[0]);
        encoder.put(&[5, 5, 5]).unwrap();
        assert_eq!(encoder.bit_width(), 1);
        assert!(encoder.estimated_encoded_size() > 1);
    }

    #[test]
    fn test_put_dictionary() {
        let mut encoder = DictEncoder::<Int32Type>::new(&EncodingConfig::default()).unwrap();
        encoder.put_dictionary(&[3, 1, 2]).unwrap();
        assert_eq!(encoder.num_entries(), 3);
        encoder.put(&[2, 3]).unwrap();
        assert_eq!(encoder.memo_table().get(&2), Some(2));

        let err = encoder.put_dictionary(&[9]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));
    }

    #[test]
    fn test_put_dictionary_rejects_duplicates() {
        let mut encoder = DictEncoder::<Int32Type>::new(&EncodingConfig::default()).unwrap();
        let err = encoder.put_dictionary(&[1, 2, 1]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
        assert_eq!(encoder.num_entries(), 0);
        assert_eq!(encoder.dictionary_encoded_size(), 0);
        encoder.put_dictionary(&[1, 2]).unwrap();
    }

    #[test]
    fn test_fixed_len_width_enforced() {
        let config = EncodingConfig::default().with_type_length(2);
        let mut encoder = DictEncoder::<FixedLenByteArrayType>::new(&config).unwrap();
        encoder.put(&[FixedLenByteArray::from("ab")]).unwrap();
        assert!(encoder.put(&[FixedLenByteArray::from("abc")]).is_err());
        assert_eq!(encoder.num_entries(), 1);
        assert!(DictEncoder::<FixedLenByteArrayType>::new(&EncodingConfig::default()).is_err());
    }
}
