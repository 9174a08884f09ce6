//! Construction of encoders and decoders by encoding kind.
//!
//! Each physical type implements [`CodecFactory`], listing the encodings it
//! supports. Asking for any other (encoding, type) pair fails with
//! `NotImplemented`.

use crate::{
    config::EncodingConfig,
    encodings::{
        Decoder, DictionaryEncoder, Encoder, EncodingKind,
        boolean::{PlainBooleanDecoder, PlainBooleanEncoder, RleBooleanDecoder, RleBooleanEncoder},
        byte_stream_split::{ByteStreamSplitDecoder, ByteStreamSplitEncoder},
        delta_bit_pack::{DeltaBitPackDecoder, DeltaBitPackEncoder},
        delta_byte_array::{DeltaByteArrayDecoder, DeltaByteArrayEncoder},
        delta_length_byte_array::{DeltaLengthByteArrayDecoder, DeltaLengthByteArrayEncoder},
        dictionary::{DictDecoder, DictEncoder},
        plain::{PlainDecoder, PlainEncoder},
    },
    types::{
        BooleanType, ByteArrayType, DoubleType, FixedLenByteArrayType, FloatType, Int32Type,
        Int64Type, Int96Type, PhysicalKind, PhysicalType,
    },
};
use colpage_common::{Result, error::Error};

/// Encoders and decoders available for one physical type.
pub trait CodecFactory: PhysicalType + Sized {
    fn decoder(encoding: EncodingKind, config: &EncodingConfig) -> Result<Box<dyn Decoder<Self>>>;

    fn encoder(encoding: EncodingKind, config: &EncodingConfig) -> Result<Box<dyn Encoder<Self>>>;

    fn dict_encoder(_config: &EncodingConfig) -> Result<Box<dyn DictionaryEncoder<Self>>> {
        Err(unsupported::<Self>(EncodingKind::RleDictionary))
    }

    fn dict_decoder(_config: &EncodingConfig) -> Result<DictDecoder<Self>> {
        Err(unsupported::<Self>(EncodingKind::RleDictionary))
    }
}

fn unsupported<T: PhysicalType>(encoding: EncodingKind) -> Error {
    Error::not_implemented(format!(
        "{encoding:?} encoding for {:?} values",
        T::KIND
    ))
}

/// Dictionary index pages cannot be decoded without their dictionary, so
/// they are only reachable through the dictionary factories.
fn unsupported_or_dictionary<T: PhysicalType>(encoding: EncodingKind) -> Error {
    if encoding.is_dictionary() && T::KIND != PhysicalKind::Boolean {
        Error::invalid_arg(
            "encoding",
            format!("{encoding:?} codecs are created with get_dict_encoder / get_dict_decoder"),
        )
    } else {
        unsupported::<T>(encoding)
    }
}

/// Creates a decoder of `encoding` for values of type `T`.
///
/// # Parameters
///
/// - `encoding`: The encoding of the pages the decoder will be bound to.
///   Dictionary encodings are rejected, see [`get_dict_decoder`].
/// - `config`: Column parameters; fixed-length byte array codecs require
///   `type_length`.
pub fn get_decoder<T: CodecFactory>(
    encoding: EncodingKind,
    config: &EncodingConfig,
) -> Result<Box<dyn Decoder<T>>> {
    T::decoder(encoding, config)
}

/// Creates an encoder of `encoding` for values of type `T`.
pub fn get_encoder<T: CodecFactory>(
    encoding: EncodingKind,
    config: &EncodingConfig,
) -> Result<Box<dyn Encoder<T>>> {
    T::encoder(encoding, config)
}

/// Creates a dictionary encoder for values of type `T`. Boolean columns
/// have no dictionary encoding.
pub fn get_dict_encoder<T: CodecFactory>(
    config: &EncodingConfig,
) -> Result<Box<dyn DictionaryEncoder<T>>> {
    T::dict_encoder(config)
}

/// Creates a dictionary decoder for values of type `T`. The decoder needs
/// its dictionary ([`DictDecoder::set_dict`]) before the first data page.
pub fn get_dict_decoder<T: CodecFactory>(config: &EncodingConfig) -> Result<DictDecoder<T>> {
    T::dict_decoder(config)
}

impl CodecFactory for BooleanType {
    fn decoder(encoding: EncodingKind, _config: &EncodingConfig) -> Result<Box<dyn Decoder<Self>>> {
        match encoding {
            EncodingKind::Plain => Ok(Box::new(PlainBooleanDecoder::new())),
            EncodingKind::Rle => Ok(Box::new(RleBooleanDecoder::new()?)),
            other => Err(unsupported_or_dictionary::<Self>(other)),
        }
    }

    fn encoder(encoding: EncodingKind, _config: &EncodingConfig) -> Result<Box<dyn Encoder<Self>>> {
        match encoding {
            EncodingKind::Plain => Ok(Box::new(PlainBooleanEncoder::new())),
            EncodingKind::Rle => Ok(Box::new(RleBooleanEncoder::new())),
            other => Err(unsupported_or_dictionary::<Self>(other)),
        }
    }
}

/// Dictionary factories shared by every type that supports them.
macro_rules! dictionary_factories {
    () => {
        fn dict_encoder(config: &EncodingConfig) -> Result<Box<dyn DictionaryEncoder<Self>>> {
            Ok(Box::new(DictEncoder::<Self>::new(config)?))
        }

        fn dict_decoder(_config: &EncodingConfig) -> Result<DictDecoder<Self>> {
            Ok(DictDecoder::new())
        }
    };
}

macro_rules! integer_factory {
    ($T:ty) => {
        impl CodecFactory for $T {
            fn decoder(encoding: EncodingKind, config: &EncodingConfig) -> Result<Box<dyn Decoder<Self>>> {
                match encoding {
                    EncodingKind::Plain => Ok(Box::new(PlainDecoder::<Self>::new(config)?)),
                    EncodingKind::DeltaBinaryPacked => Ok(Box::new(DeltaBitPackDecoder::<Self>::new())),
                    EncodingKind::ByteStreamSplit => {
                        Ok(Box::new(ByteStreamSplitDecoder::<Self>::new(config)?))
                    }
                    other => Err(unsupported_or_dictionary::<Self>(other)),
                }
            }

            fn encoder(encoding: EncodingKind, config: &EncodingConfig) -> Result<Box<dyn Encoder<Self>>> {
                match encoding {
                    EncodingKind::Plain => Ok(Box::new(PlainEncoder::<Self>::new(config)?)),
                    EncodingKind::DeltaBinaryPacked => Ok(Box::new(DeltaBitPackEncoder::<Self>::new())),
                    EncodingKind::ByteStreamSplit => {
                        Ok(Box::new(ByteStreamSplitEncoder::<Self>::new(config)?))
                    }
                    other => Err(unsupported_or_dictionary::<Self>(other)),
                }
            }

            dictionary_factories!();
        }
    };
}

integer_factory!(Int32Type);
integer_factory!(Int64Type);

impl CodecFactory for Int96Type {
    fn decoder(encoding: EncodingKind, config: &EncodingConfig) -> Result<Box<dyn Decoder<Self>>> {
        match encoding {
            EncodingKind::Plain => Ok(Box::new(PlainDecoder::<Self>::new(config)?)),
            other => Err(unsupported_or_dictionary::<Self>(other)),
        }
    }

    fn encoder(encoding: EncodingKind, config: &EncodingConfig) -> Result<Box<dyn Encoder<Self>>> {
        match encoding {
            EncodingKind::Plain => Ok(Box::new(PlainEncoder::<Self>::new(config)?)),
            other => Err(unsupported_or_dictionary::<Self>(other)),
        }
    }

    dictionary_factories!();
}

macro_rules! float_factory {
    ($T:ty) => {
        impl CodecFactory for $T {
            fn decoder(encoding: EncodingKind, config: &EncodingConfig) -> Result<Box<dyn Decoder<Self>>> {
                match encoding {
                    EncodingKind::Plain => Ok(Box::new(PlainDecoder::<Self>::new(config)?)),
                    EncodingKind::ByteStreamSplit => {
                        Ok(Box::new(ByteStreamSplitDecoder::<Self>::new(config)?))
                    }
                    other => Err(unsupported_or_dictionary::<Self>(other)),
                }
            }

            fn encoder(encoding: EncodingKind, config: &EncodingConfig) -> Result<Box<dyn Encoder<Self>>> {
                match encoding {
                    EncodingKind::Plain => Ok(Box::new(PlainEncoder::<Self>::new(config)?)),
                    EncodingKind::ByteStreamSplit => {
                        Ok(Box::new(ByteStreamSplitEncoder::<Self>::new(config)?))
                    }
                    other => Err(unsupported_or_dictionary::<Self>(other)),
                }
            }

            dictionary_factories!();
        }
    };
}

float_factory!(FloatType);
float_factory!(DoubleType);

impl CodecFactory for ByteArrayType {
    fn decoder(encoding: EncodingKind, config: &EncodingConfig) -> Result<Box<dyn Decoder<Self>>> {
        match encoding {
            EncodingKind::Plain => Ok(Box::new(PlainDecoder::<Self>::new(config)?)),
            EncodingKind::DeltaLengthByteArray => Ok(Box::new(DeltaLengthByteArrayDecoder::<Self>::new())),
            EncodingKind::DeltaByteArray => Ok(Box::new(DeltaByteArrayDecoder::<Self>::new(config)?)),
            other => Err(unsupported_or_dictionary::<Self>(other)),
        }
    }

    fn encoder(encoding: EncodingKind, config: &EncodingConfig) -> Result<Box<dyn Encoder<Self>>> {
        match encoding {
            EncodingKind::Plain => Ok(Box::new(PlainEncoder::<Self>::new(config)?)),
            EncodingKind::DeltaLengthByteArray => Ok(Box::new(DeltaLengthByteArrayEncoder::<Self>::new())),
            EncodingKind::DeltaByteArray => Ok(Box::new(DeltaByteArrayEncoder::<Self>::new(config)?)),
            other => Err(unsupported_or_dictionary::<Self>(other)),
        }
    }

    dictionary_factories!();
}

impl CodecFactory for FixedLenByteArrayType {
    fn decoder(encoding: EncodingKind, config: &EncodingConfig) -> Result<Box<dyn Decoder<Self>>> {
        match encoding {
            EncodingKind::Plain => Ok(Box::new(PlainDecoder::<Self>::new(config)?)),
            EncodingKind::DeltaByteArray => Ok(Box::new(DeltaByteArrayDecoder::<Self>::new(config)?)),
            EncodingKind::ByteStreamSplit => Ok(Box::new(ByteStreamSplitDecoder::<Self>::new(config)?)),
            other => Err(unsupported_or_dictionary::<Self>(other)),
        }
    }

    fn encoder(encoding: EncodingKind, config: &EncodingConfig) -> Result<Box<dyn Encoder<Self>>> {
        match encoding {
            EncodingKind::Plain => Ok(Box::new(PlainEncoder::<Self>::new(config)?)),
            EncodingKind::DeltaByteArray => Ok(Box::new(DeltaByteArrayEncoder::<Self>::new(config)?)),
            EncodingKind::ByteStreamSplit => Ok(Box::new(ByteStreamSplitEncoder::<Self>::new(config)?)),
            other => Err(unsupported_or_dictionary::<Self>(other)),
        }
    }

    dictionary_factories!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use colpage_common::error::ErrorKind;

    fn is_not_implemented<T>(result: Result<T>) -> bool {
        matches!(
            result.map(|_| ()).unwrap_err().kind(),
            ErrorKind::NotImplemented { .. }
        )
    }

    #[test]
    fn test_reported_encodings() {
        let config = EncodingConfig::default().with_type_length(4);
        let cases = [
            (EncodingKind::Plain, get_encoder::<Int32Type>(EncodingKind::Plain, &config).unwrap().encoding()),
            (
                EncodingKind::DeltaBinaryPacked,
                get_encoder::<Int64Type>(EncodingKind::DeltaBinaryPacked, &config).unwrap().encoding(),
            ),
            (EncodingKind::Rle, get_decoder::<BooleanType>(EncodingKind::Rle, &config).unwrap().encoding()),
            (
                EncodingKind::DeltaByteArray,
                get_decoder::<FixedLenByteArrayType>(EncodingKind::DeltaByteArray, &config)
                    .unwrap()
                    .encoding(),
            ),
            (
                EncodingKind::RleDictionary,
                get_dict_encoder::<DoubleType>(&config).unwrap().encoding(),
            ),
        ];
        for (expected, actual) in cases {
            assert_eq!(expected, actual);
        }
    }

    #[test]
    fn test_unsupported_pairs() {
        let config = EncodingConfig::default();
        assert!(is_not_implemented(get_decoder::<BooleanType>(EncodingKind::DeltaBinaryPacked, &config)));
        assert!(is_not_implemented(get_encoder::<Int32Type>(EncodingKind::Rle, &config)));
        assert!(is_not_implemented(get_encoder::<Int96Type>(EncodingKind::ByteStreamSplit, &config)));
        assert!(is_not_implemented(get_decoder::<FloatType>(EncodingKind::DeltaBinaryPacked, &config)));
        assert!(is_not_implemented(get_encoder::<ByteArrayType>(EncodingKind::ByteStreamSplit, &config)));
        assert!(is_not_implemented(get_decoder::<Int64Type>(EncodingKind::BitPacked, &config)));
        assert!(is_not_implemented(get_dict_encoder::<BooleanType>(&config)));
        assert!(is_not_implemented(get_dict_decoder::<BooleanType>(&config)));
        assert!(is_not_implemented(get_encoder::<BooleanType>(EncodingKind::RleDictionary, &config)));
    }

    #[test]
    fn test_dictionary_encodings_need_dictionary_factories() {
        let config = EncodingConfig::default();
        let err = get_decoder::<Int32Type>(EncodingKind::PlainDictionary, &config)
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
    }

    #[test]
    fn test_fixed_len_requires_type_length() {
        let config = EncodingConfig::default();
        assert!(get_encoder::<FixedLenByteArrayType>(EncodingKind::Plain, &config).is_err());
        assert!(get_decoder::<FixedLenByteArrayType>(EncodingKind::ByteStreamSplit, &config).is_err());
        assert!(get_dict_encoder::<FixedLenByteArrayType>(&config).is_err());
        let config = config.with_type_length(16);
        assert!(get_encoder::<FixedLenByteArrayType>(EncodingKind::Plain, &config).is_ok());
    }
}
