//! Physical value model: the on-disk value kinds and the Rust types that
//! carry their values through the codecs.

use bytes::Bytes;
use std::{fmt::Debug, hash::Hash};

/// Raw on-disk value kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalKind {
    Boolean,
    Int32,
    Int64,
    Int96,
    Float,
    Double,
    ByteArray,
    FixedLenByteArray,
}

impl PhysicalKind {
    /// Size in bytes of a single value for fixed-width kinds other than
    /// fixed-length byte arrays, whose width is a per-column property.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            PhysicalKind::Int32 | PhysicalKind::Float => Some(4),
            PhysicalKind::Int64 | PhysicalKind::Double => Some(8),
            PhysicalKind::Int96 => Some(12),
            PhysicalKind::Boolean | PhysicalKind::ByteArray | PhysicalKind::FixedLenByteArray => {
                None
            }
        }
    }
}

/// Legacy 96-bit integer, stored as three little-endian 32-bit words.
/// Carries no arithmetic semantics.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, bytemuck::Pod, bytemuck::Zeroable,
)]
#[repr(C)]
pub struct Int96([u32; 3]);

impl Int96 {
    pub const fn new(words: [u32; 3]) -> Int96 {
        Int96(words)
    }

    pub fn data(&self) -> &[u32; 3] {
        &self.0
    }

    pub fn to_le_bytes(&self) -> [u8; 12] {
        let mut out = [0u8; 12];
        for (chunk, word) in out.chunks_exact_mut(4).zip(self.0) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    pub fn from_le_bytes(bytes: [u8; 12]) -> Int96 {
        let word = |i: usize| {
            u32::from_le_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]])
        };
        Int96([word(0), word(1), word(2)])
    }
}

impl From<[u32; 3]> for Int96 {
    fn from(words: [u32; 3]) -> Self {
        Int96(words)
    }
}

macro_rules! bytes_value {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Bytes);

        impl $name {
            pub fn new(data: Bytes) -> Self {
                $name(data)
            }

            #[inline]
            pub fn len(&self) -> usize {
                self.0.len()
            }

            #[inline]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            #[inline]
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            /// Shared handle to the underlying bytes.
            #[inline]
            pub fn data(&self) -> &Bytes {
                &self.0
            }

            pub fn into_inner(self) -> Bytes {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = [u8];

            fn deref(&self) -> &[u8] {
                &self.0
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<Bytes> for $name {
            fn from(data: Bytes) -> Self {
                $name(data)
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(data: Vec<u8>) -> Self {
                $name(Bytes::from(data))
            }
        }

        impl From<&[u8]> for $name {
            fn from(data: &[u8]) -> Self {
                $name(Bytes::copy_from_slice(data))
            }
        }

        impl From<&str> for $name {
            fn from(data: &str) -> Self {
                $name(Bytes::copy_from_slice(data.as_bytes()))
            }
        }

        impl From<String> for $name {
            fn from(data: String) -> Self {
                $name(Bytes::from(data))
            }
        }
    };
}

bytes_value!(
    /// Variable-length byte string. Decoded values are zero-copy views into
    /// the page buffer they were decoded from.
    ByteArray
);

bytes_value!(
    /// Byte string whose width is fixed for the whole column.
    FixedLenByteArray
);

/// Values that are byte strings, either variable or fixed length.
pub trait BytesValue: Clone + Default + Send + Sync + 'static {
    fn bytes(&self) -> &[u8];

    fn from_bytes(data: Bytes) -> Self;
}

impl BytesValue for ByteArray {
    #[inline]
    fn bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    fn from_bytes(data: Bytes) -> Self {
        ByteArray(data)
    }
}

impl BytesValue for FixedLenByteArray {
    #[inline]
    fn bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    fn from_bytes(data: Bytes) -> Self {
        FixedLenByteArray(data)
    }
}

/// Key under which a value is deduplicated by the dictionary encoder.
///
/// Floating point values are keyed by their bit pattern, so `-0.0` and `0.0`
/// get separate entries and every NaN payload is its own entry.
pub trait DictionaryValue {
    type Key: Hash + Eq + Clone + Send + Sync;

    fn dictionary_key(&self) -> Self::Key;
}

macro_rules! identity_dictionary_key {
    ($($T:ty),*) => {
        $(
            impl DictionaryValue for $T {
                type Key = $T;

                #[inline]
                fn dictionary_key(&self) -> $T {
                    self.clone()
                }
            }
        )*
    };
}

identity_dictionary_key!(bool, i32, i64, Int96, ByteArray, FixedLenByteArray);

impl DictionaryValue for f32 {
    type Key = u32;

    #[inline]
    fn dictionary_key(&self) -> u32 {
        self.to_bits()
    }
}

impl DictionaryValue for f64 {
    type Key = u64;

    #[inline]
    fn dictionary_key(&self) -> u64 {
        self.to_bits()
    }
}

/// Compile-time tag for one physical kind. Every codec is generic over
/// exactly one implementor.
pub trait PhysicalType: Send + Sync + 'static {
    type Value: Clone + Default + PartialEq + Debug + Send + Sync + 'static;

    const KIND: PhysicalKind;
}

macro_rules! physical_type {
    ($name:ident, $value:ty, $kind:ident) => {
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl PhysicalType for $name {
            type Value = $value;

            const KIND: PhysicalKind = PhysicalKind::$kind;
        }
    };
}

physical_type!(BooleanType, bool, Boolean);
physical_type!(Int32Type, i32, Int32);
physical_type!(Int64Type, i64, Int64);
physical_type!(Int96Type, Int96, Int96);
physical_type!(FloatType, f32, Float);
physical_type!(DoubleType, f64, Double);
physical_type!(ByteArrayType, ByteArray, ByteArray);
physical_type!(FixedLenByteArrayType, FixedLenByteArray, FixedLenByteArray);
