//! Value encodings for the pages of a columnar table file.
//!
//! Every codec is generic over exactly one physical type (see [`types`]).
//! Callers obtain encoders and decoders through the factories in [`factory`],
//! feed them values (optionally spaced around a validity bitmap) or page
//! bytes, and get back encoded buffers or materialized values.

pub mod config;
pub mod encodings;
pub mod factory;
pub mod types;

mod buffers_pool;

pub use buffers_pool::{BufferPoolRef, BuffersPool};
pub use config::EncodingConfig;
pub use encodings::{Decoder, DictionaryEncoder, EncodingKind, Encoder};
pub use factory::{get_decoder, get_dict_decoder, get_dict_encoder, get_encoder};
