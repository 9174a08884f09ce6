//! Core definitions (error type, result alias and validation helpers),
//! relied upon by all colpage-* crates.

pub mod error;
pub mod macros;
pub mod result;

pub use result::Result;
