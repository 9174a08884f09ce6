//! Byte buffers used by the colpage codecs: a growable write buffer with
//! power-of-two capacity, a read cursor over shared immutable bytes, and
//! sizing helpers.

pub mod align;
pub mod buffer;
pub mod cursor;

pub use buffer::ByteBuffer;
pub use cursor::ByteCursor;
