//! Dictionary encoding: values are replaced with indices into a table of
//! distinct values. The table is written once as a plain-encoded dictionary
//! page; data pages hold a 1-byte index bit width followed by the indices
//! as an RLE / bit-packed stream.

mod decoder;
mod encoder;
mod memo_table;

pub use decoder::DictDecoder;
pub use encoder::DictEncoder;
pub use memo_table::MemoTable;

/// Largest index bit width a data page may declare.
pub const MAX_INDEX_BIT_WIDTH: u32 = 32;

/// Bit width of indices into a dictionary of `num_entries` entries.
#[inline]
pub fn index_bit_width(num_entries: usize) -> u32 {
    match num_entries {
        0 => 0,
        1 => 1,
        n => colpage_bits::log2_ceil(n as u64),
    }
}
