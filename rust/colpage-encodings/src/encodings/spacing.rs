//! Conversion between compact value slices (one slot per non-null row) and
//! spaced slices (one slot per row) driven by a caller-owned validity bitmap.

use colpage_bits::bitmap::{ReverseSetBitRunReader, SetBitRunReader, count_set_bits};
use colpage_common::{Result, error::Error, verify_arg};

fn check_bitmap(valid_bits: &[u8], valid_bits_offset: usize, num_values: usize) -> Result<()> {
    let required = valid_bits_offset
        .checked_add(num_values)
        .ok_or_else(|| Error::overflow("validity bitmap range"))?;
    verify_arg!(valid_bits, required <= valid_bits.len() * 8);
    Ok(())
}

/// Spreads the first `buffer.len() - null_count` values of `buffer` over the
/// positions whose validity bit is set, in place. Returns `buffer.len()`.
///
/// Runs of valid rows are visited from the last to the first and each run is
/// moved back to front. A value is only ever moved to a position at or after
/// its compact position, so no value is overwritten before it has been moved.
/// Slots of null rows receive whatever value was swapped out of the way.
pub fn spaced_expand<T>(
    buffer: &mut [T],
    null_count: usize,
    valid_bits: &[u8],
    valid_bits_offset: usize,
) -> Result<usize> {
    let num_values = buffer.len();
    check_bitmap(valid_bits, valid_bits_offset, num_values)?;
    let mut values_to_move = num_values
        .checked_sub(null_count)
        .ok_or_else(|| Error::invalid_arg("null_count", "exceeds the buffer length"))?;
    let valid_count = count_set_bits(valid_bits, valid_bits_offset, num_values);
    if valid_count != values_to_move {
        return Err(Error::count_mismatch(values_to_move, valid_count));
    }

    for run in ReverseSetBitRunReader::new(valid_bits, valid_bits_offset, num_values) {
        let src_start = values_to_move - run.length;
        if src_start != run.position {
            for i in (0..run.length).rev() {
                buffer.swap(run.position + i, src_start + i);
            }
        }
        values_to_move = src_start;
    }
    debug_assert_eq!(values_to_move, 0);
    Ok(num_values)
}

/// Collects the values of `values` whose validity bit is set.
pub fn spaced_compress<T: Clone>(
    values: &[T],
    valid_bits: &[u8],
    valid_bits_offset: usize,
) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(values.len());
    spaced_compress_into(values, valid_bits, valid_bits_offset, &mut out)?;
    Ok(out)
}

/// Appends the values of `values` whose validity bit is set to `out` and
/// returns how many were appended.
pub fn spaced_compress_into<T: Clone>(
    values: &[T],
    valid_bits: &[u8],
    valid_bits_offset: usize,
    out: &mut Vec<T>,
) -> Result<usize> {
    check_bitmap(valid_bits, valid_bits_offset, values.len())?;
    let start = out.len();
    for run in SetBitRunReader::new(valid_bits, valid_bits_offset, values.len()) {
        out.extend_from_slice(&values[run.position..run.position + run.length]);
    }
    Ok(out.len() - start)
}
