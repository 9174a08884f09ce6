/// Number of bytes needed to hold `bits` bits.
#[inline]
pub fn bytes_for_bits(bits: usize) -> usize {
    bits.div_ceil(8)
}

/// Capacity to allocate for a buffer that must hold at least `required` bytes:
/// the next power of two, but never less than `min_capacity`.
///
/// Returns `None` when the power of two would not fit into `usize`.
#[inline]
pub fn power_of_two_capacity(required: usize, min_capacity: usize) -> Option<usize> {
    required.max(min_capacity).checked_next_power_of_two()
}
