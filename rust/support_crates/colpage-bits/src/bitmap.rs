//! Helpers over caller-owned validity bitmaps.
//!
//! Bitmaps are LSB-first: bit `i` of the bitmap lives in byte `i / 8` at bit
//! position `i % 8`. Every function takes an explicit bit `offset` so callers
//! can address a window of a larger bitmap without copying it.

/// Maps a byte to its eight bits as booleans, LSB first.
const fn bit_unpack_table() -> [[bool; 8]; 256] {
    let mut table = [[false; 8]; 256];
    let mut byte = 0;
    while byte < 256 {
        let mut bit = 0;
        while bit < 8 {
            table[byte][bit] = (byte >> bit) & 1 == 1;
            bit += 1;
        }
        byte += 1;
    }
    table
}

static BIT_UNPACK_TABLE: [[bool; 8]; 256] = bit_unpack_table();

#[inline]
pub fn get_bit(bits: &[u8], i: usize) -> bool {
    bits[i / 8] & (1 << (i % 8)) != 0
}

#[inline]
pub fn set_bit(bits: &mut [u8], i: usize) {
    bits[i / 8] |= 1 << (i % 8);
}

#[inline]
pub fn clear_bit(bits: &mut [u8], i: usize) {
    bits[i / 8] &= !(1 << (i % 8));
}

#[inline]
pub fn set_bit_to(bits: &mut [u8], i: usize, value: bool) {
    if value {
        set_bit(bits, i)
    } else {
        clear_bit(bits, i)
    }
}

/// Counts the set bits in `bits[offset..offset + len]`.
pub fn count_set_bits(bits: &[u8], offset: usize, len: usize) -> usize {
    let end = offset + len;
    let mut pos = offset;
    let mut count = 0;
    while pos < end && pos % 8 != 0 {
        count += get_bit(bits, pos) as usize;
        pos += 1;
    }
    let mut words = bits[pos / 8..end / 8].chunks_exact(8);
    for word in words.by_ref() {
        let word = u64::from_le_bytes([
            word[0], word[1], word[2], word[3], word[4], word[5], word[6], word[7],
        ]);
        count += word.count_ones() as usize;
    }
    for &byte in words.remainder() {
        count += byte.count_ones() as usize;
    }
    pos = (end / 8 * 8).max(pos);
    while pos < end {
        count += get_bit(bits, pos) as usize;
        pos += 1;
    }
    count
}

/// Packs booleans into bits, LSB first, starting at bit 0 of `out`.
///
/// Bits past `values.len()` in the last touched byte are cleared.
pub fn pack_bools(values: &[bool], out: &mut [u8]) {
    let mut chunks = values.chunks_exact(8);
    let mut byte_idx = 0;
    for chunk in chunks.by_ref() {
        let mut byte = 0u8;
        for (bit, &value) in chunk.iter().enumerate() {
            byte |= (value as u8) << bit;
        }
        out[byte_idx] = byte;
        byte_idx += 1;
    }
    let rem = chunks.remainder();
    if !rem.is_empty() {
        let mut byte = 0u8;
        for (bit, &value) in rem.iter().enumerate() {
            byte |= (value as u8) << bit;
        }
        out[byte_idx] = byte;
    }
}

/// Expands `out.len()` bits of `bits`, starting at bit `offset`, into booleans.
pub fn unpack_bools(bits: &[u8], offset: usize, out: &mut [bool]) {
    assert!(offset + out.len() <= bits.len() * 8);
    let mut out_idx = 0;
    let mut pos = offset;
    while out_idx < out.len() && pos % 8 != 0 {
        out[out_idx] = get_bit(bits, pos);
        out_idx += 1;
        pos += 1;
    }
    let mut chunks = out[out_idx..].chunks_exact_mut(8);
    let mut byte_idx = pos / 8;
    for chunk in chunks.by_ref() {
        chunk.copy_from_slice(&BIT_UNPACK_TABLE[bits[byte_idx] as usize]);
        byte_idx += 1;
    }
    let rem = chunks.into_remainder();
    if !rem.is_empty() {
        let len = rem.len();
        rem.copy_from_slice(&BIT_UNPACK_TABLE[bits[byte_idx] as usize][..len]);
    }
}

/// A maximal run of consecutive set bits: `length` bits starting at `position`
/// (relative to the reader's offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetBitRun {
    pub position: usize,
    pub length: usize,
}

/// Iterates over runs of set bits in a bitmap window, front to back.
pub struct SetBitRunReader<'a> {
    bits: &'a [u8],
    offset: usize,
    pos: usize,
    len: usize,
}

impl<'a> SetBitRunReader<'a> {
    pub fn new(bits: &'a [u8], offset: usize, len: usize) -> Self {
        assert!(offset + len <= bits.len() * 8);
        SetBitRunReader {
            bits,
            offset,
            pos: 0,
            len,
        }
    }

    #[inline]
    fn bit(&self, i: usize) -> bool {
        get_bit(self.bits, self.offset + i)
    }

    /// Advances `self.pos` while the bit at it equals `value`, skipping whole
    /// bytes when possible.
    fn skip_while(&mut self, value: bool) {
        let full = if value { 0xff } else { 0x00 };
        while self.pos < self.len {
            let abs = self.offset + self.pos;
            if abs % 8 == 0 && self.pos + 8 <= self.len && self.bits[abs / 8] == full {
                self.pos += 8;
                continue;
            }
            if self.bit(self.pos) != value {
                break;
            }
            self.pos += 1;
        }
    }
}

impl Iterator for SetBitRunReader<'_> {
    type Item = SetBitRun;

    fn next(&mut self) -> Option<SetBitRun> {
        self.skip_while(false);
        if self.pos >= self.len {
            return None;
        }
        let start = self.pos;
        self.skip_while(true);
        Some(SetBitRun {
            position: start,
            length: self.pos - start,
        })
    }
}

/// Iterates over runs of set bits in a bitmap window, back to front.
pub struct ReverseSetBitRunReader<'a> {
    bits: &'a [u8],
    offset: usize,
    /// Number of bits not yet visited; the next bit to inspect is `end - 1`.
    end: usize,
}

impl<'a> ReverseSetBitRunReader<'a> {
    pub fn new(bits: &'a [u8], offset: usize, len: usize) -> Self {
        assert!(offset + len <= bits.len() * 8);
        ReverseSetBitRunReader {
            bits,
            offset,
            end: len,
        }
    }

    fn skip_while(&mut self, value: bool) {
        let full = if value { 0xff } else { 0x00 };
        while self.end > 0 {
            let abs_end = self.offset + self.end;
            if abs_end % 8 == 0 && self.end >= 8 && self.bits[abs_end / 8 - 1] == full {
                self.end -= 8;
                continue;
            }
            if get_bit(self.bits, self.offset + self.end - 1) != value {
                break;
            }
            self.end -= 1;
        }
    }
}

impl Iterator for ReverseSetBitRunReader<'_> {
    type Item = SetBitRun;

    fn next(&mut self) -> Option<SetBitRun> {
        self.skip_while(false);
        if self.end == 0 {
            return None;
        }
        let run_end = self.end;
        self.skip_while(true);
        Some(SetBitRun {
            position: self.end,
            length: run_end - self.end,
        })
    }
}
