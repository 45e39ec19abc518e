/// Rounds `value` down to a multiple of `align` (a power of two).
#[inline]
pub const fn align_down(value: usize, align: usize) -> usize {
    value & !(align - 1)
}

/// Rounds `value` up to a multiple of `align` (a power of two).
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Extracts bits `start..=end` of a register held least-significant word
/// first (`words[i]` carries bits `32 * i .. 32 * i + 31`).
///
/// The field may straddle a word boundary but must be at most 32 bits wide.
pub fn extract_bits(words: &[u32], start: u32, end: u32) -> u32 {
    debug_assert!(end >= start && end - start < 32);

    let mut value = 0u32;
    for bit in (start..=end).rev() {
        let word = words.get((bit / 32) as usize).copied().unwrap_or(0);
        value = (value << 1) | ((word >> (bit % 32)) & 1);
    }
    value
}

/// Extracts bits `start..=end` of a big-endian byte stream whose first byte
/// holds the most significant bits of a `bytes.len() * 8` bit register.
pub fn extract_bits_be(bytes: &[u8], start: u32, end: u32) -> u32 {
    debug_assert!(end >= start && end - start < 32);

    let top = bytes.len() as u32 * 8 - 1;
    let mut value = 0u32;
    for bit in (start..=end).rev() {
        let byte = bytes.get(((top - bit) / 8) as usize).copied().unwrap_or(0);
        value = (value << 1) | ((byte as u32 >> (bit % 8)) & 1);
    }
    value
}
