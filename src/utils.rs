//! Helpers for converting between integers and bit strings.

/// The number of bits needed to represent `value`, at least 1.
pub fn bit_length(value: u64) -> u32 {
    (u64::BITS - value.leading_zeros()).max(1)
}

/// The `width` least significant bits of `value`, least significant bit first.
pub fn to_bits(value: u64, width: usize) -> Vec<bool> {
    (0..width)
        .map(|i| i < u64::BITS as usize && (value >> i) & 1 == 1)
        .collect()
}

/// Reads a little-endian bit string (at most 128 bits are significant).
pub fn from_bits(bits: &[bool]) -> u128 {
    bits.iter()
        .take(u128::BITS as usize)
        .enumerate()
        .fold(0, |acc, (i, bit)| acc | ((*bit as u128) << i))
}

#[test]
fn bit_helpers() {
    assert_eq!(bit_length(0), 1);
    assert_eq!(bit_length(5), 3);
    assert_eq!(bit_length(u64::MAX), 64);
    assert_eq!(to_bits(6, 4), vec![false, true, true, false]);
    assert_eq!(from_bits(&to_bits(9, 4)), 9);
    assert!(!to_bits(u64::MAX, 65)[64]);
}
