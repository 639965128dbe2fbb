//! Record checksum arithmetic.
//!
//! An Intel HEX record ends with one byte chosen so that the sum of every
//! byte in the record (length, both address bytes, type, payload, checksum)
//! is zero modulo 256. All arithmetic here stays in `u8` with wrapping ops.

/// Compute the checksum byte for the given record bytes.
///
/// This is the two's complement of the 8-bit sum of `bytes`.
///
/// # Examples
///
/// ```
/// use hexpatch::checksum::checksum;
///
/// // :0200000400 00 FA
/// assert_eq!(checksum(&[0x02, 0x00, 0x00, 0x04, 0x00, 0x00]), 0xFA);
/// // :00000001FF
/// assert_eq!(checksum(&[0x00, 0x00, 0x00, 0x01]), 0xFF);
/// ```
pub fn checksum(bytes: &[u8]) -> u8 {
    sum(bytes).wrapping_neg()
}

/// Check that a full record (checksum included) sums to zero.
pub fn verify(record_bytes: &[u8]) -> bool {
    sum(record_bytes) == 0
}

fn sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}
