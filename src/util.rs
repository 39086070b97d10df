//! Binary field helpers shared by the walker and the rebuilder.
//!
//! ISO9660 stores most numeric fields twice, once little-endian and once
//! big-endian, in back-to-back slots. Both copies are always read and written
//! through the helpers here so that a patch can never update only one half.

use std::io::{self, Write};

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};

// =============================================================================
// Fast Unaligned Reads
// =============================================================================

/// Reads a little-endian u32 from a byte slice at the given offset.
///
/// # Panics
///
/// Panics if `offset + 4 > data.len()`.
#[inline(always)]
pub fn read_u32_le_at(data: &[u8], offset: usize) -> u32 {
    LittleEndian::read_u32(&data[offset..])
}

// =============================================================================
// Both-Endian Fields
// =============================================================================

/// Reads the little-endian half of a both-endian u32 field.
#[inline(always)]
pub fn read_both_endian_u32(field: &[u8; 8]) -> u32 {
    LittleEndian::read_u32(&field[..4])
}

/// Reads the little-endian half of a both-endian u16 field.
#[inline(always)]
pub fn read_both_endian_u16(field: &[u8; 4]) -> u16 {
    LittleEndian::read_u16(&field[..2])
}

/// Encodes a u32 as a both-endian field: LE copy followed by BE copy.
#[inline]
pub fn both_endian_u32(value: u32) -> [u8; 8] {
    let mut field = [0u8; 8];
    LittleEndian::write_u32(&mut field[..4], value);
    BigEndian::write_u32(&mut field[4..], value);
    field
}

/// Writes a u32 to a stream as a both-endian field.
///
/// The writer must already be positioned on the LE slot.
pub fn write_both_endian_u32<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(value)?;
    writer.write_u32::<BigEndian>(value)
}

// =============================================================================
// Alignment Utilities
// =============================================================================

/// Aligns a value up to the given power-of-two alignment.
#[inline(always)]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Checks if a value is aligned to the given power-of-two alignment.
#[inline(always)]
pub const fn is_aligned(value: u64, alignment: u64) -> bool {
    debug_assert!(alignment.is_power_of_two());
    (value & (alignment - 1)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_endian_layout() {
        let field = both_endian_u32(0x0102_0304);
        assert_eq!(field, [0x04, 0x03, 0x02, 0x01, 0x01, 0x02, 0x03, 0x04]);
        assert_eq!(read_both_endian_u32(&field), 0x0102_0304);
    }

    #[test]
    fn test_write_both_endian_matches_encoding() {
        let mut out = Vec::new();
        write_both_endian_u32(&mut out, 5000).unwrap();
        assert_eq!(out, both_endian_u32(5000));
    }

    #[test]
    fn test_read_fields() {
        assert_eq!(read_both_endian_u16(&[0x01, 0x00, 0x00, 0x01]), 1);
        assert_eq!(read_u32_le_at(&[0xFF, 0x04, 0x03, 0x02, 0x01], 1), 0x0102_0304);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 0x800), 0);
        assert_eq!(align_up(1, 0x800), 0x800);
        assert_eq!(align_up(0x800, 0x800), 0x800);
        assert_eq!(align_up(0x801, 0x800), 0x1000);
        assert_eq!(align_up(0x8001, 0x8000), 0x10000);
        assert!(is_aligned(0x10000, 0x8000));
        assert!(!is_aligned(3000, 0x800));
    }
}
