//! ISO9660 on-disc structures and fixed offsets.
//!
//! Only the pieces the extractor and rebuilder touch are modelled: the fixed
//! part of a directory record, the file flags, and the handful of absolute
//! offsets inside the volume descriptors and the trailing anchor sector.

use bitflags::bitflags;
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::util::{read_both_endian_u16, read_both_endian_u32};

/// Logical sector size of the image.
pub const SECTOR_SIZE: u64 = 0x800;

/// Primary volume descriptor location (sector 16).
pub const PVD_OFFSET: u64 = 16 * SECTOR_SIZE;

/// Root directory record embedded in the primary volume descriptor.
pub const ROOT_RECORD_OFFSET: u64 = PVD_OFFSET + 156;

/// Volume space size field of the primary volume descriptor (both-endian u32).
pub const VOLUME_SIZE_OFFSET: u64 = PVD_OFFSET + 80;

/// Distance from end of image to the volume size copy inside the footer sector.
pub const FOOTER_VOLUME_SIZE_FROM_END: u64 = 0x7F4;

/// Name of the "self" record.
pub const SELF_NAME: &[u8] = &[0x00];

/// Name of the "parent" record.
pub const PARENT_NAME: &[u8] = &[0x01];

/// Version suffix appended to file names.
pub const VERSION_SUFFIX: &str = ";1";

// =============================================================================
// Directory Record
// =============================================================================

bitflags! {
    /// Directory record file flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileFlags: u8 {
        /// Hidden from directory listings
        const HIDDEN = 1 << 0;
        /// Record describes a directory
        const DIRECTORY = 1 << 1;
        /// Associated file
        const ASSOCIATED = 1 << 2;
        /// Extended attribute record carries format information
        const RECORD = 1 << 3;
        /// Extended attribute record carries permissions
        const PROTECTION = 1 << 4;
        /// High-order size bits relocated elsewhere (unsupported)
        const HIGH_SIZE_RELOCATED = 1 << 6;
        /// File continues in another record (unsupported)
        const MULTI_EXTENT = 1 << 7;
    }
}

/// Fixed 33-byte part of a directory record, followed by the name.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DirectoryRecordHeader {
    /// Total record length, name and padding included
    pub length: u8,
    /// Extended attribute record length
    pub ext_attr_length: u8,
    /// Extent location (both-endian u32)
    pub extent: [u8; 8],
    /// Data length (both-endian u32)
    pub data_length: [u8; 8],
    /// Recording date and time
    pub recorded: [u8; 7],
    /// File flags
    pub flags: u8,
    /// File unit size for interleaved files
    pub file_unit_size: u8,
    /// Interleave gap size
    pub interleave_gap: u8,
    /// Volume sequence number (both-endian u16)
    pub volume_sequence: [u8; 4],
    /// Length of the name that follows
    pub name_length: u8,
}

impl DirectoryRecordHeader {
    /// Size of the fixed part.
    pub const SIZE: usize = 33;

    /// Offset of the extent field, the first patched byte on rebuild.
    pub const EXTENT_OFFSET: u64 = 2;

    /// Extent location in sectors.
    #[inline]
    pub fn extent(&self) -> u32 {
        read_both_endian_u32(&self.extent)
    }

    /// Data length in bytes.
    #[inline]
    pub fn data_length(&self) -> u32 {
        read_both_endian_u32(&self.data_length)
    }

    /// Volume sequence number.
    #[inline]
    pub fn volume_sequence(&self) -> u16 {
        read_both_endian_u16(&self.volume_sequence)
    }

    /// Parsed file flags (unknown bits are kept).
    #[inline]
    pub fn flags(&self) -> FileFlags {
        FileFlags::from_bits_retain(self.flags)
    }
}

/// A directory record read during traversal.
#[derive(Debug, Clone)]
pub struct DirectoryRecord {
    /// Byte offset of the record inside the image (the "inode offset")
    pub offset: u64,
    /// Fixed fields
    pub header: DirectoryRecordHeader,
    /// Raw name bytes
    pub name: Vec<u8>,
    /// Offset of the first byte after this record
    pub next: u64,
}

impl DirectoryRecord {
    /// Returns true for the "." and ".." entries.
    pub fn is_self_or_parent(&self) -> bool {
        self.name == SELF_NAME || self.name == PARENT_NAME
    }

    /// Returns true if the record describes a directory.
    pub fn is_directory(&self) -> bool {
        self.header.flags().contains(FileFlags::DIRECTORY)
    }

    /// Byte offset of the record's extent inside the image.
    pub fn data_offset(&self) -> u64 {
        self.header.extent() as u64 * SECTOR_SIZE
    }

    /// Byte offset one past the end of the record's extent.
    pub fn data_end(&self) -> u64 {
        self.data_offset() + self.header.data_length() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::both_endian_u32;

    #[test]
    fn test_header_size() {
        assert_eq!(std::mem::size_of::<DirectoryRecordHeader>(), DirectoryRecordHeader::SIZE);
    }

    #[test]
    fn test_fixed_offsets() {
        assert_eq!(ROOT_RECORD_OFFSET, 0x809C);
        assert_eq!(VOLUME_SIZE_OFFSET, 0x8050);
    }

    #[test]
    fn test_header_fields() {
        let mut raw = [0u8; DirectoryRecordHeader::SIZE];
        raw[0] = 40;
        raw[2..10].copy_from_slice(&both_endian_u32(100));
        raw[10..18].copy_from_slice(&both_endian_u32(3000));
        raw[25] = 0x02 | 0x40;
        raw[28..32].copy_from_slice(&[1, 0, 0, 1]);
        raw[32] = 7;

        let header = DirectoryRecordHeader::read_from_bytes(&raw[..]).unwrap();
        assert_eq!(header.extent(), 100);
        assert_eq!(header.data_length(), 3000);
        assert_eq!(header.volume_sequence(), 1);
        assert!(header.flags().contains(FileFlags::DIRECTORY));
        assert!(header.flags().contains(FileFlags::HIGH_SIZE_RELOCATED));
        assert_eq!(header.name_length, 7);
    }
}
