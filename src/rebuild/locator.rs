//! Locating the start of the replaceable file data.
//!
//! The mastering toolchain writes one UDF file entry sector per directory
//! record, each tagged with the `*UDF DVD CGMS Info` implementation identifier,
//! plus one more before the file payloads begin. The boundary is recorded
//! nowhere else, so it is found by counting those sectors.

use tracing::debug;

use crate::error::{Error, Result};
use crate::iso::SECTOR_SIZE;

/// Identifier marking a UDF file entry sector.
pub const UDF_MARKER: &[u8; 18] = b"*UDF DVD CGMS Info";

/// Offset of the identifier inside its sector.
pub const UDF_MARKER_OFFSET: usize = 269;

/// Bytes of the image prefix that are scanned.
pub const SCAN_PREFIX_LEN: usize = 0xF6_0000;

/// Sector ceiling of the scan.
pub const SCAN_SECTOR_LIMIT: usize = 7862;

/// Returns the number of marker sectors expected for `total_inodes` records.
#[inline]
pub fn expected_markers(total_inodes: u32) -> u32 {
    // One marker per directory record plus one trailing marker.
    total_inodes.saturating_add(1)
}

/// Returns true if the sector starting at `offset` carries the UDF marker.
#[inline]
fn is_marker_sector(data: &[u8], offset: usize) -> Option<bool> {
    let start = offset + UDF_MARKER_OFFSET;
    data.get(start..start + UDF_MARKER.len())
        .map(|field| field == UDF_MARKER)
}

/// Finds the byte offset at which file payloads begin.
///
/// `image` may be the whole image; only its first [`SCAN_PREFIX_LEN`] bytes
/// are looked at. The returned offset is always sector aligned and never past
/// the end of `image`.
pub fn locate_data_region(image: &[u8], total_inodes: u32) -> Result<u64> {
    let prefix = &image[..image.len().min(SCAN_PREFIX_LEN)];
    let expected = expected_markers(total_inodes);
    let sector = SECTOR_SIZE as usize;

    let mut found = 0u32;
    for lba in 0..SCAN_SECTOR_LIMIT {
        match is_marker_sector(prefix, lba * sector) {
            Some(true) => found += 1,
            Some(false) => {}
            None => break,
        }

        if found == expected {
            let data_start = (lba as u64 + 1) * SECTOR_SIZE;
            // The last marker sector is part of the header and must be whole.
            if data_start > image.len() as u64 {
                return Err(Error::Truncated {
                    what: "image header",
                    offset: lba as u64 * SECTOR_SIZE,
                    len: SECTOR_SIZE,
                });
            }
            debug!(
                "Found {} UDF markers, data region starts at {:#x} (LBA {})",
                found,
                data_start,
                lba + 1
            );
            return Ok(data_start);
        }
    }

    Err(Error::ScanExhausted {
        found,
        expected,
        sectors: SCAN_SECTOR_LIMIT,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_with_markers(sectors: usize, marked: &[usize]) -> Vec<u8> {
        let mut data = vec![0u8; sectors * SECTOR_SIZE as usize];
        for &lba in marked {
            let start = lba * SECTOR_SIZE as usize + UDF_MARKER_OFFSET;
            data[start..start + UDF_MARKER.len()].copy_from_slice(UDF_MARKER);
        }
        data
    }

    #[test]
    fn test_contiguous_run() {
        // total_inodes = 3 -> 4 markers at sectors 0..=3
        let data = image_with_markers(8, &[0, 1, 2, 3]);
        assert_eq!(locate_data_region(&data, 3).unwrap(), 4 * SECTOR_SIZE);
    }

    #[test]
    fn test_markers_after_gap() {
        let data = image_with_markers(64, &[20, 21, 30, 31, 32]);
        assert_eq!(locate_data_region(&data, 4).unwrap(), 33 * SECTOR_SIZE);
    }

    #[test]
    fn test_stops_at_expected_count() {
        // Extra markers after the expected run belong to the data region.
        let data = image_with_markers(16, &[2, 3, 4, 9]);
        assert_eq!(locate_data_region(&data, 2).unwrap(), 5 * SECTOR_SIZE);
    }

    #[test]
    fn test_missing_marker_exhausts_scan() {
        let data = image_with_markers(8, &[0, 1, 2]);
        let err = locate_data_region(&data, 3).unwrap_err();
        assert!(matches!(
            err,
            Error::ScanExhausted {
                found: 3,
                expected: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_marker_must_be_at_fixed_offset() {
        let mut data = image_with_markers(4, &[0]);
        let misplaced = SECTOR_SIZE as usize + UDF_MARKER_OFFSET + 1;
        data[misplaced..misplaced + UDF_MARKER.len()].copy_from_slice(UDF_MARKER);
        assert!(locate_data_region(&data, 1).is_err());
        assert_eq!(locate_data_region(&data, 0).unwrap(), SECTOR_SIZE);
    }

    #[test]
    fn test_partial_last_marker_sector() {
        let mut data = image_with_markers(4, &[1, 2]);
        data.truncate(2 * SECTOR_SIZE as usize + 300);
        let err = locate_data_region(&data, 1).unwrap_err();
        assert!(matches!(
            err,
            Error::Truncated {
                what: "image header",
                offset,
                ..
            } if offset == 2 * SECTOR_SIZE
        ));
    }

    #[test]
    fn test_sector_ceiling() {
        let data = image_with_markers(SCAN_SECTOR_LIMIT + 2, &[SCAN_SECTOR_LIMIT]);
        assert!(locate_data_region(&data, 0).is_err());
    }
}
