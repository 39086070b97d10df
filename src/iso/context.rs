//! Source disc image handling.
//!
//! The source image is memory-mapped read-only and every structure is read
//! straight out of the mapping with bounds checks, so a damaged or truncated
//! image surfaces as an error instead of a panic.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::debug;
use zerocopy::FromBytes;

use super::structs::*;
use crate::error::{Error, Result};
use crate::util::read_u32_le_at;

/// Smallest image that still holds a primary volume descriptor.
pub const MIN_IMAGE_SIZE: u64 = PVD_OFFSET + SECTOR_SIZE;

/// A memory-mapped source disc image.
#[derive(Debug)]
pub struct DiscImage {
    /// Mapped image bytes
    pub mmap: Mmap,
    /// Path to the image file
    pub path: PathBuf,
}

impl DiscImage {
    /// Opens and maps a disc image.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = File::open(&path).map_err(|e| Error::FileOpen {
            path: path.clone(),
            source: e,
        })?;

        let len = file
            .metadata()
            .map_err(|e| Error::FileOpen {
                path: path.clone(),
                source: e,
            })?
            .len();
        if len < MIN_IMAGE_SIZE {
            return Err(Error::ImageTooSmall {
                needed: MIN_IMAGE_SIZE,
                available: len,
            });
        }

        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MemoryMap {
            path: path.clone(),
            source: e,
        })?;

        debug!("Mapped {} ({} bytes)", path.display(), mmap.len());

        Ok(Self { mmap, path })
    }

    /// Returns the whole image.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.mmap
    }

    /// Image length in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Returns true if the image is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Volume space size recorded in the primary volume descriptor.
    pub fn volume_space_size(&self) -> u32 {
        read_u32_le_at(self.data(), VOLUME_SIZE_OFFSET as usize)
    }
}

/// Returns `len` bytes of `data` starting at `offset`.
pub fn slice_at<'a>(data: &'a [u8], offset: u64, len: u64, what: &'static str) -> Result<&'a [u8]> {
    let end = offset.checked_add(len);
    match end {
        Some(end) if end <= data.len() as u64 => Ok(&data[offset as usize..end as usize]),
        _ => Err(Error::Truncated { what, offset, len }),
    }
}

/// Reads the directory record starting at `offset`.
///
/// The read position after the name is rounded up to an even offset (one
/// padding byte) and any system-use bytes covered by the record length are
/// skipped; [`DirectoryRecord::next`] points past both.
pub fn read_record(data: &[u8], offset: u64) -> Result<DirectoryRecord> {
    let fixed = slice_at(
        data,
        offset,
        DirectoryRecordHeader::SIZE as u64,
        "directory record",
    )?;
    let header = DirectoryRecordHeader::read_from_bytes(fixed).map_err(|_| Error::Truncated {
        what: "directory record",
        offset,
        len: DirectoryRecordHeader::SIZE as u64,
    })?;

    let name_offset = offset + DirectoryRecordHeader::SIZE as u64;
    let name = slice_at(data, name_offset, header.name_length as u64, "record name")?.to_vec();

    let mut pos = name_offset + header.name_length as u64;
    if pos % 2 == 1 {
        pos += 1;
    }

    if (header.length as u64) < pos - offset {
        return Err(Error::unsupported(
            offset,
            "record length is shorter than its name",
        ));
    }
    let next = offset + header.length as u64;

    Ok(DirectoryRecord {
        offset,
        header,
        name,
        next,
    })
}

/// Reads the root directory record embedded in the primary volume descriptor.
pub fn read_root_record(data: &[u8]) -> Result<DirectoryRecord> {
    let root = read_record(data, ROOT_RECORD_OFFSET)?;
    if !root.is_directory() {
        return Err(Error::unsupported(
            ROOT_RECORD_OFFSET,
            "root directory record is not flagged as a directory",
        ));
    }
    Ok(root)
}
