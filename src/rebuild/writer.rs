//! Output image assembly.
//!
//! The output is built front to back: the original header, then every
//! replacement file on a sector boundary, then alignment padding and the
//! original footer sector. Directory records live in the header, so after
//! each file the writer seeks back into it, patches the record's extent and
//! size, and returns to the end of the stream.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use crate::error::{Error, Result};
use crate::iso::{
    DirectoryRecordHeader, FOOTER_VOLUME_SIZE_FROM_END, SECTOR_SIZE, VOLUME_SIZE_OFFSET,
};
use crate::manifest::FileListEntry;
use crate::util::{align_up, is_aligned, write_both_endian_u32};

/// Chunk size used when streaming replacement files.
pub const COPY_CHUNK_SIZE: usize = 0x8_0000;

/// Alignment of the end of the file data region.
pub const REGION_ALIGNMENT: u64 = 0x8000;

/// Trailing padding added by the vendor mastering tool (20 MiB minus the
/// footer sector).
pub const MASTERING_PADDING: u64 = 0x140_0000 - SECTOR_SIZE;

/// Bytes patched per directory record: both-endian extent and size.
const RECORD_PATCH_LEN: u64 = 16;

/// Streams a rebuilt image and patches its metadata in place.
#[derive(Debug)]
pub struct ImageWriter<W: Write + Seek> {
    out: W,
    path: PathBuf,
    header_len: u64,
    position: u64,
}

impl<W: Write + Seek> ImageWriter<W> {
    /// Wraps `out`, positioned at its start. `path` is used in error messages.
    pub fn new<P: AsRef<Path>>(out: W, path: P) -> Self {
        Self {
            out,
            path: path.as_ref().to_path_buf(),
            header_len: 0,
            position: 0,
        }
    }

    /// Current length of the output.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Consumes the writer and returns the underlying stream.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn io_error(&self, source: io::Error) -> Error {
        Error::FileWrite {
            path: self.path.clone(),
            source,
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes).map_err(|e| self.io_error(e))?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn write_zeros(&mut self, count: u64) -> Result<()> {
        let written = io::copy(&mut io::repeat(0).take(count), &mut self.out)
            .map_err(|e| self.io_error(e))?;
        self.position += written;
        Ok(())
    }

    /// Zero-pads the output up to the next multiple of `alignment`.
    pub fn pad_to(&mut self, alignment: u64) -> Result<()> {
        let target = align_up(self.position, alignment);
        self.write_zeros(target - self.position)
    }

    /// Writes the original header verbatim; records are patched inside it.
    pub fn write_header(&mut self, header: &[u8]) -> Result<()> {
        self.write_bytes(header)?;
        self.header_len = self.position;
        Ok(())
    }

    /// Overwrites `fields` at `offset` inside the header and returns to the end.
    fn patch_header(&mut self, offset: u64, fields: &[u32]) -> Result<()> {
        let len = fields.len() as u64 * 8;
        match offset.checked_add(len) {
            Some(end) if end <= self.header_len => {}
            _ => {
                return Err(Error::PatchOutOfBounds {
                    offset,
                    header_len: self.header_len,
                })
            }
        }

        let end = self.position;
        let result = (|| -> io::Result<()> {
            self.out.seek(SeekFrom::Start(offset))?;
            for &value in fields {
                write_both_endian_u32(&mut self.out, value)?;
            }
            self.out.seek(SeekFrom::Start(end))?;
            Ok(())
        })();
        result.map_err(|e| self.io_error(e))
    }

    /// Rewrites the extent and size of the directory record at `inode_offset`.
    pub fn patch_record(&mut self, inode_offset: u64, lba: u32, size: u32) -> Result<()> {
        let field = inode_offset
            .checked_add(DirectoryRecordHeader::EXTENT_OFFSET)
            .filter(|field| {
                field
                    .checked_add(RECORD_PATCH_LEN)
                    .is_some_and(|end| end <= self.header_len)
            })
            .ok_or(Error::PatchOutOfBounds {
                offset: inode_offset,
                header_len: self.header_len,
            })?;
        self.patch_header(field, &[lba, size])
    }

    /// Appends a replacement file and repoints its directory record at it.
    ///
    /// Returns the new extent location.
    pub fn insert_file(&mut self, entry: &FileListEntry, source: &Path) -> Result<u32> {
        if !source.is_file() {
            return Err(Error::ReplacementNotFound {
                path: entry.relative_path(),
            });
        }

        let mut file = File::open(source).map_err(|e| Error::FileOpen {
            path: source.to_path_buf(),
            source: e,
        })?;
        let declared = file
            .metadata()
            .map_err(|e| Error::FileOpen {
                path: source.to_path_buf(),
                source: e,
            })?
            .len();
        if declared > u32::MAX as u64 {
            return Err(Error::ReplacementTooLarge {
                path: entry.relative_path(),
                size: declared,
            });
        }

        let start = self.position;
        debug_assert!(is_aligned(start, SECTOR_SIZE));
        let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
        loop {
            let read = file.read(&mut buffer).map_err(|e| Error::FileOpen {
                path: source.to_path_buf(),
                source: e,
            })?;
            if read == 0 {
                break;
            }
            self.write_bytes(&buffer[..read])?;
        }

        let size = self.position - start;
        let size = u32::try_from(size).map_err(|_| Error::ReplacementTooLarge {
            path: entry.relative_path(),
            size,
        })?;
        self.pad_to(SECTOR_SIZE)?;

        let lba = (start / SECTOR_SIZE) as u32;
        self.patch_record(entry.inode_offset, lba, size)?;

        debug!(
            "Inserted {} ({} bytes at LBA {})",
            entry.display_path(),
            size,
            lba
        );

        Ok(lba)
    }

    /// Finishes the image: alignment, optional padding, footer and volume size.
    ///
    /// Returns the volume size written into the descriptors.
    pub fn finish(mut self, footer: &[u8], with_padding: bool) -> Result<u32> {
        self.pad_to(REGION_ALIGNMENT)?;
        if with_padding {
            self.write_zeros(MASTERING_PADDING)?;
        }

        let volume_size = (self.position / SECTOR_SIZE) as u32;
        self.write_bytes(footer)?;

        self.patch_header(VOLUME_SIZE_OFFSET, &[volume_size])?;

        let anchor = self
            .position
            .checked_sub(FOOTER_VOLUME_SIZE_FROM_END)
            .ok_or(Error::Truncated {
                what: "footer sector",
                offset: self.position,
                len: FOOTER_VOLUME_SIZE_FROM_END,
            })?;
        let end = self.position;
        let result = (|| -> io::Result<()> {
            self.out.seek(SeekFrom::Start(anchor))?;
            self.out.write_u32::<LittleEndian>(volume_size)?;
            self.out.seek(SeekFrom::Start(end))?;
            self.out.flush()
        })();
        result.map_err(|e| self.io_error(e))?;

        debug!("Volume size set to {} sectors", volume_size);

        Ok(volume_size)
    }
}
