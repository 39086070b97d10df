//! Depth-first directory tree extraction.
//!
//! Directory records carry no parent pointers, so the walk keeps an explicit
//! stack of frames in place of recursion. Each frame remembers where its
//! directory extent ends, the path component it contributes, and the position
//! in the parent directory to resume from once the extent is exhausted.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::context::{read_record, read_root_record, slice_at};
use super::structs::*;
use crate::error::{Error, Result};
use crate::manifest::{FileListEntry, FileListManifest};
use crate::util::align_up;

/// Root component used when the destination has no usable folder name.
pub const DEFAULT_ROOT_NAME: &str = "ROOT";

/// One level of the descent.
#[derive(Debug, Clone)]
struct Frame {
    /// Start of the directory extent
    start: u64,
    /// End of the directory extent
    end: u64,
    /// Name of the directory (None for the root)
    component: Option<String>,
    /// Offset in the parent directory to resume from
    resume: u64,
}

/// Walks the directory record tree of an image and extracts every file.
#[derive(Debug)]
pub struct DirectoryTreeWalker<'a> {
    data: &'a [u8],
    destination: PathBuf,
    stack: Vec<Frame>,
    entries: Vec<FileListEntry>,
    total_inodes: u32,
    pos: u64,
}

impl<'a> DirectoryTreeWalker<'a> {
    /// Creates a walker over the image bytes that extracts into `destination`.
    pub fn new<P: AsRef<Path>>(data: &'a [u8], destination: P) -> Self {
        Self {
            data,
            destination: destination.as_ref().to_path_buf(),
            stack: Vec::new(),
            entries: Vec::new(),
            total_inodes: 0,
            pos: 0,
        }
    }

    /// Runs the traversal, writing files below the destination.
    ///
    /// Returns the manifest with entries sorted by their original LBA.
    pub fn walk(mut self) -> Result<FileListManifest> {
        let root_name = root_name(&self.destination);
        if !is_recordable_root(&root_name) {
            return Err(Error::InvalidRootName { name: root_name });
        }

        let root = read_root_record(self.data)?;
        slice_at(
            self.data,
            root.data_offset(),
            root.header.data_length() as u64,
            "root directory extent",
        )?;

        fs::create_dir_all(&self.destination).map_err(|e| Error::CreateDir {
            path: self.destination.clone(),
            source: e,
        })?;

        self.stack.push(Frame {
            start: root.data_offset(),
            end: root.data_end(),
            component: None,
            resume: 0,
        });
        self.pos = root.data_offset();
        self.total_inodes = 1;

        while let Some(end) = self.stack.last().map(|frame| frame.end) {
            if self.pos >= end {
                self.leave_directory();
                continue;
            }

            // Records never straddle sectors; a zero length byte marks the
            // unused tail of the current one.
            if self.data.get(self.pos as usize) == Some(&0) {
                self.pos = align_up(self.pos + 1, SECTOR_SIZE);
                continue;
            }

            let record = read_record(self.data, self.pos)?;
            check_supported(&record)?;
            self.pos = record.next;

            if record.is_self_or_parent() {
                continue;
            }

            let name = file_name(&record)?;
            self.total_inodes += 1;

            if record.is_directory() {
                self.enter_directory(&record, name)?;
            } else {
                self.extract_file(&record, name)?;
            }
        }

        self.entries.sort_by_key(|entry| entry.lba);

        let mut manifest = FileListManifest::new(root_name);
        manifest.entries = self.entries;
        manifest.total_inodes = self.total_inodes;

        info!(
            "Extracted {} files ({} directory records) to {}",
            manifest.entries.len(),
            manifest.total_inodes,
            self.destination.display()
        );

        Ok(manifest)
    }

    /// Path components of the directory currently being scanned.
    fn components(&self) -> Vec<String> {
        self.stack
            .iter()
            .filter_map(|frame| frame.component.clone())
            .collect()
    }

    fn host_path(&self, components: &[String]) -> PathBuf {
        let mut path = self.destination.clone();
        path.extend(components);
        path
    }

    fn enter_directory(&mut self, record: &DirectoryRecord, name: String) -> Result<()> {
        let start = record.data_offset();
        slice_at(
            self.data,
            start,
            record.header.data_length() as u64,
            "directory extent",
        )?;

        if self.stack.iter().any(|frame| frame.start == start) {
            return Err(Error::unsupported(
                record.offset,
                "directory extent loops back to an ancestor",
            ));
        }

        let mut components = self.components();
        components.push(name.clone());
        let dir = self.host_path(&components);
        fs::create_dir_all(&dir).map_err(|e| Error::CreateDir {
            path: dir.clone(),
            source: e,
        })?;
        debug!("Entering {}", components.join("/"));

        self.stack.push(Frame {
            start,
            end: record.data_end(),
            component: Some(name),
            resume: record.next,
        });
        self.pos = start;

        Ok(())
    }

    fn leave_directory(&mut self) {
        if let Some(frame) = self.stack.pop() {
            // The outermost frame has nothing to resume.
            if !self.stack.is_empty() {
                self.pos = frame.resume;
            }
        }
    }

    fn extract_file(&mut self, record: &DirectoryRecord, name: String) -> Result<()> {
        let contents = slice_at(
            self.data,
            record.data_offset(),
            record.header.data_length() as u64,
            "file extent",
        )?;

        let mut components = self.components();
        components.push(name);
        let path = self.host_path(&components);

        fs::write(&path, contents).map_err(|e| Error::FileWrite {
            path: path.clone(),
            source: e,
        })?;
        debug!(
            "{} ({} bytes at LBA {})",
            components.join("/"),
            contents.len(),
            record.header.extent()
        );

        self.entries.push(FileListEntry {
            path: components,
            inode_offset: record.offset,
            lba: record.header.extent(),
        });

        Ok(())
    }
}

/// Extracts every file of `data` below `destination` and returns the manifest.
pub fn walk_directory_tree<P: AsRef<Path>>(data: &[u8], destination: P) -> Result<FileListManifest> {
    DirectoryTreeWalker::new(data, destination).walk()
}

/// Rejects record layouts the rebuilder cannot reproduce.
fn check_supported(record: &DirectoryRecord) -> Result<()> {
    let header = &record.header;
    if header.ext_attr_length != 0 {
        return Err(Error::unsupported(
            record.offset,
            "extended attribute records are not supported",
        ));
    }
    if header.file_unit_size != 0 || header.interleave_gap != 0 {
        return Err(Error::unsupported(
            record.offset,
            "interleaved files are not supported",
        ));
    }
    if header.volume_sequence() != 1 {
        return Err(Error::unsupported(
            record.offset,
            "multi-volume sets are not supported",
        ));
    }
    let flags = header.flags();
    if flags.contains(FileFlags::HIGH_SIZE_RELOCATED) {
        return Err(Error::unsupported(
            record.offset,
            "relocated high-order size bits are not supported",
        ));
    }
    if flags.contains(FileFlags::MULTI_EXTENT) {
        return Err(Error::unsupported(
            record.offset,
            "multi-extent files are not supported",
        ));
    }
    Ok(())
}

/// Decodes a record name into a single safe path component.
fn file_name(record: &DirectoryRecord) -> Result<String> {
    let invalid = || Error::InvalidName {
        offset: record.offset,
        name: String::from_utf8_lossy(&record.name).into_owned(),
    };

    if record
        .name
        .iter()
        .any(|&b| !(0x20..0x7F).contains(&b) || is_reserved(b))
    {
        return Err(invalid());
    }

    let raw = std::str::from_utf8(&record.name).map_err(|_| invalid())?;
    let name = raw.strip_suffix(VERSION_SUFFIX).unwrap_or(raw);
    if name.is_empty() || name == "." || name == ".." {
        return Err(invalid());
    }

    Ok(name.to_string())
}

/// Path separators and the files log delimiter.
fn is_reserved(byte: u8) -> bool {
    matches!(byte, b'/' | b'\\' | b'|')
}

/// Returns true if `name` survives a files log round trip as the root folder.
fn is_recordable_root(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name
            .bytes()
            .any(|b| b.is_ascii_control() || is_reserved(b))
}

/// Name of the extraction root as recorded in the manifest.
pub fn root_name(destination: &Path) -> String {
    destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_ROOT_NAME.to_string())
}
