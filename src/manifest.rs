//! The files log bridging extraction and rebuild.
//!
//! One line per extracted file, `|<inode offset>||<root>/<path>|`, followed by
//! a terminator line `//<total inode count>`. The inode offset is the byte
//! offset of the file's directory record inside the original image; the
//! leading path component is the extraction folder and is dropped on read.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Field delimiter.
pub const DELIMITER: char = '|';

/// Prefix of the terminator line.
pub const TOTAL_MARKER: &str = "//";

/// One extracted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListEntry {
    /// Path components below the extraction root
    pub path: Vec<String>,
    /// Byte offset of the file's directory record in the image
    pub inode_offset: u64,
    /// Original extent location; zero when read back from a files log
    pub lba: u32,
}

impl FileListEntry {
    /// Path relative to the extraction or replacement folder.
    pub fn relative_path(&self) -> PathBuf {
        self.path.iter().collect()
    }

    /// Path joined with `/`, as written to the files log.
    pub fn display_path(&self) -> String {
        self.path.join("/")
    }
}

/// The ordered list of extracted files plus the directory record tally.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileListManifest {
    /// Name of the extraction folder, the first component of every path
    pub root_name: String,
    /// Files in on-disc order
    pub entries: Vec<FileListEntry>,
    /// Directory records visited during extraction, directories included
    pub total_inodes: u32,
}

impl FileListManifest {
    /// Creates an empty manifest rooted at `root_name`.
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            root_name: root_name.into(),
            entries: Vec::new(),
            total_inodes: 0,
        }
    }

    /// Reads and parses a files log.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::ManifestNotFound {
                path: path.to_path_buf(),
            });
        }

        let text = fs::read_to_string(path).map_err(|e| Error::FileOpen {
            path: path.to_path_buf(),
            source: e,
        })?;
        text.parse()
    }

    /// Writes the files log to `path`.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_string()).map_err(|e| Error::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

impl fmt::Display for FileListManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(
                f,
                "{d}{}{d}{d}{}/{}{d}",
                entry.inode_offset,
                self.root_name,
                entry.display_path(),
                d = DELIMITER
            )?;
        }
        writeln!(f, "{}{}", TOTAL_MARKER, self.total_inodes)
    }
}

impl FromStr for FileListManifest {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text.lines().map(|l| l.trim_end_matches('\r')).collect();

        let (last, body) = lines.split_last().ok_or(Error::MissingInodeTotal)?;
        let total = last
            .strip_prefix(TOTAL_MARKER)
            .ok_or(Error::MissingInodeTotal)?;
        let total_inodes = total
            .trim()
            .parse::<u32>()
            .map_err(|_| Error::manifest(lines.len(), format!("invalid inode total {total:?}")))?;

        let mut root_name: Option<String> = None;
        let mut entries = Vec::with_capacity(body.len());

        for (index, line) in body.iter().enumerate() {
            let number = index + 1;
            let (root, entry) = parse_entry(line, number)?;

            match root_name.as_deref() {
                None => root_name = Some(root),
                Some(expected) if expected != root => {
                    return Err(Error::manifest(
                        number,
                        format!("root folder {root:?} differs from {expected:?}"),
                    ));
                }
                Some(_) => {}
            }
            entries.push(entry);
        }

        Ok(Self {
            root_name: root_name.unwrap_or_default(),
            entries,
            total_inodes,
        })
    }
}

/// Parses one `|offset||root/path|` line into its root component and entry.
fn parse_entry(line: &str, number: usize) -> Result<(String, FileListEntry)> {
    let tokens: Vec<&str> = line.split(DELIMITER).filter(|t| !t.is_empty()).collect();
    let [offset, path] = tokens.as_slice() else {
        return Err(Error::manifest(
            number,
            format!("expected 2 fields, found {}", tokens.len()),
        ));
    };

    let inode_offset = offset
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::manifest(number, format!("invalid inode offset {offset:?}")))?;

    let mut components = path.split(['/', '\\']).filter(|c| !c.is_empty());
    let root = components
        .next()
        .ok_or_else(|| Error::manifest(number, "empty path"))?
        .to_string();
    let path: Vec<String> = components.map(str::to_string).collect();

    if path.is_empty() {
        return Err(Error::manifest(number, "path has no component below the root folder"));
    }
    if path.iter().any(|c| c == "." || c == "..") {
        return Err(Error::manifest(number, "path escapes the files folder"));
    }

    Ok((
        root,
        FileListEntry {
            path,
            inode_offset,
            lba: 0,
        },
    ))
}
