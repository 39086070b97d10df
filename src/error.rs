//! Error types for disc image extraction and rebuilding.
//!
//! Every failure is terminal: nothing is retried and there is no partial
//! success mode. The variants are grouped the way they surface to the user:
//! I/O failures, unsupported on-disc layouts, missing preconditions, missing
//! replacement payloads and the bounded UDF marker scan running dry.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for extraction and rebuild operations.
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================
    #[error("failed to open file '{path}': {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to memory map file '{path}': {source}")]
    MemoryMap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ==================== Image Layout Errors ====================
    #[error("image too small: need {needed} bytes, have {available}")]
    ImageTooSmall { needed: u64, available: u64 },

    #[error("{what} at offset {offset:#x} runs past the end of the image ({len} bytes)")]
    Truncated {
        what: &'static str,
        offset: u64,
        len: u64,
    },

    #[error("unsupported directory record at offset {offset:#x}: {reason}")]
    UnsupportedLayout { offset: u64, reason: &'static str },

    #[error("directory record at offset {offset:#x} has an unusable name {name:?}")]
    InvalidName { offset: u64, name: String },

    #[error("extraction folder name {name:?} cannot be recorded in the files log")]
    InvalidRootName { name: String },

    // ==================== Manifest Errors ====================
    #[error("could not find the '{path}' files log")]
    ManifestNotFound { path: PathBuf },

    #[error("malformed files log at line {line}: {reason}")]
    MalformedManifest { line: usize, reason: String },

    #[error("could not find the inode total at the end of the files log")]
    MissingInodeTotal,

    // ==================== Rebuild Errors ====================
    #[error("could not find the '{path}' files directory")]
    FilesDirNotFound { path: PathBuf },

    #[error("'{path}' is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("output image '{path}' would overwrite the source image")]
    OutputIsSource { path: PathBuf },

    #[error("replacement file '{path}' not found")]
    ReplacementNotFound { path: PathBuf },

    #[error("replacement file '{path}' is {size} bytes, files must be smaller than 4 GiB")]
    ReplacementTooLarge { path: PathBuf, size: u64 },

    #[error("directory record offset {offset:#x} lies outside the {header_len:#x}-byte image header")]
    PatchOutOfBounds { offset: u64, header_len: u64 },

    #[error(
        "found {found} of {expected} UDF marker sectors within the first {sectors} sectors; \
         the data region start could not be located"
    )]
    ScanExhausted {
        found: u32,
        expected: u32,
        sectors: usize,
    },
}

/// A specialized Result type for disc image operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a malformed manifest error with a formatted reason.
    #[inline]
    pub fn manifest(line: usize, reason: impl Into<String>) -> Self {
        Error::MalformedManifest {
            line,
            reason: reason.into(),
        }
    }

    /// Creates an unsupported layout error.
    #[inline]
    pub fn unsupported(offset: u64, reason: &'static str) -> Self {
        Error::UnsupportedLayout { offset, reason }
    }

    /// Returns true if the error was raised before any output was produced.
    ///
    /// Rebuilds that fail with one of these leave no output image behind.
    /// `FileOpen` is not listed: it is also raised for replacement files once
    /// the output exists.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::ImageTooSmall { .. }
                | Error::MemoryMap { .. }
                | Error::Truncated { .. }
                | Error::ManifestNotFound { .. }
                | Error::MalformedManifest { .. }
                | Error::MissingInodeTotal
                | Error::FilesDirNotFound { .. }
                | Error::NotADirectory { .. }
                | Error::OutputIsSource { .. }
                | Error::ScanExhausted { .. }
        )
    }
}
