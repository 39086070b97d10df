//! ps2iso - PlayStation 2 disc image extractor and rebuilder.
//!
//! This library extracts every file of a PS2 style ISO9660/UDF hybrid image
//! to a folder, recording where each file's directory record lives, and later
//! rebuilds a copy of the image with replacement files inserted. Directory
//! records are patched in place, so names, flags and the overall layout of
//! the original header survive the rebuild untouched.
//!
//! # Features
//!
//! - Iterative depth-first extraction with a files log in on-disc order
//! - Bounded UDF marker scan to find where file payloads begin
//! - Sector-accurate rebuild with both-endian extent and size patching
//! - Optional trailing padding matching the vendor mastering tool
//!
//! # Example
//!
//! ```no_run
//! use ps2iso::{extract_image, rebuild_image, ExtractOptions, RebuildOptions};
//!
//! fn main() -> ps2iso::Result<()> {
//!     let manifest = extract_image(&ExtractOptions::new(
//!         "GAME.ISO",
//!         "GAME.ISO-FILELIST-LSN.TXT",
//!         "@GAME.ISO",
//!     ))?;
//!     println!("{} files extracted", manifest.entries.len());
//!
//!     // ... edit files under @GAME.ISO ...
//!
//!     rebuild_image(&RebuildOptions {
//!         image: "GAME.ISO".into(),
//!         filelist: "GAME.ISO-FILELIST-LSN.TXT".into(),
//!         files: "@GAME.ISO".into(),
//!         output: "NEW_GAME.ISO".into(),
//!         with_padding: false,
//!     })?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod iso;
pub mod manifest;
pub mod rebuild;
pub mod util;

// Re-export main types
pub use error::{Error, Result};
pub use iso::{DirectoryTreeWalker, DiscImage};
pub use manifest::{FileListEntry, FileListManifest};
pub use rebuild::{locate_data_region, ImageWriter};

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use iso::{root_name, SECTOR_SIZE};

/// Inputs of an extraction run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Source disc image
    pub image: PathBuf,
    /// Files log to write
    pub filelist: PathBuf,
    /// Folder receiving the extracted files
    pub destination: PathBuf,
}

impl ExtractOptions {
    /// Creates extraction options from the three paths.
    pub fn new(
        image: impl Into<PathBuf>,
        filelist: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            image: image.into(),
            filelist: filelist.into(),
            destination: destination.into(),
        }
    }
}

/// Inputs of a rebuild run.
#[derive(Debug, Clone)]
pub struct RebuildOptions {
    /// Original disc image
    pub image: PathBuf,
    /// Files log written by the extraction
    pub filelist: PathBuf,
    /// Folder holding the replacement files
    pub files: PathBuf,
    /// Image to create
    pub output: PathBuf,
    /// Append the mastering tool's trailing padding
    pub with_padding: bool,
}

/// Outcome of a rebuild run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildSummary {
    /// Number of files inserted
    pub files: usize,
    /// Byte offset where file payloads start
    pub data_start: u64,
    /// Volume size written into the descriptors, in sectors
    pub volume_size: u32,
}

/// Extracts every file of an image and writes the files log.
pub fn extract_image(options: &ExtractOptions) -> Result<FileListManifest> {
    let image = DiscImage::open(&options.image)?;
    info!(
        "Extracting {} ({} sectors)",
        image.path.display(),
        image.volume_space_size()
    );

    let manifest = DirectoryTreeWalker::new(image.data(), &options.destination).walk()?;
    manifest.write(&options.filelist)?;

    info!("Files log written to {}", options.filelist.display());

    Ok(manifest)
}

/// Rebuilds an image with the replacement files listed in the files log.
pub fn rebuild_image(options: &RebuildOptions) -> Result<RebuildSummary> {
    rebuild_image_with_progress(options, |_, _| {})
}

/// Rebuilds an image, calling `progress` before each file is inserted.
///
/// Every precondition (files log, replacement folder, marker scan) is checked
/// before the output is created. A missing replacement file aborts the run
/// and leaves the partially written output in place.
pub fn rebuild_image_with_progress<F>(
    options: &RebuildOptions,
    mut progress: F,
) -> Result<RebuildSummary>
where
    F: FnMut(usize, &FileListEntry),
{
    if !options.filelist.exists() {
        return Err(Error::ManifestNotFound {
            path: options.filelist.clone(),
        });
    }
    if !options.files.exists() {
        return Err(Error::FilesDirNotFound {
            path: options.files.clone(),
        });
    }
    if !options.files.is_dir() {
        return Err(Error::NotADirectory {
            path: options.files.clone(),
        });
    }
    if same_file(&options.image, &options.output) {
        return Err(Error::OutputIsSource {
            path: options.output.clone(),
        });
    }

    let manifest = FileListManifest::read(&options.filelist)?;
    let folder = root_name(&options.files);
    if !manifest.root_name.is_empty() && folder != manifest.root_name {
        warn!(
            "Files folder {} differs from {} recorded in the files log",
            folder, manifest.root_name
        );
    }
    let image = DiscImage::open(&options.image)?;

    let data_start = locate_data_region(image.data(), manifest.total_inodes)?;
    let header = &image.data()[..data_start as usize];
    let footer_start = image.len().saturating_sub(SECTOR_SIZE) as usize;
    let footer = &image.data()[footer_start..];

    info!(
        "Rebuilding {} into {} ({} files, data region at {:#x})",
        image.path.display(),
        options.output.display(),
        manifest.entries.len(),
        data_start
    );

    let file = File::create(&options.output).map_err(|e| Error::FileWrite {
        path: options.output.clone(),
        source: e,
    })?;
    let mut writer = ImageWriter::new(BufWriter::new(file), &options.output);
    writer.write_header(header)?;

    for (index, entry) in manifest.entries.iter().enumerate() {
        progress(index, entry);
        let source = options.files.join(entry.relative_path());
        writer.insert_file(entry, &source)?;
    }

    let volume_size = writer.finish(footer, options.with_padding)?;

    info!("Rebuild finished: {} sectors", volume_size);

    Ok(RebuildSummary {
        files: manifest.entries.len(),
        data_start,
        volume_size,
    })
}

/// Returns true if both paths resolve to the same existing file.
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
