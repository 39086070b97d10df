//! ps2iso - PlayStation 2 disc image extractor and rebuilder.
//!
//! Extract the files of a PS2 ISO and insert modified files back into a copy.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ps2iso::{extract_image, rebuild_image_with_progress, ExtractOptions, RebuildOptions};

/// PlayStation 2 ISO rebuilder.
#[derive(Parser, Debug)]
#[command(name = "ps2iso")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (0=quiet, 1=warnings, 2=info, 3=debug)
    #[arg(short, long, default_value = "2", global = true)]
    verbosity: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract every file of the image and write the files log
    Extract {
        /// Input game ISO file
        iso: PathBuf,

        /// Files log to write (default: <ISO>-FILELIST-LSN.TXT)
        #[arg(long)]
        filelist: Option<PathBuf>,

        /// Folder receiving the extracted files (default: @<ISO>)
        #[arg(long)]
        files: Option<PathBuf>,
    },

    /// Insert files back into a copy of the image
    Insert {
        /// Original game ISO file
        iso: PathBuf,

        /// Files log written by extract (default: <ISO>-FILELIST-LSN.TXT)
        #[arg(long)]
        filelist: Option<PathBuf>,

        /// Folder with the files to insert (default: @<ISO>)
        #[arg(long)]
        files: Option<PathBuf>,

        /// Resulting ISO file (default: NEW_<iso>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Add the 20 MiB trailing padding of the official mastering tool
        #[arg(long)]
        with_padding: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbosity);

    match cli.command {
        Commands::Extract {
            iso,
            filelist,
            files,
        } => cmd_extract(iso, filelist, files),
        Commands::Insert {
            iso,
            filelist,
            files,
            output,
            with_padding,
        } => cmd_insert(iso, filelist, files, output, with_padding, cli.verbosity),
    }
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        _ => Level::DEBUG,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}

/// Upper-cased file name of the image, the base of every default path.
fn image_name(iso: &Path) -> String {
    iso.file_name()
        .map(|n| n.to_string_lossy().to_uppercase())
        .unwrap_or_default()
}

fn default_filelist(iso: &Path) -> PathBuf {
    PathBuf::from(format!("{}-FILELIST-LSN.TXT", image_name(iso)))
}

fn default_files(iso: &Path) -> PathBuf {
    PathBuf::from(format!("@{}", image_name(iso)))
}

fn default_output(iso: &Path) -> PathBuf {
    let name = iso
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    PathBuf::from(format!("NEW_{}", name))
}

fn cmd_extract(iso: PathBuf, filelist: Option<PathBuf>, files: Option<PathBuf>) -> Result<()> {
    let start = Instant::now();

    let options = ExtractOptions {
        filelist: filelist.unwrap_or_else(|| default_filelist(&iso)),
        destination: files.unwrap_or_else(|| default_files(&iso)),
        image: iso,
    };

    let manifest = extract_image(&options)
        .with_context(|| format!("Failed to extract: {}", options.image.display()))?;

    info!(
        "Extracted {} files to {} in {:.2}s",
        manifest.entries.len(),
        options.destination.display(),
        start.elapsed().as_secs_f64()
    );

    Ok(())
}

fn cmd_insert(
    iso: PathBuf,
    filelist: Option<PathBuf>,
    files: Option<PathBuf>,
    output: Option<PathBuf>,
    with_padding: bool,
    verbosity: u8,
) -> Result<()> {
    let start = Instant::now();

    let options = RebuildOptions {
        filelist: filelist.unwrap_or_else(|| default_filelist(&iso)),
        files: files.unwrap_or_else(|| default_files(&iso)),
        output: output.unwrap_or_else(|| default_output(&iso)),
        image: iso,
        with_padding,
    };

    let progress = if verbosity > 0 {
        ProgressBar::new_spinner()
    } else {
        ProgressBar::hidden()
    };
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} files {wide_msg}")
            .context("invalid progress template")?,
    );

    let summary = rebuild_image_with_progress(&options, |_, entry| {
        progress.inc(1);
        progress.set_message(format!("Inserting {}...", entry.display_path()));
    })
    .with_context(|| format!("Failed to rebuild: {}", options.image.display()))?;

    progress.finish_and_clear();

    info!(
        "Wrote {} ({} files, {} sectors) in {:.2}s",
        options.output.display(),
        summary.files,
        summary.volume_size,
        start.elapsed().as_secs_f64()
    );

    Ok(())
}
