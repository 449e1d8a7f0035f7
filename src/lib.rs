//! Tube Batch - a Rust CLI tool for batch audio extraction from media links
//!
//! This library reads rows of (url, person, start_minute) from a CSV table,
//! invokes a yt-dlp backed extraction delegate per row, and files the produced
//! audio clips into per-person output directories together with a copy of the
//! source table.

pub mod batch;
pub mod cli;
pub mod config;
pub mod extract;
pub mod output;
pub mod table;
pub mod utils;

pub use batch::{BatchOptions, BatchOutcome, BatchRunner, BatchSummary};
pub use cli::Cli;
pub use config::Config;
pub use extract::{AudioExtractor, YtDlpExtractor};
pub use output::{OverwritePolicy, PrepareOutcome, Prompter, StdinPrompter};
pub use table::Row;

use std::path::PathBuf;

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types raised by the batch run, carrying the offending row or path
#[derive(thiserror::Error, Debug)]
pub enum BatchError {
    #[error("Cannot read table {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Table {}: {detail}", .path.display())]
    Schema { path: PathBuf, detail: String },

    #[error("Filesystem operation failed at {}: {detail}", .path.display())]
    Filesystem { path: PathBuf, detail: String },

    #[error("Audio extraction failed for row {row} ({url}): {detail}")]
    Extraction {
        row: usize,
        url: String,
        detail: String,
    },
}
