use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "tube-batch",
    about = "Tube Batch - extract audio clips from media links listed in a CSV table",
    version,
    long_about = "Reads a CSV table with url, person and start_minute columns, extracts an \
audio clip per row with yt-dlp, and files the clips into one directory per person under the \
output root, together with a copy of the table."
)]
pub struct Cli {
    /// Path to the CSV table of media links and metadata
    #[arg(value_name = "TABLE")]
    pub table: PathBuf,

    /// Output root directory
    #[arg(
        short = 'o',
        long = "output_dir",
        value_name = "DIR",
        default_value = "tube.output"
    )]
    pub output_dir: PathBuf,

    /// Delete and recreate a pre-existing output directory without prompting
    #[arg(short = 'y', long)]
    pub assume_yes: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress the progress bar and log only warnings
    #[arg(short, long)]
    pub quiet: bool,
}
