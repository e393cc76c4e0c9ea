use clap::{Parser, Subcommand};
use rf_core::{Operation, Quality, Resolution};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reelforge")]
#[command(author, version, about = "Video transcoding job supervisor for desktop front-ends")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve JSON-lines requests on stdin, writing responses and job events to stdout
    Serve,

    /// Run a single job in the foreground
    Run {
        /// Operation: convert, thumbnail, extract-audio, compress or merge
        operation: Operation,

        /// Input file(s); merge accepts several
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Target format (defaults to the output extension)
        #[arg(short, long)]
        format: Option<String>,

        /// Quality preset: low, medium or high
        #[arg(short, long)]
        quality: Option<Quality>,

        /// Output size as WxH
        #[arg(long)]
        resolution: Option<Resolution>,

        /// Output frame rate
        #[arg(long)]
        fps: Option<f64>,

        /// Thumbnail position in seconds
        #[arg(long)]
        offset: Option<f64>,

        /// Audio encoder for extract-audio
        #[arg(long)]
        audio_codec: Option<String>,

        /// Print the ffmpeg command without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Probe a media file and display information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
