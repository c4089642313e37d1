// transq-cli/src/cli.rs
//
// Defines the command-line argument structures using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use transq_core::FileType;

// --- CLI Argument Definition ---

#[derive(Parser, Debug)]
#[command(
    author,
    version, // Reads from Cargo.toml via "cargo" feature in clap
    about = "transq: concurrent audio transcoder",
    long_about = "Queues audio transcodes and runs a bounded number of them at a time using ffmpeg via transq-core."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging (RUST_LOG overrides this)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcodes one or more input files to the selected format
    Transcode(TranscodeArgs),
    /// Lists the available output formats
    Presets,
    /// Shows which encoder and muxer ffmpeg would use for each format
    Encoders,
}

#[derive(Parser, Debug)]
pub struct TranscodeArgs {
    /// Input audio files
    #[arg(required = true, value_name = "INPUT")]
    pub inputs: Vec<PathBuf>,

    /// Output format (see `transq presets`)
    #[arg(short, long, value_name = "FORMAT", default_value = "flac")]
    pub format: FileType,

    /// Output file for a single input, or output directory for several.
    /// Defaults to writing next to each input.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Maximum number of concurrent transcodes (defaults to the CPU count)
    #[arg(short, long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub jobs: Option<u32>,

    /// Seconds a job may run without exposing a decodable stream (0 disables)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Replace existing output files instead of picking a new name
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    /// TOML configuration file.
    /// Can also be set via the TRANSQ_CONFIG environment variable.
    #[arg(short, long, value_name = "FILE", env = "TRANSQ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print one JSON object per event instead of progress bars
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
