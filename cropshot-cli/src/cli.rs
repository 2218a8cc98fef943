// cropshot-cli/src/cli.rs
//
// Defines the command-line argument structures using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

// --- CLI Argument Definition ---

#[derive(Parser, Debug)]
#[command(
    author,
    version, // Reads from Cargo.toml via "cargo" feature in clap
    about = "Cropshot: batch border cropping and keyframe extraction",
    long_about = "Detects letterbox/pillarbox borders, crop-transcodes on an NVIDIA GPU \
                  and extracts scene keyframes from every video in a directory."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crops every video in INPUT_DIR and extracts keyframes into OUTPUT_DIR
    Run(RunArgs),
    /// Prints the crop detected for a single file
    Detect(DetectArgs),
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Directory containing the source videos
    #[arg(short = 'i', long = "input", required = true, value_name = "INPUT_DIR")]
    pub input_dir: PathBuf,

    /// Root directory for the per-video frame folders
    #[arg(short = 'o', long = "output", required = true, value_name = "OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Directory for cropped intermediate videos (defaults to OUTPUT_DIR/.intermediate)
    #[arg(long = "intermediate", value_name = "DIR")]
    pub intermediate_dir: Option<PathBuf>,

    /// Directory for log files (defaults to OUTPUT_DIR/logs)
    #[arg(short, long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log to the console only
    #[arg(long)]
    pub no_log: bool,

    /// JSON file with configuration overrides
    #[arg(long, value_name = "FILE.json")]
    pub config: Option<PathBuf>,

    // --- Crop detection ---
    /// Videos cropped concurrently in phase 1
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Decode rate of the gradient fallback
    #[arg(long, value_name = "FPS")]
    pub sample_fps: Option<f64>,

    /// Number of cropdetect windows per video
    #[arg(long = "probes", value_name = "N")]
    pub crop_probes: Option<usize>,

    /// Length of each cropdetect window in seconds
    #[arg(long, value_name = "SECONDS")]
    pub probe_secs: Option<f64>,

    /// Pixels added around the detected picture
    #[arg(long = "margin", value_name = "PX")]
    pub safe_margin: Option<u32>,

    /// Minimum fraction a dimension must shrink for a crop to be applied
    #[arg(long, value_name = "RATIO")]
    pub min_crop_ratio: Option<f64>,

    /// Scale factor of the gradient fallback frames
    #[arg(long, value_name = "FACTOR")]
    pub downscale: Option<f64>,

    /// Heat-map binarization threshold (0-255)
    #[arg(long, value_name = "T")]
    pub edge_threshold: Option<u8>,

    // --- Frame extraction ---
    /// Blank-line tolerance when trimming extracted frames
    #[arg(long = "tolerance", value_name = "T")]
    pub line_tolerance: Option<u32>,

    /// Minimum frames per video before uniform sampling kicks in
    #[arg(long, value_name = "N")]
    pub min_frames: Option<usize>,

    /// Scene-change score threshold
    #[arg(long, value_name = "T")]
    pub scene_threshold: Option<f64>,

    // --- Encoding ---
    /// NVENC preset (p1-p7)
    #[arg(long = "preset", value_name = "P")]
    pub nvenc_preset: Option<String>,

    /// NVENC constant quality (0-51)
    #[arg(long = "cq", value_name = "Q", value_parser = clap::value_parser!(u8).range(0..=51))]
    pub nvenc_cq: Option<u8>,

    // --- Cleanup ---
    /// Delete the intermediate videos after extraction
    #[arg(long)]
    pub delete_intermediate: bool,

    /// Skip the duplicate-frame removal pass
    #[arg(long)]
    pub no_dedup: bool,
}

#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Video file to analyse
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// JSON file with configuration overrides
    #[arg(long, value_name = "FILE.json")]
    pub config: Option<PathBuf>,
}
