//! Core library for batch border cropping and keyframe extraction.
//!
//! A batch run has three phases:
//!
//! 1. detect letterbox/pillarbox borders of every input (cropdetect probes
//!    with a gradient-accumulation fallback) and crop-transcode on the GPU,
//!    or copy the source unmodified when no worthwhile crop exists;
//! 2. extract scene-change keyframes from each intermediate video, trimming
//!    residual borders and rejecting blank frames;
//! 3. drop perceptual duplicates from each frame directory.
//!
//! The `pipeline` module holds a library-level decode/filter/encode state
//! machine for embedding a codec binding directly.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use cropshot_core::{CoreConfigBuilder, FfprobeClient, SidecarSpawner, run_batch};
//! use std::path::PathBuf;
//!
//! let config = CoreConfigBuilder::new()
//!     .input_dir(PathBuf::from("/videos/in"))
//!     .intermediate_dir(PathBuf::from("/videos/cropped"))
//!     .output_dir(PathBuf::from("/videos/frames"))
//!     .workers(2)
//!     .build();
//! config.validate().unwrap();
//!
//! let summary = run_batch(&SidecarSpawner, &FfprobeClient::new(), &config).unwrap();
//! println!("{:?}", summary.status_counts());
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod external;
pub mod file_logging;
pub mod hardware;
pub mod pipeline;
pub mod processing;
pub mod temp_files;
pub mod terminal;
pub mod utils;

// Re-exports for public API
pub use config::{CoreConfig, CoreConfigBuilder};
pub use discovery::{find_intermediate_files, find_processable_files};
pub use error::{CoreError, CoreResult};
pub use external::{FfmpegSpawner, FfprobeClient, MediaProbe, SidecarSpawner, check_dependency};
pub use processing::{
    BatchSummary, CropDecision, CropRectangle, DetectionStrategy, VideoOutcome, VideoStatus,
    detect_crop, extract_frames, run_batch,
};
pub use utils::{format_bytes, format_duration, format_elapsed};
