//! Configuration structures and constants for the cropshot-core library.
//!
//! Every tunable used by crop detection, transcoding and frame extraction is a
//! field on [`CoreConfig`]. Values come from the defaults below, optionally
//! overridden by a JSON file, `CROPSHOT_*` environment variables and finally
//! the CLI flags (in that order).

mod builder;
pub mod utils;

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use builder::CoreConfigBuilder;

// Default constants

/// Default number of concurrent phase 1 workers.
pub const DEFAULT_WORKERS: usize = 3;

/// Default decode rate for the gradient fallback (one frame every 10 seconds).
pub const DEFAULT_SAMPLE_FPS: f64 = 0.1;

/// Upper bound on frames accumulated by the gradient fallback.
pub const DEFAULT_MAX_GRADIENT_SAMPLES: usize = 60;

/// Parameters handed to ffmpeg's `cropdetect` filter (limit:round:reset).
pub const DEFAULT_CROPDETECT_PARAMS: &str = "24:16:0";

/// Number of cropdetect probes spread across the clip.
pub const DEFAULT_CROP_PROBES: usize = 3;

/// Length in seconds of each cropdetect probe window.
pub const DEFAULT_PROBE_SECS: f64 = 2.0;

/// Pixels added on every side of the aggregated cropdetect union.
pub const DEFAULT_SAFE_MARGIN: u32 = 4;

/// A crop must shrink at least one dimension by this fraction to be applied.
pub const DEFAULT_MIN_CROP_RATIO: f64 = 0.10;

/// Scale factor applied to frames before gradient accumulation.
pub const DEFAULT_DOWNSCALE: f64 = 0.5;

/// Cutoff on the normalized 8-bit gradient heat-map.
pub const DEFAULT_EDGE_THRESHOLD: u8 = 10;

/// Channel-wise tolerance of the per-image blank line test.
pub const DEFAULT_LINE_TOLERANCE: u32 = 5;

/// Minimum number of frames each video should yield.
pub const DEFAULT_MIN_FRAMES: usize = 4;

/// Scene change score above which ffmpeg emits a frame.
pub const DEFAULT_SCENE_THRESHOLD: f64 = 0.12;

/// Per-channel standard deviation below which a frame counts as solid color.
pub const DEFAULT_SOLID_STD_THRESHOLD: f64 = 5.0;

/// NVENC preset for the crop transcode.
pub const DEFAULT_NVENC_PRESET: &str = "p5";

/// NVENC constant quality value for the crop transcode.
pub const DEFAULT_NVENC_CQ: u8 = 23;

/// Edge length of the difference hash used for de-duplication.
pub const DEFAULT_DHASH_SIZE: u32 = 8;

/// Main configuration structure for the cropshot-core library.
///
/// All fields have defaults, so only the directories normally need to be set.
///
/// # Examples
///
/// ```rust,no_run
/// use cropshot_core::config::CoreConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = CoreConfigBuilder::new()
///     .input_dir(PathBuf::from("/videos"))
///     .intermediate_dir(PathBuf::from("/tmp/cropped"))
///     .output_dir(PathBuf::from("/frames"))
///     .workers(2)
///     .min_frames(6)
///     .build();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Directory containing the source videos
    pub input_dir: PathBuf,

    /// Directory receiving one cropped (or copied) `.mp4` per source
    pub intermediate_dir: PathBuf,

    /// Root of the per-video frame directories
    pub output_dir: PathBuf,

    /// Directory for log files
    pub log_dir: PathBuf,

    /// Optional base for scratch directories (defaults to `output_dir`)
    pub temp_dir: Option<PathBuf>,

    /// Phase 1 worker pool size
    pub workers: usize,

    /// Gradient fallback decode rate in frames per second
    pub sample_fps: f64,

    /// Gradient fallback frame cap
    pub max_gradient_samples: usize,

    pub cropdetect_params: String,
    pub crop_probes: usize,
    pub probe_secs: f64,
    pub safe_margin: u32,
    pub min_crop_ratio: f64,
    pub downscale: f64,
    pub edge_threshold: u8,

    /// Blank line tolerance used when trimming extracted frames
    pub line_tolerance: u32,

    pub min_frames: usize,
    pub scene_threshold: f64,
    pub solid_std_threshold: f64,

    pub nvenc_preset: String,
    pub nvenc_cq: u8,

    /// Remove the intermediate videos once frames are extracted
    pub delete_intermediate: bool,

    /// Run the perceptual de-duplication pass over extracted frames
    pub deduplicate: bool,
    pub dhash_size: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            intermediate_dir: PathBuf::from("cropped"),
            output_dir: PathBuf::from("frames"),
            log_dir: PathBuf::from("logs"),
            temp_dir: None,
            workers: DEFAULT_WORKERS,
            sample_fps: DEFAULT_SAMPLE_FPS,
            max_gradient_samples: DEFAULT_MAX_GRADIENT_SAMPLES,
            cropdetect_params: DEFAULT_CROPDETECT_PARAMS.to_string(),
            crop_probes: DEFAULT_CROP_PROBES,
            probe_secs: DEFAULT_PROBE_SECS,
            safe_margin: DEFAULT_SAFE_MARGIN,
            min_crop_ratio: DEFAULT_MIN_CROP_RATIO,
            downscale: DEFAULT_DOWNSCALE,
            edge_threshold: DEFAULT_EDGE_THRESHOLD,
            line_tolerance: DEFAULT_LINE_TOLERANCE,
            min_frames: DEFAULT_MIN_FRAMES,
            scene_threshold: DEFAULT_SCENE_THRESHOLD,
            solid_std_threshold: DEFAULT_SOLID_STD_THRESHOLD,
            nvenc_preset: DEFAULT_NVENC_PRESET.to_string(),
            nvenc_cq: DEFAULT_NVENC_CQ,
            delete_intermediate: false,
            deduplicate: true,
            dhash_size: DEFAULT_DHASH_SIZE,
        }
    }
}

impl CoreConfig {
    /// Loads a (possibly partial) configuration from a JSON file.
    ///
    /// Missing keys take their default values.
    pub fn from_json_file(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            CoreError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Applies `CROPSHOT_*` environment overrides on top of the current values.
    ///
    /// Variables that are unset or fail to parse leave the field untouched.
    pub fn apply_env_overrides(&mut self) {
        use utils::*;

        self.input_dir = get_env_path("CROPSHOT_INPUT_DIR", self.input_dir.clone());
        self.intermediate_dir =
            get_env_path("CROPSHOT_INTERMEDIATE_DIR", self.intermediate_dir.clone());
        self.output_dir = get_env_path("CROPSHOT_OUTPUT_DIR", self.output_dir.clone());
        self.log_dir = get_env_path("CROPSHOT_LOG_DIR", self.log_dir.clone());
        self.workers = get_env_usize("CROPSHOT_WORKERS", self.workers);
        self.sample_fps = get_env_f64("CROPSHOT_SAMPLE_FPS", self.sample_fps);
        self.max_gradient_samples =
            get_env_usize("CROPSHOT_MAX_GRADIENT_SAMPLES", self.max_gradient_samples);
        self.crop_probes = get_env_usize("CROPSHOT_CROP_PROBES", self.crop_probes);
        self.probe_secs = get_env_f64("CROPSHOT_PROBE_SECS", self.probe_secs);
        self.safe_margin = get_env_u32("CROPSHOT_SAFE_MARGIN", self.safe_margin);
        self.min_crop_ratio = get_env_f64("CROPSHOT_MIN_CROP_RATIO", self.min_crop_ratio);
        self.downscale = get_env_f64("CROPSHOT_DOWNSCALE", self.downscale);
        self.edge_threshold = get_env_u8("CROPSHOT_EDGE_THRESHOLD", self.edge_threshold);
        self.line_tolerance = get_env_u32("CROPSHOT_LINE_TOLERANCE", self.line_tolerance);
        self.min_frames = get_env_usize("CROPSHOT_MIN_FRAMES", self.min_frames);
        self.scene_threshold = get_env_f64("CROPSHOT_SCENE_THRESHOLD", self.scene_threshold);
        self.nvenc_preset = get_env_string("CROPSHOT_NVENC_PRESET", self.nvenc_preset.clone());
        self.nvenc_cq = get_env_u8("CROPSHOT_NVENC_CQ", self.nvenc_cq);
        self.delete_intermediate =
            get_env_bool("CROPSHOT_DELETE_INTERMEDIATE", self.delete_intermediate);
        self.deduplicate = get_env_bool("CROPSHOT_DEDUPLICATE", self.deduplicate);
    }

    /// Checks that every numeric knob is inside its usable range.
    pub fn validate(&self) -> CoreResult<()> {
        if self.crop_probes == 0 {
            return Err(CoreError::Config("crop_probes must be at least 1".into()));
        }
        if !(self.probe_secs > 0.0) {
            return Err(CoreError::Config("probe_secs must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.min_crop_ratio) {
            return Err(CoreError::Config(format!(
                "min_crop_ratio {} must be in [0, 1)",
                self.min_crop_ratio
            )));
        }
        if !(self.downscale > 0.0 && self.downscale <= 1.0) {
            return Err(CoreError::Config(format!(
                "downscale {} must be in (0, 1]",
                self.downscale
            )));
        }
        if !(self.sample_fps > 0.0) {
            return Err(CoreError::Config("sample_fps must be positive".into()));
        }
        if !(self.scene_threshold >= 0.0) {
            return Err(CoreError::Config(
                "scene_threshold must be a non-negative number".into(),
            ));
        }
        if self.dhash_size == 0 {
            return Err(CoreError::Config("dhash_size must be at least 1".into()));
        }
        Ok(())
    }

    /// Base directory for scratch directories.
    pub fn scratch_base(&self) -> &Path {
        self.temp_dir.as_deref().unwrap_or(&self.output_dir)
    }
}
