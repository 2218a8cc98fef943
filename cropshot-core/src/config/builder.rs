// ============================================================================
// cropshot-core/src/config/builder.rs
// ============================================================================
//
// CONFIGURATION BUILDER: Builder Pattern for CoreConfig
//
// Fluent construction of CoreConfig. Every setter overrides one field of a
// default configuration; `build` never fails, call `CoreConfig::validate`
// before handing the result to the orchestrator.

use std::path::PathBuf;

use super::CoreConfig;

/// Builder for creating CoreConfig instances.
///
/// # Examples
///
/// ```rust
/// use cropshot_core::config::CoreConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = CoreConfigBuilder::new()
///     .input_dir(PathBuf::from("videos"))
///     .safe_margin(0)
///     .deduplicate(false)
///     .build();
/// assert_eq!(config.safe_margin, 0);
/// assert!(!config.deduplicate);
/// ```
#[derive(Debug, Clone)]
pub struct CoreConfigBuilder {
    config: CoreConfig,
}

impl Default for CoreConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreConfigBuilder {
    /// Creates a builder seeded with [`CoreConfig::default`].
    pub fn new() -> Self {
        Self {
            config: CoreConfig::default(),
        }
    }

    /// Starts from an existing configuration (e.g. one loaded from JSON).
    pub fn from_config(config: CoreConfig) -> Self {
        Self { config }
    }

    pub fn input_dir(mut self, dir: PathBuf) -> Self {
        self.config.input_dir = dir;
        self
    }

    pub fn intermediate_dir(mut self, dir: PathBuf) -> Self {
        self.config.intermediate_dir = dir;
        self
    }

    pub fn output_dir(mut self, dir: PathBuf) -> Self {
        self.config.output_dir = dir;
        self
    }

    pub fn log_dir(mut self, dir: PathBuf) -> Self {
        self.config.log_dir = dir;
        self
    }

    /// Sets the base directory for scratch directories.
    pub fn temp_dir(mut self, dir: PathBuf) -> Self {
        self.config.temp_dir = Some(dir);
        self
    }

    /// Sets the phase 1 worker pool size.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn sample_fps(mut self, fps: f64) -> Self {
        self.config.sample_fps = fps;
        self
    }

    pub fn max_gradient_samples(mut self, samples: usize) -> Self {
        self.config.max_gradient_samples = samples;
        self
    }

    pub fn cropdetect_params(mut self, params: &str) -> Self {
        self.config.cropdetect_params = params.to_string();
        self
    }

    /// Sets how many cropdetect windows are sampled per video.
    pub fn crop_probes(mut self, probes: usize) -> Self {
        self.config.crop_probes = probes;
        self
    }

    pub fn probe_secs(mut self, secs: f64) -> Self {
        self.config.probe_secs = secs;
        self
    }

    pub fn safe_margin(mut self, margin: u32) -> Self {
        self.config.safe_margin = margin;
        self
    }

    pub fn min_crop_ratio(mut self, ratio: f64) -> Self {
        self.config.min_crop_ratio = ratio;
        self
    }

    pub fn downscale(mut self, factor: f64) -> Self {
        self.config.downscale = factor;
        self
    }

    pub fn edge_threshold(mut self, threshold: u8) -> Self {
        self.config.edge_threshold = threshold;
        self
    }

    pub fn line_tolerance(mut self, tolerance: u32) -> Self {
        self.config.line_tolerance = tolerance;
        self
    }

    pub fn min_frames(mut self, frames: usize) -> Self {
        self.config.min_frames = frames;
        self
    }

    pub fn scene_threshold(mut self, threshold: f64) -> Self {
        self.config.scene_threshold = threshold;
        self
    }

    pub fn solid_std_threshold(mut self, threshold: f64) -> Self {
        self.config.solid_std_threshold = threshold;
        self
    }

    /// Sets the NVENC preset name (`p1`..`p7`).
    pub fn nvenc_preset(mut self, preset: &str) -> Self {
        self.config.nvenc_preset = preset.to_string();
        self
    }

    pub fn nvenc_cq(mut self, cq: u8) -> Self {
        self.config.nvenc_cq = cq;
        self
    }

    pub fn delete_intermediate(mut self, delete: bool) -> Self {
        self.config.delete_intermediate = delete;
        self
    }

    pub fn deduplicate(mut self, enabled: bool) -> Self {
        self.config.deduplicate = enabled;
        self
    }

    pub fn dhash_size(mut self, size: u32) -> Self {
        self.config.dhash_size = size;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> CoreConfig {
        self.config
    }
}
