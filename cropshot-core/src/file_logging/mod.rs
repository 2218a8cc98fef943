//! Run-log setup and the structured records written into it.
//!
//! The terminal shows a condensed view of a run; these helpers put the full
//! configuration and per-video results into the log at `info`/`debug` level.

pub mod setup;

pub use setup::{setup_console_logging, setup_file_logging};

use crate::config::CoreConfig;
use crate::processing::batch::BatchSummary;
use crate::utils::format_elapsed;
use log::{debug, info, warn};

/// Writes the effective configuration of a run.
pub fn log_run_configuration(config: &CoreConfig) {
    info!("Run configuration:");
    info!("  Input: {}", config.input_dir.display());
    info!("  Intermediate: {}", config.intermediate_dir.display());
    info!("  Output: {}", config.output_dir.display());
    debug!("  Workers: {}", config.workers);
    debug!(
        "  Crop probes: {} x {:.1}s, cropdetect={}",
        config.crop_probes, config.probe_secs, config.cropdetect_params
    );
    debug!(
        "  Margin: {}px, min crop ratio: {:.2}",
        config.safe_margin, config.min_crop_ratio
    );
    debug!(
        "  Gradient: {} fps, {} samples max, downscale {:.2}, edge threshold {}, tolerance {}",
        config.sample_fps,
        config.max_gradient_samples,
        config.downscale,
        config.edge_threshold,
        config.line_tolerance
    );
    debug!(
        "  Scenes: threshold {:.2}, min frames {}, solid std < {:.1}",
        config.scene_threshold, config.min_frames, config.solid_std_threshold
    );
    debug!("  NVENC: preset {}, cq {}", config.nvenc_preset, config.nvenc_cq);
    debug!(
        "  Dedup: {} (hash size {}), delete intermediate: {}",
        config.deduplicate, config.dhash_size, config.delete_intermediate
    );
}

/// Writes per-video and per-phase results of a finished batch.
pub fn log_batch_summary(summary: &BatchSummary) {
    info!("Batch summary:");
    for (status, count) in summary.status_counts() {
        info!("  {}: {}", status, count);
    }
    if !summary.skipped.is_empty() {
        info!("  skipped: {}", summary.skipped.len());
    }
    for video in &summary.videos {
        match &video.crop {
            Some(rect) => debug!(
                "  {} -> {} crop {} ({})",
                video.source.display(),
                video.status,
                rect,
                format_elapsed(video.elapsed)
            ),
            None => debug!(
                "  {} -> {} ({})",
                video.source.display(),
                video.status,
                format_elapsed(video.elapsed)
            ),
        }
    }
    for frames in &summary.frames {
        match &frames.error {
            Some(e) => warn!("  {}: extraction failed: {}", frames.video.display(), e),
            None => debug!(
                "  {}: {} frame(s) kept, {} duplicate(s) removed",
                frames.frame_dir.display(),
                frames.frames_kept,
                frames.duplicates_removed
            ),
        }
    }
    info!(
        "  Frames: {} kept, {} duplicate(s) removed",
        summary.total_frames(),
        summary.total_duplicates()
    );
    info!(
        "  Time: crop {}, extract {}, dedup {}",
        format_elapsed(summary.phase1_time),
        format_elapsed(summary.phase2_time),
        format_elapsed(summary.phase3_time)
    );
}
