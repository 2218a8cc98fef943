// ============================================================================
// cropshot-core/src/processing/batch.rs
// ============================================================================
//
// BATCH ORCHESTRATION: Crop, extract and de-duplicate a folder of videos
//
// WORKFLOW:
// 1. Phase 1 (bounded rayon pool): for every input, probe dimensions, detect
//    borders, crop-transcode on the GPU or copy the source unmodified into the
//    intermediate directory
// 2. Phase 2 (sequential): extract scene keyframes from every intermediate
//    file into <output_dir>/<stem>/
// 3. Phase 3: remove perceptual duplicates from each frame directory
// 4. Optionally delete the intermediate files
//
// A failure on one video never aborts the batch; it is recorded in that
// video's outcome and processing moves on.

// ---- Internal crate imports ----
use crate::config::CoreConfig;
use crate::discovery::{find_intermediate_files, find_processable_files, find_skipped_files};
use crate::error::{CoreError, CoreResult};
use crate::external::{FfmpegSpawner, MediaProbe, probe_dimensions};
use crate::processing::crop_detection::{CropRectangle, DetectionStrategy, detect_crop};
use crate::processing::dedup::remove_duplicates;
use crate::processing::frames::extract_frames;
use crate::processing::transcode::crop_transcode;
use crate::temp_files::copy_via_temp;
use crate::terminal;
use crate::utils::{format_bytes, format_elapsed, get_filename_safe, get_stem_safe};

// ---- External crate imports ----
use rayon::prelude::*;

// ---- Standard library imports ----
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

// ============================================================================
// OUTCOME TYPES
// ============================================================================

/// Phase 1 result class of one video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoStatus {
    Crop(DetectionStrategy),
    /// No worthwhile crop, source copied unmodified.
    Copy,
    /// Crop transcode failed, source copied unmodified.
    CopyAfterError,
    /// Dimensions could not be probed; nothing written.
    ErrorDimensions,
    /// Nothing could be written for this input.
    Error,
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoStatus::Crop(strategy) => write!(f, "crop[{strategy}]"),
            VideoStatus::Copy => write!(f, "copy"),
            VideoStatus::CopyAfterError => write!(f, "copy_after_error"),
            VideoStatus::ErrorDimensions => write!(f, "error_dimensions"),
            VideoStatus::Error => write!(f, "error"),
        }
    }
}

/// What phase 1 did with one input.
#[derive(Debug, Clone)]
pub struct VideoOutcome {
    pub source: PathBuf,
    /// Cropped or copied file, if one was written.
    pub intermediate: Option<PathBuf>,
    pub status: VideoStatus,
    pub crop: Option<CropRectangle>,
    pub elapsed: Duration,
}

/// What phases 2 and 3 did with one intermediate file.
#[derive(Debug, Clone, Default)]
pub struct FrameOutcome {
    pub video: PathBuf,
    pub frame_dir: PathBuf,
    pub frames_kept: usize,
    pub duplicates_removed: usize,
    pub error: Option<String>,
}

/// Everything a batch run did.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub videos: Vec<VideoOutcome>,
    /// Input-directory files that are not videos.
    pub skipped: Vec<PathBuf>,
    pub frames: Vec<FrameOutcome>,
    pub phase1_time: Duration,
    pub phase2_time: Duration,
    pub phase3_time: Duration,
}

impl BatchSummary {
    /// Number of videos per phase 1 status, keyed by the status label.
    pub fn status_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for outcome in &self.videos {
            *counts.entry(outcome.status.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn total_frames(&self) -> usize {
        self.frames.iter().map(|f| f.frames_kept).sum()
    }

    pub fn total_duplicates(&self) -> usize {
        self.frames.iter().map(|f| f.duplicates_removed).sum()
    }
}

// ============================================================================
// PHASE 1
// ============================================================================

/// Intermediate path for a source: `<intermediate_dir>/<stem>.mp4`.
pub fn intermediate_path(src: &Path, config: &CoreConfig) -> CoreResult<PathBuf> {
    let stem = get_stem_safe(src)?;
    Ok(config.intermediate_dir.join(format!("{stem}.mp4")))
}

/// Intermediate paths for a whole batch, one per input and never shared.
///
/// Inputs whose stems clash (`a.mp4`, `a.mkv`) keep their extension in the
/// name (`a.mp4.mp4`, `a.mkv.mp4`); anything still taken gets a `_<n>` suffix.
/// Stems are compared case-insensitively.
pub fn intermediate_paths(files: &[PathBuf], config: &CoreConfig) -> Vec<CoreResult<PathBuf>> {
    let stems: Vec<CoreResult<String>> = files.iter().map(|f| get_stem_safe(f)).collect();
    let mut stem_counts: HashMap<String, usize> = HashMap::new();
    for stem in stems.iter().flatten() {
        *stem_counts.entry(stem.to_lowercase()).or_insert(0) += 1;
    }

    let mut taken: HashSet<String> = HashSet::new();
    files
        .iter()
        .zip(stems)
        .map(|(src, stem)| {
            let stem = stem?;
            let mut base = stem.clone();
            if stem_counts.get(&stem.to_lowercase()).copied().unwrap_or(0) > 1 {
                if let Some(ext) = src.extension() {
                    base = format!("{stem}.{}", ext.to_string_lossy());
                }
            }
            let mut name = base.clone();
            let mut n = 2;
            while !taken.insert(name.to_lowercase()) {
                name = format!("{base}_{n}");
                n += 1;
            }
            Ok(config.intermediate_dir.join(format!("{name}.mp4")))
        })
        .collect()
}

fn copy_source(src: &Path, dst: &Path) -> bool {
    match copy_via_temp(src, dst) {
        Ok(bytes) => {
            log::debug!(
                "Copied {} ({}) to {}",
                src.display(),
                format_bytes(bytes),
                dst.display()
            );
            true
        }
        Err(e) => {
            log::error!("Could not copy {} to {}: {}", src.display(), dst.display(), e);
            false
        }
    }
}

/// Runs border detection and crop-transcode (or copy) for one video, writing
/// to [`intermediate_path`].
pub fn process_video<S, P>(spawner: &S, probe: &P, src: &Path, config: &CoreConfig) -> VideoOutcome
where
    S: FfmpegSpawner,
    P: MediaProbe + ?Sized,
{
    process_into(spawner, probe, src, intermediate_path(src, config), config)
}

fn process_into<S, P>(
    spawner: &S,
    probe: &P,
    src: &Path,
    dst: CoreResult<PathBuf>,
    config: &CoreConfig,
) -> VideoOutcome
where
    S: FfmpegSpawner,
    P: MediaProbe + ?Sized,
{
    let start = Instant::now();
    let mut outcome = VideoOutcome {
        source: src.to_path_buf(),
        intermediate: None,
        status: VideoStatus::Error,
        crop: None,
        elapsed: Duration::ZERO,
    };

    let dst = match dst {
        Ok(dst) => dst,
        Err(e) => {
            log::error!("{}", e);
            outcome.elapsed = start.elapsed();
            return outcome;
        }
    };

    let Some((width, height)) = probe_dimensions(probe, src) else {
        log::error!("Could not read dimensions of {}", src.display());
        outcome.status = VideoStatus::ErrorDimensions;
        outcome.elapsed = start.elapsed();
        return outcome;
    };

    let (status, copied) = match detect_crop(spawner, probe, src, width, height, config) {
        Some(decision) => {
            outcome.crop = Some(decision.rect);
            match crop_transcode(spawner, probe, src, &dst, &decision.rect, width, height, config) {
                Ok(()) => (VideoStatus::Crop(decision.strategy), true),
                Err(e) => {
                    log::warn!("Crop of {} failed, copying instead: {}", src.display(), e);
                    (VideoStatus::CopyAfterError, copy_source(src, &dst))
                }
            }
        }
        None => (VideoStatus::Copy, copy_source(src, &dst)),
    };

    if copied {
        outcome.status = status;
        outcome.intermediate = Some(dst);
    }
    outcome.elapsed = start.elapsed();
    log::info!(
        "{} -> {} ({})",
        src.display(),
        outcome.status,
        format_elapsed(outcome.elapsed)
    );
    outcome
}

/// Phase 1 over all inputs with at most `config.workers` videos in flight.
///
/// Outcomes come back in input order.
pub fn run_crop_phase<S, P>(
    spawner: &S,
    probe: &P,
    files: &[PathBuf],
    config: &CoreConfig,
) -> Vec<VideoOutcome>
where
    S: FfmpegSpawner,
    P: MediaProbe + ?Sized,
{
    let jobs: Vec<(&PathBuf, CoreResult<PathBuf>)> =
        files.iter().zip(intermediate_paths(files, config)).collect();
    let run_inline = |jobs: Vec<(&PathBuf, CoreResult<PathBuf>)>| -> Vec<VideoOutcome> {
        jobs.into_iter()
            .map(|(src, dst)| process_into(spawner, probe, src, dst, config))
            .collect()
    };

    if config.workers <= 1 || files.len() <= 1 {
        return run_inline(jobs);
    }

    let workers = config.workers.min(files.len());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("cropshot-crop-{i}"))
        .build();
    match pool {
        Ok(pool) => {
            log::debug!("Phase 1 pool started with {} thread(s)", workers);
            pool.install(|| {
                jobs.into_par_iter()
                    .map(|(src, dst)| process_into(spawner, probe, src, dst, config))
                    .collect()
            })
        }
        Err(e) => {
            log::warn!("Could not start {} phase 1 workers, running inline: {}", workers, e);
            run_inline(jobs)
        }
    }
}

// ============================================================================
// PHASES 2 AND 3
// ============================================================================

/// Phase 2: sequential keyframe extraction for every intermediate file.
pub fn run_extract_phase<S, P>(
    spawner: &S,
    probe: &P,
    intermediates: &[PathBuf],
    config: &CoreConfig,
) -> Vec<FrameOutcome>
where
    S: FfmpegSpawner,
    P: MediaProbe + ?Sized,
{
    intermediates
        .iter()
        .map(|video| {
            let mut outcome = FrameOutcome {
                video: video.clone(),
                ..Default::default()
            };
            let frame_dir = match get_stem_safe(video) {
                Ok(stem) => config.output_dir.join(stem),
                Err(e) => {
                    outcome.error = Some(e.to_string());
                    return outcome;
                }
            };
            outcome.frame_dir = frame_dir.clone();
            match extract_frames(spawner, probe, video, &frame_dir, config) {
                Ok(count) => outcome.frames_kept = count,
                Err(e) => {
                    log::error!("Frame extraction failed for {}: {}", video.display(), e);
                    outcome.error = Some(e.to_string());
                }
            }
            outcome
        })
        .collect()
}

/// Phase 3: de-duplicates every frame directory that extraction produced.
pub fn run_dedup_phase(frames: &mut [FrameOutcome], config: &CoreConfig) {
    for outcome in frames.iter_mut().filter(|o| o.error.is_none()) {
        if !outcome.frame_dir.is_dir() {
            continue;
        }
        match remove_duplicates(&outcome.frame_dir, config.dhash_size) {
            Ok(report) => {
                outcome.duplicates_removed = report.removed;
                outcome.frames_kept = report.kept.len();
            }
            Err(e) => log::warn!(
                "De-duplication failed for {}: {}",
                outcome.frame_dir.display(),
                e
            ),
        }
    }
}

/// Deletes intermediate files, then their directory if it is empty.
pub fn remove_intermediates(intermediates: &[PathBuf], dir: &Path) {
    for file in intermediates {
        if let Err(e) = std::fs::remove_file(file) {
            log::warn!("Could not delete {}: {}", file.display(), e);
        }
    }
    if let Err(e) = std::fs::remove_dir(dir) {
        log::warn!("Could not remove {}: {}", dir.display(), e);
    }
}

// ============================================================================
// ENTRY POINT
// ============================================================================

/// Runs all phases over `config.input_dir`.
///
/// Fails only when the inputs cannot be listed or the output directories
/// cannot be created; per-video failures are recorded in the summary.
pub fn run_batch<S, P>(spawner: &S, probe: &P, config: &CoreConfig) -> CoreResult<BatchSummary>
where
    S: FfmpegSpawner,
    P: MediaProbe + ?Sized,
{
    let files = find_processable_files(&config.input_dir)?;
    std::fs::create_dir_all(&config.intermediate_dir)?;
    std::fs::create_dir_all(&config.output_dir)?;
    let mut summary = BatchSummary {
        skipped: find_skipped_files(&config.input_dir)?,
        ..Default::default()
    };
    for path in &summary.skipped {
        log::debug!("Skipping non-video input {}", path.display());
    }

    terminal::print_section("Phase 1: crop");
    terminal::print_status("Videos", &files.len().to_string());
    if !summary.skipped.is_empty() {
        terminal::print_status("Skipped", &summary.skipped.len().to_string());
    }
    terminal::print_status("Workers", &config.workers.max(1).to_string());
    let start = Instant::now();
    summary.videos = run_crop_phase(spawner, probe, &files, config);
    summary.phase1_time = start.elapsed();
    for outcome in &summary.videos {
        let name = get_filename_safe(&outcome.source).unwrap_or_default();
        terminal::print_status(&name, &outcome.status.to_string());
    }
    terminal::print_success(&format!(
        "Phase 1 done in {}",
        format_elapsed(summary.phase1_time)
    ));

    terminal::print_section("Phase 2: frames");
    let start = Instant::now();
    let intermediates = match find_intermediate_files(&config.intermediate_dir) {
        Ok(files) => files,
        Err(CoreError::NoFilesFound(_)) => {
            terminal::print_warning("No intermediate videos to extract from");
            Vec::new()
        }
        Err(e) => return Err(e),
    };
    summary.frames = run_extract_phase(spawner, probe, &intermediates, config);
    summary.phase2_time = start.elapsed();
    terminal::print_success(&format!(
        "Phase 2 done in {}, {} frame(s)",
        format_elapsed(summary.phase2_time),
        summary.total_frames()
    ));

    if config.deduplicate {
        terminal::print_section("Phase 3: de-duplicate");
        let start = Instant::now();
        run_dedup_phase(&mut summary.frames, config);
        summary.phase3_time = start.elapsed();
        terminal::print_success(&format!(
            "Phase 3 done in {}, removed {} duplicate(s)",
            format_elapsed(summary.phase3_time),
            summary.total_duplicates()
        ));
    }

    if config.delete_intermediate {
        log::info!("Deleting {} intermediate file(s)", intermediates.len());
        remove_intermediates(&intermediates, &config.intermediate_dir);
    }

    Ok(summary)
}
