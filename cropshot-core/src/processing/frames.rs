//! Scene keyframe extraction.
//!
//! For one (cropped) video: ffmpeg's scene-change filter writes candidate
//! images to a scratch directory. Each candidate is trimmed of uniform
//! borders and dropped if what remains is uninformative. If too few survive,
//! frames are pulled at evenly spaced positions and filtered the same way.
//! Survivors are sorted by time and written as `<seq>_<seconds>.png`.

use crate::config::CoreConfig;
use crate::error::CoreResult;
use crate::external::{
    FfmpegSpawner, MediaProbe, capture_frames, probe_duration, probe_fps, probe_frame_count,
    run_to_completion,
};
use crate::temp_files::create_temp_dir;
use ffmpeg_sidecar::command::FfmpegCommand;
use image::{RgbImage, imageops};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Frame rate assumed when the source does not report one.
pub const FALLBACK_FPS: f64 = 25.0;

/// Images smaller than this in either dimension only get the flat test.
const SOLID_MIN_DIM: u32 = 10;

/// One frame kept for output.
#[derive(Debug, Clone)]
pub struct ExtractedFrameRecord {
    /// 1-based position in the written sequence
    pub sequence_index: usize,
    pub timestamp_seconds: f64,
    pub image_data: RgbImage,
}

impl ExtractedFrameRecord {
    /// `<seq>_<seconds to 2dp>.png`
    pub fn file_name(&self) -> String {
        format!("{}_{:.2}.png", self.sequence_index, self.timestamp_seconds)
    }
}

// ---- Frame classification ----

fn channel_median(values: &mut [u8]) -> i32 {
    values.sort_unstable();
    let n = values.len();
    if n % 2 == 1 {
        i32::from(values[n / 2])
    } else {
        (i32::from(values[n / 2 - 1]) + i32::from(values[n / 2])) / 2
    }
}

/// A line is blank when every pixel is within `tolerance` of the line's
/// per-channel median, summed over the three channels.
pub fn is_blank_line<I>(pixels: I, tolerance: u32) -> bool
where
    I: Iterator<Item = [u8; 3]> + Clone,
{
    let mut channels: [Vec<u8>; 3] = Default::default();
    for px in pixels.clone() {
        for (c, v) in channels.iter_mut().zip(px) {
            c.push(v);
        }
    }
    if channels[0].is_empty() {
        return true;
    }
    let median = channels.each_mut().map(|c| channel_median(c));
    let tolerance = i64::from(tolerance);
    pixels.into_iter().all(|px| {
        let deviation: i64 = px
            .iter()
            .zip(median)
            .map(|(v, m)| i64::from((i32::from(*v) - m).abs()))
            .sum();
        deviation <= tolerance
    })
}

fn column(img: &RgbImage, x: u32) -> impl Iterator<Item = [u8; 3]> + Clone + '_ {
    (0..img.height()).map(move |y| img.get_pixel(x, y).0)
}

fn row(img: &RgbImage, y: u32) -> impl Iterator<Item = [u8; 3]> + Clone + '_ {
    (0..img.width()).map(move |x| img.get_pixel(x, y).0)
}

/// Finds the region inside uniform borders as `(x, y, width, height)`.
///
/// Returns `None` when every row or every column is blank.
pub fn content_bounds(img: &RgbImage, tolerance: u32) -> Option<(u32, u32, u32, u32)> {
    let (w, h) = img.dimensions();
    let x0 = (0..w).find(|&x| !is_blank_line(column(img, x), tolerance))?;
    let x1 = (0..w).rev().find(|&x| !is_blank_line(column(img, x), tolerance))?;
    let y0 = (0..h).find(|&y| !is_blank_line(row(img, y), tolerance))?;
    let y1 = (0..h).rev().find(|&y| !is_blank_line(row(img, y), tolerance))?;
    Some((x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// Crops uniform borders. Images without any content line come back unchanged.
pub fn trim_borders(img: &RgbImage, tolerance: u32) -> RgbImage {
    match content_bounds(img, tolerance) {
        Some((x, y, w, h)) if (w, h) != img.dimensions() => {
            imageops::crop_imm(img, x, y, w, h).to_image()
        }
        _ => img.clone(),
    }
}

/// True when every pixel has the same luma.
pub fn is_flat(img: &RgbImage) -> bool {
    let gray = imageops::grayscale(img);
    let mut values = gray.pixels().map(|p| p[0]);
    match values.next() {
        Some(first) => values.all(|v| v == first),
        None => true,
    }
}

fn channel_std(img: &RgbImage, channel: usize) -> f64 {
    let n = f64::from(img.width()) * f64::from(img.height());
    let (sum, sum_sq) = img.pixels().fold((0.0, 0.0), |(s, sq), p| {
        let v = f64::from(p[channel]);
        (s + v, sq + v * v)
    });
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0).sqrt()
}

/// True for flat images and for images whose three channels all have a
/// standard deviation below `std_threshold`.
pub fn is_uninformative(img: &RgbImage, std_threshold: f64) -> bool {
    if img.width() == 0 || img.height() == 0 || is_flat(img) {
        return true;
    }
    if img.width() < SOLID_MIN_DIM || img.height() < SOLID_MIN_DIM {
        return false;
    }
    (0..3).all(|c| channel_std(img, c) < std_threshold)
}

/// Trims borders and returns the result unless it is uninformative.
pub fn accept_frame(img: &RgbImage, config: &CoreConfig) -> Option<RgbImage> {
    let trimmed = trim_borders(img, config.line_tolerance);
    (!is_uninformative(&trimmed, config.solid_std_threshold)).then_some(trimmed)
}

// ---- Scene candidates ----

fn build_scene_command(video: &Path, pattern: &Path, threshold: f64) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new();
    cmd.args(["-hide_banner", "-loglevel", "error"]);
    cmd.input(&*video.to_string_lossy());
    cmd.args([
        "-vf",
        &format!("select='gt(scene\\,{threshold})'"),
        "-vsync",
        "vfr",
        "-frame_pts",
        "1",
        "-q:v",
        "2",
    ]);
    cmd.output(&*pattern.to_string_lossy());
    cmd
}

/// Scene-cut images in `dir`, keyed and sorted by their numeric stem.
pub fn numbered_images(dir: &Path) -> CoreResult<Vec<(u64, PathBuf)>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("png") {
            continue;
        }
        let number = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok());
        match number {
            Some(n) => images.push((n, path)),
            None => log::debug!("Skipping unnumbered scene image {}", path.display()),
        }
    }
    images.sort_by_key(|(n, _)| *n);
    Ok(images)
}

/// Runs the scene filter and loads its accepted, trimmed candidates as `(ts, image)`.
fn scene_candidates<S: FfmpegSpawner>(
    spawner: &S,
    video: &Path,
    fps: f64,
    config: &CoreConfig,
) -> CoreResult<Vec<(f64, RgbImage)>> {
    let scratch = create_temp_dir(config, "cropshot_scene_")?;
    let pattern = scratch.path().join("%d.png");
    run_to_completion(
        spawner,
        build_scene_command(video, &pattern, config.scene_threshold),
        "scene detection",
    )?;

    let images = numbered_images(scratch.path())?;
    log::debug!("{}: {} scene candidate(s)", video.display(), images.len());

    let mut candidates = Vec::new();
    for (number, path) in images {
        let img = match image::open(&path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                log::debug!("Unreadable scene image {}: {}", path.display(), e);
                continue;
            }
        };
        if let Some(trimmed) = accept_frame(&img, config) {
            candidates.push((number as f64 / fps, trimmed));
        }
    }
    Ok(candidates)
}

// ---- Uniform fallback ----

fn build_seek_command(video: &Path, seconds: f64) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new();
    cmd.args(["-hide_banner", "-loglevel", "error"]);
    cmd.args(["-ss", &format!("{seconds:.3}")]);
    cmd.input(&*video.to_string_lossy());
    cmd.args(["-frames:v", "1", "-pix_fmt", "rgb24", "-f", "rawvideo", "-"]);
    cmd
}

/// Distinct frame positions visited by the fallback, at most `needed * 5`.
///
/// The first round is `needed + 1` evenly spaced positions starting at 0.
/// Later rounds shift the same grid by a growing fraction of the spacing.
/// Short videos yield fewer positions than the budget.
pub fn fallback_positions(total_frames: u64, needed: usize) -> Vec<u64> {
    let total = total_frames.max(1);
    let slots = needed as u64 + 1;
    let step = (total / slots).max(1);
    let budget = needed as u64 * 5;
    let rounds = budget.div_ceil(slots).max(1);

    let mut seen = HashSet::new();
    (0..budget)
        .map(|attempt| {
            let (round, slot) = (attempt / slots, attempt % slots);
            slot * step + round * step / rounds
        })
        .filter(|&pos| pos < total && seen.insert(pos))
        .collect()
}

fn seek_frame<S: FfmpegSpawner>(spawner: &S, video: &Path, seconds: f64) -> Option<RgbImage> {
    let frames = capture_frames(spawner, build_seek_command(video, seconds), "frame seek", 1)
        .map_err(|e| log::debug!("Seek to {:.2}s in {} failed: {}", seconds, video.display(), e))
        .ok()?;
    let frame = frames.into_iter().next()?;
    RgbImage::from_raw(frame.width, frame.height, frame.data)
}

fn fallback_candidates<S, P>(
    spawner: &S,
    probe: &P,
    video: &Path,
    fps: f64,
    needed: usize,
    config: &CoreConfig,
) -> Vec<(f64, RgbImage)>
where
    S: FfmpegSpawner,
    P: MediaProbe + ?Sized,
{
    let total = probe_frame_count(probe, video).or_else(|| {
        probe_duration(probe, video)
            .map(|d| (d * fps).floor() as u64)
            .filter(|n| *n > 0)
    });
    let Some(total) = total else {
        log::warn!("{}: frame count unknown, no fallback sampling", video.display());
        return Vec::new();
    };

    let mut added = Vec::new();
    for pos in fallback_positions(total, needed) {
        if added.len() >= needed {
            break;
        }
        let ts = pos as f64 / fps;
        let Some(img) = seek_frame(spawner, video, ts) else {
            break;
        };
        match accept_frame(&img, config) {
            Some(trimmed) => added.push((ts, trimmed)),
            None => log::debug!("{}: rejected fallback frame at {:.2}s", video.display(), ts),
        }
    }
    added
}

// ---- Public entry ----

/// Numbers accepted candidates in timestamp order, starting at 1.
pub fn finalize_candidates(mut candidates: Vec<(f64, RgbImage)>) -> Vec<ExtractedFrameRecord> {
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
    candidates
        .into_iter()
        .enumerate()
        .map(|(i, (ts, img))| ExtractedFrameRecord {
            sequence_index: i + 1,
            timestamp_seconds: ts,
            image_data: img,
        })
        .collect()
}

/// Extracts keyframes of `video` into `out_dir` and returns how many were written.
pub fn extract_frames<S, P>(
    spawner: &S,
    probe: &P,
    video: &Path,
    out_dir: &Path,
    config: &CoreConfig,
) -> CoreResult<usize>
where
    S: FfmpegSpawner,
    P: MediaProbe + ?Sized,
{
    std::fs::create_dir_all(out_dir)?;
    let fps = probe_fps(probe, video).unwrap_or(FALLBACK_FPS);

    let mut candidates = scene_candidates(spawner, video, fps, config)?;
    if candidates.len() < config.min_frames {
        let needed = config.min_frames - candidates.len();
        log::info!(
            "{}: {} scene frame(s), sampling {} more",
            video.display(),
            candidates.len(),
            needed
        );
        candidates.extend(fallback_candidates(spawner, probe, video, fps, needed, config));
    }

    let records = finalize_candidates(candidates);
    for record in &records {
        record.image_data.save(out_dir.join(record.file_name()))?;
    }
    log::info!("{}: kept {} frame(s)", video.display(), records.len());
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn textured(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 7 % 256) as u8, (y * 11 % 256) as u8, 90]))
    }

    #[test]
    fn median_handles_even_lengths() {
        assert_eq!(channel_median(&mut [1, 9, 3]), 3);
        assert_eq!(channel_median(&mut [1, 2, 4, 9]), 3);
    }

    #[test]
    fn blank_line_uses_summed_deviation() {
        let line = vec![[10, 10, 10], [11, 11, 11], [10, 10, 10]];
        assert!(is_blank_line(line.iter().copied(), 3));
        assert!(!is_blank_line(line.iter().copied(), 2));
        let noisy = vec![[0, 0, 0], [0, 0, 0], [200, 0, 0]];
        assert!(!is_blank_line(noisy.iter().copied(), 5));
    }

    #[test]
    fn trims_letterbox_inclusively() {
        let mut img = RgbImage::from_pixel(40, 30, Rgb([0, 0, 0]));
        let content = textured(40, 20);
        imageops::replace(&mut img, &content, 0, 5);
        assert_eq!(content_bounds(&img, 5), Some((0, 5, 40, 20)));
        let trimmed = trim_borders(&img, 5);
        assert_eq!(trimmed.dimensions(), (40, 20));
    }

    #[test]
    fn all_blank_image_is_left_alone() {
        let img = RgbImage::from_pixel(12, 12, Rgb([30, 30, 30]));
        assert_eq!(content_bounds(&img, 5), None);
        assert_eq!(trim_borders(&img, 5).dimensions(), (12, 12));
    }

    #[test]
    fn solid_and_flat_frames_are_uninformative() {
        assert!(is_uninformative(&RgbImage::from_pixel(20, 20, Rgb([5, 5, 5])), 5.0));
        let faint = RgbImage::from_fn(20, 20, |x, _| Rgb([100 + (x % 2) as u8, 100, 100]));
        assert!(is_uninformative(&faint, 5.0));
        assert!(!is_uninformative(&textured(20, 20), 5.0));
        // Small images only get the flat test.
        let small = RgbImage::from_fn(4, 4, |x, _| Rgb([100 + (x % 2) as u8 * 50, 100, 100]));
        assert!(!is_uninformative(&small, 5.0));
    }

    #[test]
    fn fallback_positions_are_distinct_within_budget() {
        let positions = fallback_positions(250, 4);
        assert_eq!(positions.len(), 20);
        assert_eq!(&positions[..7], &[0, 50, 100, 150, 200, 12, 62]);
        let unique: HashSet<u64> = positions.iter().copied().collect();
        assert_eq!(unique.len(), positions.len());
        assert!(positions.iter().all(|&p| p < 250));

        // Ten frames, four needed: every frame once, never a repeat.
        let short = fallback_positions(10, 4);
        assert_eq!(short, vec![0, 2, 4, 6, 8, 1, 3, 5, 7, 9]);
        assert_eq!(fallback_positions(2, 3), vec![0, 1]);
    }

    #[test]
    fn bordered_flat_frame_is_rejected_after_trim() {
        let config = CoreConfig::default();
        // Black 10px frame around a faint centre: informative only untrimmed.
        let mut img = RgbImage::from_pixel(60, 40, Rgb([0, 0, 0]));
        let faint = RgbImage::from_fn(40, 20, |x, _| Rgb([120 + (x % 2) as u8, 120, 120]));
        imageops::replace(&mut img, &faint, 10, 10);
        assert!(!is_uninformative(&img, config.solid_std_threshold));
        assert!(accept_frame(&img, &config).is_none());

        let mut good = RgbImage::from_pixel(60, 40, Rgb([0, 0, 0]));
        imageops::replace(&mut good, &textured(40, 20), 10, 10);
        let kept = accept_frame(&good, &config).unwrap();
        assert_eq!(kept.dimensions(), (40, 20));
    }

    #[test]
    fn finalize_sorts_and_numbers_from_one() {
        let candidates = vec![
            (8.0, textured(20, 20)),
            (1.5, textured(20, 20)),
            (4.0, textured(20, 20)),
        ];
        let records = finalize_candidates(candidates);
        let names: Vec<String> = records.iter().map(|r| r.file_name()).collect();
        assert_eq!(names, vec!["1_1.50.png", "2_4.00.png", "3_8.00.png"]);
    }
}
