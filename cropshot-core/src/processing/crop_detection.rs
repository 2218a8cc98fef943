//! Letterbox/pillarbox detection.
//!
//! Two strategies produce a candidate rectangle for a source video:
//!
//! 1. cropdetect probes: a few short windows spread across the clip are run
//!    through ffmpeg's `cropdetect`; the last rectangle of each window is
//!    kept and the union of all windows, grown by a safety margin, is the
//!    candidate.
//! 2. gradient fallback (see [`super::gradient`]), used only when the first
//!    candidate is missing or fails [`is_good_crop`].
//!
//! A candidate that fails the goodness test means "no crop needed", never an
//! error.

use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::external::{FfmpegProcess, FfmpegSpawner, MediaProbe, probe_duration};
use crate::hardware::add_cuda_hwaccel;
use crate::processing::gradient::detect_crop_gradient;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::FfmpegEvent;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A crop region in source pixel coordinates.
///
/// Only non-empty rectangles can be constructed, so a value of this type is
/// always safe to apply; "no rectangle" is expressed as `Option::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CropRectangle {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRectangle {
    /// Returns `None` when either dimension is zero.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self {
            x,
            y,
            width,
            height,
        })
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Self) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Self {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }

    /// Grows the rectangle by `margin` on every side, stopping at zero.
    pub fn expand(&self, margin: u32) -> Self {
        let x = self.x.saturating_sub(margin);
        let y = self.y.saturating_sub(margin);
        Self {
            x,
            y,
            width: self.right().saturating_add(margin) - x,
            height: self.bottom().saturating_add(margin) - y,
        }
    }

    /// Intersects the rectangle with a `frame_w` x `frame_h` frame.
    pub fn clamp_to(&self, frame_w: u32, frame_h: u32) -> Option<Self> {
        if self.x >= frame_w || self.y >= frame_h {
            return None;
        }
        Self::new(
            self.x,
            self.y,
            self.width.min(frame_w - self.x),
            self.height.min(frame_h - self.y),
        )
    }

    /// Multiplies every coordinate by `factor`, truncating.
    pub fn scale(&self, factor: f64) -> Option<Self> {
        let s = |v: u32| (f64::from(v) * factor) as u32;
        Self::new(s(self.x), s(self.y), s(self.width), s(self.height))
    }
}

/// Renders the `w:h:x:y` geometry used by ffmpeg's crop filters.
impl fmt::Display for CropRectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.width, self.height, self.x, self.y)
    }
}

impl FromStr for CropRectangle {
    type Err = CoreError;

    /// Parses `w:h:x:y`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::OperationFailed(format!("invalid crop geometry '{s}'"));
        let parts: Vec<u32> = s
            .split(':')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|_| invalid())?;
        match parts.as_slice() {
            [w, h, x, y] => Self::new(*x, *y, *w, *h).ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }
}

/// Which strategy produced an accepted crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionStrategy {
    Ffmpeg,
    Gradient,
}

impl fmt::Display for DetectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionStrategy::Ffmpeg => write!(f, "ffmpeg"),
            DetectionStrategy::Gradient => write!(f, "gradient"),
        }
    }
}

/// An accepted crop: clamped to the frame and passing [`is_good_crop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropDecision {
    pub rect: CropRectangle,
    pub strategy: DetectionStrategy,
}

/// Decides whether `rect` is worth applying to an `original_w` x `original_h` frame.
///
/// The crop must shrink at least one dimension below `(1 - min_crop_ratio)`
/// of the original, and both dimensions must stay above 5% of the original
/// to reject slivers.
pub fn is_good_crop(
    rect: &CropRectangle,
    original_w: u32,
    original_h: u32,
    min_crop_ratio: f64,
) -> bool {
    if rect.width == 0 || rect.height == 0 {
        return false;
    }
    let (w, h) = (f64::from(rect.width), f64::from(rect.height));
    let (ow, oh) = (f64::from(original_w), f64::from(original_h));

    let significant = w < ow * (1.0 - min_crop_ratio) || h < oh * (1.0 - min_crop_ratio);
    let sensible = w > 0.05 * ow && h > 0.05 * oh;
    significant && sensible
}

/// Union of all probe rectangles, expanded by `margin` and clamped at zero.
///
/// Returns `None` for an empty slice.
pub fn union_with_margin(rects: &[CropRectangle], margin: u32) -> Option<CropRectangle> {
    let (first, rest) = rects.split_first()?;
    let union = rest.iter().fold(*first, |acc, r| acc.union(r));
    Some(union.expand(margin))
}

/// Extracts the last `crop=w:h:x:y` reported in a block of ffmpeg log lines.
///
/// Later cropdetect reports refine earlier ones within the same window, so
/// only the final valid rectangle counts.
pub fn parse_last_crop<'a, I>(lines: I) -> Option<CropRectangle>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut last = None;
    for line in lines {
        for (pos, _) in line.match_indices("crop=") {
            let value = &line[pos + 5..];
            let end = value
                .find(|c: char| !(c.is_ascii_digit() || c == ':'))
                .unwrap_or(value.len());
            if let Ok(rect) = value[..end].parse::<CropRectangle>() {
                last = Some(rect);
            }
        }
    }
    last
}

/// Evenly spaced probe start times: `duration * (k+1)/(n+1)` for `k` in `0..n`.
pub fn probe_timestamps(duration: f64, probes: usize) -> Vec<f64> {
    (0..probes)
        .map(|k| duration * (k as f64 + 1.0) / (probes as f64 + 1.0))
        .collect()
}

fn build_probe_command(src: &Path, start: f64, config: &CoreConfig) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new();
    cmd.arg("-hide_banner");
    cmd.args(["-ss", &format!("{start:.3}"), "-t", &config.probe_secs.to_string()]);
    add_cuda_hwaccel(&mut cmd);
    cmd.input(&*src.to_string_lossy());
    cmd.args([
        "-vf",
        &format!("cropdetect={}", config.cropdetect_params),
        "-an",
        "-f",
        "null",
        "-",
    ]);
    cmd
}

/// Runs one cropdetect window. Failures are logged and yield `None`.
fn run_probe<S: FfmpegSpawner>(
    spawner: &S,
    src: &Path,
    start: f64,
    config: &CoreConfig,
) -> Option<CropRectangle> {
    let cmd = build_probe_command(src, start, config);
    let mut process = match spawner.spawn(cmd) {
        Ok(process) => process,
        Err(e) => {
            log::warn!("cropdetect probe at {:.1}s failed to start: {}", start, e);
            return None;
        }
    };

    let mut lines = Vec::new();
    let handled = process.handle_events(|event| {
        if let FfmpegEvent::Log(_, line) | FfmpegEvent::Error(line) = event {
            if line.contains("crop=") {
                lines.push(line);
            }
        }
        Ok(())
    });
    let status = process.wait();

    match (handled, status) {
        (Ok(()), Ok(status)) if status.success() => {
            parse_last_crop(lines.iter().map(String::as_str))
        }
        (Err(e), _) | (_, Err(e)) => {
            log::warn!("cropdetect probe at {:.1}s failed: {}", start, e);
            None
        }
        (_, Ok(status)) => {
            log::warn!("cropdetect probe at {:.1}s exited with {}", start, status);
            None
        }
    }
}

/// Strategy A: aggregate several cropdetect windows into one rectangle.
///
/// Returns `None` if the duration is unknown or no window reported a
/// rectangle.
pub fn detect_crop_ffmpeg<S, P>(
    spawner: &S,
    probe: &P,
    src: &Path,
    config: &CoreConfig,
) -> Option<CropRectangle>
where
    S: FfmpegSpawner,
    P: MediaProbe + ?Sized,
{
    let duration = match probe_duration(probe, src) {
        Some(d) if d > 0.0 => d,
        _ => {
            log::debug!("No duration for {}, skipping cropdetect", src.display());
            return None;
        }
    };

    let rects: Vec<CropRectangle> = probe_timestamps(duration, config.crop_probes)
        .into_iter()
        .filter_map(|ts| {
            let rect = run_probe(spawner, src, ts, config);
            log::debug!("cropdetect {} @ {:.2}s -> {:?}", src.display(), ts, rect);
            rect
        })
        .collect();

    union_with_margin(&rects, config.safe_margin)
}

/// Clamps a candidate to the frame and re-applies the goodness test.
fn accept(
    rect: CropRectangle,
    original_w: u32,
    original_h: u32,
    config: &CoreConfig,
) -> Option<CropRectangle> {
    if !is_good_crop(&rect, original_w, original_h, config.min_crop_ratio) {
        return None;
    }
    rect.clamp_to(original_w, original_h)
        .filter(|r| is_good_crop(r, original_w, original_h, config.min_crop_ratio))
}

/// Runs strategy A and, if it yields nothing usable, strategy B.
///
/// Returns `None` when neither finds a crop worth applying.
pub fn detect_crop<S, P>(
    spawner: &S,
    probe: &P,
    src: &Path,
    original_w: u32,
    original_h: u32,
    config: &CoreConfig,
) -> Option<CropDecision>
where
    S: FfmpegSpawner,
    P: MediaProbe + ?Sized,
{
    if let Some(rect) = detect_crop_ffmpeg(spawner, probe, src, config)
        .and_then(|r| accept(r, original_w, original_h, config))
    {
        log::info!("{}: cropdetect found {}", src.display(), rect);
        return Some(CropDecision {
            rect,
            strategy: DetectionStrategy::Ffmpeg,
        });
    }

    log::info!(
        "{}: cropdetect gave no usable crop, trying gradient detection",
        src.display()
    );
    let rect = detect_crop_gradient(spawner, src, original_w, original_h, config)
        .and_then(|r| accept(r, original_w, original_h, config));
    match rect {
        Some(rect) => {
            log::info!("{}: gradient detection found {}", src.display(), rect);
            Some(CropDecision {
                rect,
                strategy: DetectionStrategy::Gradient,
            })
        }
        None => {
            log::info!("{}: no crop needed", src.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: u32, y: u32, w: u32, h: u32) -> CropRectangle {
        CropRectangle::new(x, y, w, h).unwrap()
    }

    #[test]
    fn empty_rectangles_cannot_be_built() {
        assert!(CropRectangle::new(0, 0, 0, 10).is_none());
        assert!(CropRectangle::new(0, 0, 10, 0).is_none());
        assert!(CropRectangle::new(5, 5, 1, 1).is_some());
    }

    #[test]
    fn geometry_round_trips_through_display() {
        let r = rect(0, 140, 1920, 800);
        assert_eq!(r.to_string(), "1920:800:0:140");
        assert_eq!("1920:800:0:140".parse::<CropRectangle>().unwrap(), r);
        assert!("1920:800:0".parse::<CropRectangle>().is_err());
        assert!("1920:800:0:-4".parse::<CropRectangle>().is_err());
        assert!("0:800:0:0".parse::<CropRectangle>().is_err());
    }

    #[test]
    fn zero_margin_reproduces_raw_union() {
        let rects = [rect(10, 80, 1900, 560), rect(0, 84, 1920, 550), rect(4, 78, 1910, 566)];
        let union = union_with_margin(&rects, 0).unwrap();
        assert_eq!(union, rect(0, 78, 1920, 566));
    }

    #[test]
    fn margin_expands_every_side_and_clamps_at_zero() {
        let rects = [rect(2, 80, 100, 50), rect(10, 90, 100, 50)];
        // raw union: x 2..110, y 80..140
        let union = union_with_margin(&rects, 4).unwrap();
        assert_eq!(union, rect(0, 76, 114, 68));
        assert_eq!(union_with_margin(&[], 4), None);
    }

    #[test]
    fn last_crop_wins() {
        let lines = [
            "[Parsed_cropdetect_0 @ 0x1] x1:0 x2:1279 y1:90 y2:629 w:1280 h:528 x:0 y:96 pts:0 t:0.0 crop=1280:528:0:96",
            "frame=   12 fps=0.0 q=-0.0 size=N/A time=00:00:00.48",
            "[Parsed_cropdetect_0 @ 0x1] x1:0 x2:1279 y1:80 y2:639 w:1280 h:560 x:0 y:80 pts:1 t:0.04 crop=1280:560:0:80",
            "[Parsed_cropdetect_0 @ 0x1] crop=-1264:-704:1272:712",
        ];
        assert_eq!(parse_last_crop(lines), Some(rect(0, 80, 1280, 560)));
        assert_eq!(parse_last_crop(["no crop here"]), None);
    }

    #[test]
    fn probe_times_are_evenly_spaced() {
        assert_eq!(probe_timestamps(120.0, 3), vec![30.0, 60.0, 90.0]);
        assert!(probe_timestamps(120.0, 0).is_empty());
    }

    #[test]
    fn good_crop_boundary_is_exclusive() {
        // 0.75 * 1280 = 960 and 0.75 * 720 = 540 exactly.
        let ratio = 0.25;
        assert!(!is_good_crop(&rect(0, 0, 960, 720), 1280, 720, ratio));
        assert!(is_good_crop(&rect(0, 0, 959, 720), 1280, 720, ratio));
        assert!(!is_good_crop(&rect(0, 0, 1280, 540), 1280, 720, ratio));
        assert!(is_good_crop(&rect(0, 0, 1280, 539), 1280, 720, ratio));
    }

    #[test]
    fn good_crop_is_monotonic_in_height() {
        let ratio = 0.10;
        let mut flipped = false;
        for h in (1..=720).rev() {
            let good = is_good_crop(&rect(0, 0, 1280, h), 1280, 720, ratio);
            if flipped {
                // Once good, shrinking further stays good until the sliver limit.
                if f64::from(h) > 0.05 * 720.0 {
                    assert!(good, "height {h} should remain a good crop");
                }
            } else if good {
                flipped = true;
                assert!(f64::from(h) < 720.0 * 0.9);
            }
        }
        assert!(flipped);
    }

    #[test]
    fn slivers_and_full_frames_are_rejected() {
        assert!(!is_good_crop(&rect(0, 0, 1920, 1080), 1920, 1080, 0.1));
        assert!(!is_good_crop(&rect(0, 0, 1920, 40), 1920, 1080, 0.1));
        assert!(!is_good_crop(&rect(0, 0, 90, 1080), 1920, 1080, 0.1));
        assert!(is_good_crop(&rect(0, 140, 1920, 800), 1920, 1080, 0.1));
    }

    #[test]
    fn clamp_keeps_rectangles_inside_the_frame() {
        assert_eq!(rect(0, 76, 1288, 568).clamp_to(1280, 720), Some(rect(0, 76, 1280, 568)));
        assert_eq!(rect(0, 700, 1280, 100).clamp_to(1280, 720), Some(rect(0, 700, 1280, 20)));
        assert_eq!(rect(1280, 0, 10, 10).clamp_to(1280, 720), None);
    }

    #[test]
    fn scale_truncates() {
        assert_eq!(rect(1, 40, 639, 281).scale(2.0), Some(rect(2, 80, 1278, 562)));
        assert_eq!(rect(0, 0, 1, 1).scale(0.5), None);
    }
}
