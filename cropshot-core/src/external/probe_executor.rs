//! Media metadata queries.
//!
//! [`MediaProbe`] is the capability interface the detectors and the
//! orchestrator use to learn about a file: single-key queries through the
//! ffprobe CLI (absent on any failure), a filter capability check, and a typed
//! [`VideoDescriptor`] snapshot built on the `ffprobe` crate.

use crate::error::{CoreError, CoreResult, command_failed_error, command_start_error};
use ffprobe::{FfProbeError, ffprobe};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Read-only snapshot of a source video, fetched once per file.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoDescriptor {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Lowercased codec name as reported by ffprobe (`h264`, `hevc`, ...)
    pub codec_id: String,
    pub duration_seconds: Option<f64>,
    pub fps: Option<f64>,
    pub frame_count: Option<u64>,
}

/// Capability interface over the metadata side of the codec engine.
pub trait MediaProbe: Send + Sync {
    /// Returns the first video stream's value for `key`, trimmed and lowercased.
    ///
    /// `key` may list several entries (`"width,height"`); the raw CSV line is
    /// returned in that case. Any failure, including a nonzero exit, is `None`.
    fn probe_value(&self, path: &Path, key: &str) -> Option<String>;

    /// Reports whether the engine provides a filter called `name`.
    fn has_filter(&self, name: &str) -> bool;

    /// Builds a full descriptor of the first video stream.
    fn describe(&self, path: &Path) -> CoreResult<VideoDescriptor>;
}

/// `MediaProbe` backed by the `ffprobe`/`ffmpeg` executables.
#[derive(Debug)]
pub struct FfprobeClient {
    ffprobe_bin: String,
    ffmpeg_bin: String,
    filters: OnceCell<String>,
}

impl Default for FfprobeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FfprobeClient {
    pub fn new() -> Self {
        Self::with_binaries("ffprobe", "ffmpeg")
    }

    /// Uses explicit executable names or paths.
    pub fn with_binaries(ffprobe_bin: &str, ffmpeg_bin: &str) -> Self {
        Self {
            ffprobe_bin: ffprobe_bin.to_string(),
            ffmpeg_bin: ffmpeg_bin.to_string(),
            filters: OnceCell::new(),
        }
    }

    fn filter_listing(&self) -> &str {
        self.filters.get_or_init(|| {
            let output = Command::new(&self.ffmpeg_bin)
                .args(["-hide_banner", "-filters"])
                .stdin(Stdio::null())
                .output();
            match output {
                Ok(out) if out.status.success() => {
                    String::from_utf8_lossy(&out.stdout).into_owned()
                }
                Ok(out) => {
                    log::warn!("ffmpeg -filters exited with {}", out.status);
                    String::new()
                }
                Err(e) => {
                    log::warn!("Could not list ffmpeg filters: {}", e);
                    String::new()
                }
            }
        })
    }
}

impl MediaProbe for FfprobeClient {
    fn probe_value(&self, path: &Path, key: &str) -> Option<String> {
        let entries = format!("stream={key}");
        let output = Command::new(&self.ffprobe_bin)
            .args(["-v", "quiet", "-select_streams", "v:0", "-show_entries"])
            .arg(&entries)
            .args(["-of", "csv=p=0"])
            .arg(path)
            .stdin(Stdio::null())
            .output();

        match output {
            Ok(out) if out.status.success() => {
                normalize_probe_output(&String::from_utf8_lossy(&out.stdout))
            }
            Ok(out) => {
                log::debug!(
                    "ffprobe {} on {} exited with {}",
                    key,
                    path.display(),
                    out.status
                );
                None
            }
            Err(e) => {
                log::debug!("ffprobe {} on {} failed to start: {}", key, path.display(), e);
                None
            }
        }
    }

    fn has_filter(&self, name: &str) -> bool {
        listing_has_filter(self.filter_listing(), name)
    }

    fn describe(&self, path: &Path) -> CoreResult<VideoDescriptor> {
        log::debug!("Running ffprobe (via crate) on: {}", path.display());
        let metadata = ffprobe(path).map_err(|e| map_ffprobe_error(e, path))?;

        let stream = metadata
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .ok_or_else(|| {
                CoreError::VideoInfoError(format!("No video stream found in {}", path.display()))
            })?;

        let dimension = |value: Option<i64>, name: &str| -> CoreResult<u32> {
            value
                .filter(|v| *v > 0)
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| {
                    CoreError::VideoInfoError(format!(
                        "Video stream has no usable {} in {}",
                        name,
                        path.display()
                    ))
                })
        };

        let duration_seconds = stream
            .duration
            .as_deref()
            .and_then(parse_positive_f64)
            .or_else(|| metadata.format.duration.as_deref().and_then(parse_positive_f64));

        Ok(VideoDescriptor {
            path: path.to_path_buf(),
            width: dimension(stream.width, "width")?,
            height: dimension(stream.height, "height")?,
            codec_id: stream
                .codec_name
                .as_deref()
                .unwrap_or_default()
                .to_ascii_lowercase(),
            duration_seconds,
            fps: parse_frame_rate(&stream.avg_frame_rate)
                .or_else(|| parse_frame_rate(&stream.r_frame_rate)),
            frame_count: stream.nb_frames.as_deref().and_then(|n| n.trim().parse().ok()),
        })
    }
}

fn map_ffprobe_error(err: FfProbeError, path: &Path) -> CoreError {
    let context = format!("ffprobe ({})", path.display());
    match err {
        FfProbeError::Io(io_err) => command_start_error(context, io_err),
        FfProbeError::Status(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            command_failed_error(context, output.status, stderr)
        }
        FfProbeError::Deserialize(err) => {
            CoreError::FfprobeParse(format!("{context} output deserialization: {err}"))
        }
        #[allow(unreachable_patterns)]
        other => CoreError::FfprobeParse(format!("{context}: {other:?}")),
    }
}

/// Trims and lowercases CLI output, keeping the first non-empty line.
fn normalize_probe_output(stdout: &str) -> Option<String> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let value = line.trim_end_matches(',').to_ascii_lowercase();
    if value.is_empty() || value == "n/a" {
        None
    } else {
        Some(value)
    }
}

fn listing_has_filter(listing: &str, name: &str) -> bool {
    listing
        .lines()
        .any(|line| line.split_whitespace().any(|token| token == name))
}

fn parse_positive_f64(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// Parses ffprobe rates such as `30000/1001` or `25`.
pub fn parse_frame_rate(value: &str) -> Option<f64> {
    let value = value.trim();
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

// --- Convenience queries over any MediaProbe ---

/// Width and height of the first video stream.
pub fn probe_dimensions<P: MediaProbe + ?Sized>(probe: &P, path: &Path) -> Option<(u32, u32)> {
    let value = probe.probe_value(path, "width,height")?;
    let (w, h) = value.split_once(',')?;
    let w: u32 = w.trim().parse().ok()?;
    let h: u32 = h.trim().parse().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

/// Duration in seconds, from the stream or, failing that, the container.
pub fn probe_duration<P: MediaProbe + ?Sized>(probe: &P, path: &Path) -> Option<f64> {
    probe
        .probe_value(path, "duration")
        .as_deref()
        .and_then(parse_positive_f64)
        .or_else(|| probe.describe(path).ok()?.duration_seconds)
}

pub fn probe_codec<P: MediaProbe + ?Sized>(probe: &P, path: &Path) -> Option<String> {
    probe.probe_value(path, "codec_name")
}

pub fn probe_fps<P: MediaProbe + ?Sized>(probe: &P, path: &Path) -> Option<f64> {
    probe
        .probe_value(path, "avg_frame_rate")
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| {
            probe
                .probe_value(path, "r_frame_rate")
                .as_deref()
                .and_then(parse_frame_rate)
        })
}

pub fn probe_frame_count<P: MediaProbe + ?Sized>(probe: &P, path: &Path) -> Option<u64> {
    probe
        .probe_value(path, "nb_frames")
        .and_then(|n| n.parse().ok())
        .filter(|n| *n > 0)
}
