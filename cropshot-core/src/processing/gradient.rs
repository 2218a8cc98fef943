//! Gradient-accumulation border detection.
//!
//! Sampled frames are decoded at low resolution, their Sobel magnitudes are
//! summed into one heat-map, and the largest external contour of the
//! thresholded, closed heat-map is taken as the picture area. Static borders
//! never produce gradients, so they fall outside that contour.

use crate::config::CoreConfig;
use crate::external::{FfmpegSpawner, capture_frames};
use crate::processing::crop_detection::CropRectangle;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::OutputVideoFrame;
use image::{GrayImage, Luma, RgbImage, imageops};
use imageproc::contours::{BorderType, Contour, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use imageproc::morphology::close;
use rayon::prelude::*;
use std::path::Path;

/// Half-size of the square closing kernel (15x15).
const CLOSE_RADIUS: u8 = 7;

/// Accumulated gradient magnitudes of equally sized frames.
#[derive(Debug, Clone)]
pub struct HeatMap {
    pub width: u32,
    pub height: u32,
    values: Vec<f32>,
}

impl HeatMap {
    fn zeros(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            values: vec![0.0; width as usize * height as usize],
        }
    }

    fn accumulate(mut self, other: &HeatMap) -> Self {
        for (a, b) in self.values.iter_mut().zip(&other.values) {
            *a += *b;
        }
        self
    }

    /// Sobel gradient magnitude of a single grayscale frame.
    pub fn from_gray(gray: &GrayImage) -> Self {
        let gx = horizontal_sobel(gray);
        let gy = vertical_sobel(gray);
        let values = gx
            .pixels()
            .zip(gy.pixels())
            .map(|(x, y)| {
                let (x, y) = (f32::from(x[0]), f32::from(y[0]));
                (x * x + y * y).sqrt()
            })
            .collect();
        Self {
            width: gray.width(),
            height: gray.height(),
            values,
        }
    }

    /// Min-max normalizes to 0..=255. A constant map becomes all zeros.
    pub fn normalize(&self) -> GrayImage {
        let (min, max) = self
            .values
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        let range = max - min;
        let mut out = GrayImage::new(self.width, self.height);
        if range <= f32::EPSILON {
            return out;
        }
        for (pixel, v) in out.pixels_mut().zip(&self.values) {
            *pixel = Luma([((v - min) / range * 255.0).round().clamp(0.0, 255.0) as u8]);
        }
        out
    }
}

/// Target size of the sampled frames: `round(dim * factor)`, at least 2.
pub fn scaled_dimensions(width: u32, height: u32, factor: f64) -> (u32, u32) {
    let scale = |v: u32| ((f64::from(v) * factor).round() as u32).max(2);
    (scale(width), scale(height))
}

fn frame_to_gray(frame: &OutputVideoFrame) -> Option<GrayImage> {
    let rgb = RgbImage::from_raw(frame.width, frame.height, frame.data.clone())?;
    Some(imageops::grayscale(&rgb))
}

/// Sums per-frame gradient magnitudes. Frames whose size differs from the
/// first frame are ignored.
pub fn accumulate_heat_map(frames: &[GrayImage]) -> Option<HeatMap> {
    let first = frames.first()?;
    let (w, h) = first.dimensions();
    let heat = frames
        .par_iter()
        .filter(|f| f.dimensions() == (w, h))
        .map(HeatMap::from_gray)
        .reduce(|| HeatMap::zeros(w, h), |acc, m| acc.accumulate(&m));
    Some(heat)
}

/// Binary mask of `image > threshold`.
pub fn threshold_mask(image: &GrayImage, threshold: u8) -> GrayImage {
    let mut mask = image.clone();
    for p in mask.pixels_mut() {
        p[0] = if p[0] > threshold { 255 } else { 0 };
    }
    mask
}

fn contour_area(contour: &Contour<i32>) -> f64 {
    let pts = &contour.points;
    if pts.len() < 3 {
        return 0.0;
    }
    let twice: i64 = pts
        .iter()
        .zip(pts.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();
    (twice as f64 / 2.0).abs()
}

fn bounding_box(contour: &Contour<i32>) -> Option<CropRectangle> {
    let xs = contour.points.iter().map(|p| p.x);
    let ys = contour.points.iter().map(|p| p.y);
    let (min_x, max_x) = (xs.clone().min()?, xs.max()?);
    let (min_y, max_y) = (ys.clone().min()?, ys.max()?);
    CropRectangle::new(
        u32::try_from(min_x).ok()?,
        u32::try_from(min_y).ok()?,
        u32::try_from(max_x - min_x + 1).ok()?,
        u32::try_from(max_y - min_y + 1).ok()?,
    )
}

/// Bounding box of the largest outermost contour in a binary mask.
pub fn largest_contour_box(mask: &GrayImage) -> Option<CropRectangle> {
    find_contours::<i32>(mask)
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .max_by(|a, b| contour_area(a).total_cmp(&contour_area(b)))
        .and_then(bounding_box)
}

/// Runs threshold, closing and contour extraction over grayscale frames.
///
/// The rectangle is in the frames' own coordinates.
pub fn detect_in_frames(frames: &[GrayImage], edge_threshold: u8) -> Option<CropRectangle> {
    let heat = accumulate_heat_map(frames)?;
    let mask = threshold_mask(&heat.normalize(), edge_threshold);
    let closed = close(&mask, Norm::LInf, CLOSE_RADIUS);
    largest_contour_box(&closed)
}

fn build_sampling_command(
    src: &Path,
    scaled_w: u32,
    scaled_h: u32,
    config: &CoreConfig,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new();
    cmd.args(["-hide_banner", "-hwaccel", "auto"]);
    cmd.input(&*src.to_string_lossy());
    cmd.args([
        "-vf",
        &format!("fps={},scale={}:{}", config.sample_fps, scaled_w, scaled_h),
        "-frames:v",
        &config.max_gradient_samples.to_string(),
        "-pix_fmt",
        "rgb24",
        "-f",
        "rawvideo",
        "-",
    ]);
    cmd
}

/// Strategy B: gradient detection over downscaled samples of `src`.
///
/// Returns the rectangle in source coordinates, or `None` when nothing
/// decodes or no contour is found.
pub fn detect_crop_gradient<S: FfmpegSpawner>(
    spawner: &S,
    src: &Path,
    original_w: u32,
    original_h: u32,
    config: &CoreConfig,
) -> Option<CropRectangle> {
    let (sw, sh) = scaled_dimensions(original_w, original_h, config.downscale);
    let cmd = build_sampling_command(src, sw, sh, config);

    let frames = match capture_frames(spawner, cmd, "gradient sampling", config.max_gradient_samples)
    {
        Ok(frames) => frames,
        Err(e) => {
            log::warn!("Gradient sampling failed for {}: {}", src.display(), e);
            return None;
        }
    };
    let gray: Vec<GrayImage> = frames.iter().filter_map(frame_to_gray).collect();
    log::debug!(
        "Gradient sampling of {} decoded {} frame(s) at {}x{}",
        src.display(),
        gray.len(),
        sw,
        sh
    );

    let rect = detect_in_frames(&gray, config.edge_threshold)?;
    rect.scale(1.0 / config.downscale)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Checkerboard picture with black bars of `bar` rows top and bottom.
    fn letterboxed(width: u32, height: u32, bar: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if y < bar || y >= height - bar {
                Luma([0])
            } else if ((x / 8) + (y / 8)) % 2 == 0 {
                Luma([220])
            } else {
                Luma([40])
            }
        })
    }

    #[test]
    fn scaled_dimensions_round_and_floor_at_two() {
        assert_eq!(scaled_dimensions(1280, 720, 0.5), (640, 360));
        assert_eq!(scaled_dimensions(1921, 1081, 0.5), (961, 541));
        assert_eq!(scaled_dimensions(3, 3, 0.1), (2, 2));
    }

    #[test]
    fn flat_heat_map_normalizes_to_zero() {
        let gray = GrayImage::from_pixel(16, 16, Luma([128]));
        let heat = HeatMap::from_gray(&gray);
        assert!(heat.normalize().pixels().all(|p| p[0] == 0));
        assert_eq!(detect_in_frames(&[gray], 10), None);
    }

    #[test]
    fn threshold_is_strict() {
        let img = GrayImage::from_fn(3, 1, |x, _| Luma([9 + x as u8]));
        let mask = threshold_mask(&img, 10);
        let values: Vec<u8> = mask.pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![0, 0, 255]);
    }

    #[test]
    fn largest_contour_wins() {
        let mut mask = GrayImage::new(100, 100);
        for y in 10..20 {
            for x in 10..20 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        for y in 40..90 {
            for x in 30..80 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        assert_eq!(largest_contour_box(&mask), CropRectangle::new(30, 40, 50, 50));
    }

    #[test]
    fn finds_picture_between_bars() {
        let frames = vec![letterboxed(640, 360, 40), letterboxed(640, 360, 40)];
        let rect = detect_in_frames(&frames, 10).unwrap();
        assert!(rect.x <= 8, "x = {}", rect.x);
        assert!(rect.right() >= 632, "right = {}", rect.right());
        // Sobel leaks one row into each bar.
        assert!((38..=42).contains(&rect.y), "y = {}", rect.y);
        assert!((278..=282).contains(&rect.height), "h = {}", rect.height);
    }

    #[test]
    fn mismatched_frames_are_ignored() {
        let frames = vec![letterboxed(64, 64, 8), GrayImage::new(10, 10)];
        let heat = accumulate_heat_map(&frames).unwrap();
        assert_eq!((heat.width, heat.height), (64, 64));
    }
}
