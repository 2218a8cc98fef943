// ============================================================================
// cropshot-core/src/processing/transcode.rs
// ============================================================================
//
// CROP TRANSCODE: Hardware decode, crop and NVENC encode of one video
//
// Builds a single ffmpeg invocation that crops a source to an accepted
// rectangle and re-encodes it with h264_nvenc. The decode path depends on what
// the installed ffmpeg offers:
//
// - CudaResident: crop_cuda is available, frames stay in GPU memory
// - DecoderCrop: a CUVID decoder exists for the codec, which crops itself
// - Cpu: plain crop filter on system memory
//
// A failed transcode is reported to the caller, which substitutes a copy of
// the source so every input still has an intermediate file.

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::external::{FfmpegSpawner, MediaProbe, probe_codec, run_to_completion};
use crate::hardware::{
    CROP_CUDA_FILTER, CUDA_DEVICE_INDEX, add_cuda_resident_input, cuvid_decoder,
};
use crate::processing::crop_detection::CropRectangle;
use ffmpeg_sidecar::command::FfmpegCommand;
use std::path::Path;

/// How frames are decoded and cropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodePath {
    /// `-hwaccel_output_format cuda` and `crop_cuda`, with an optional CUVID decoder.
    CudaResident { decoder: Option<&'static str> },
    /// CUVID decoder with its `-crop` option.
    DecoderCrop { decoder: &'static str },
    Cpu,
}

impl DecodePath {
    /// Picks the path from the source codec and the available filters.
    pub fn select(codec: Option<&str>, has_crop_cuda: bool) -> Self {
        let decoder = codec.and_then(cuvid_decoder);
        match (has_crop_cuda, decoder) {
            (true, decoder) => DecodePath::CudaResident { decoder },
            (false, Some(decoder)) => DecodePath::DecoderCrop { decoder },
            (false, None) => DecodePath::Cpu,
        }
    }
}

/// Rounds odd sizes up to even and keeps the rectangle inside the frame.
///
/// When rounding up would overrun the frame edge the size is rounded down
/// instead, so the result is always even unless the frame itself is odd
/// and one pixel wide at the crop position.
pub fn even_crop(rect: &CropRectangle, original_w: u32, original_h: u32) -> Option<CropRectangle> {
    fn fit(pos: u32, len: u32, limit: u32) -> u32 {
        let room = limit.saturating_sub(pos);
        let even = len + (len % 2);
        if even <= room {
            even
        } else if room >= 2 {
            room - (room % 2)
        } else {
            room
        }
    }
    CropRectangle::new(
        rect.x,
        rect.y,
        fit(rect.x, rect.width, original_w),
        fit(rect.y, rect.height, original_h),
    )
}

/// Builds the full crop-and-encode command.
#[allow(clippy::too_many_arguments)]
pub fn build_transcode_command(
    src: &Path,
    dst: &Path,
    rect: &CropRectangle,
    original_w: u32,
    original_h: u32,
    path: &DecodePath,
    config: &CoreConfig,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new();
    cmd.args(["-hide_banner", "-loglevel", "error"]);

    let filters = match path {
        DecodePath::CudaResident { decoder } => {
            add_cuda_resident_input(&mut cmd, *decoder);
            format!(
                "{}=w={}:h={}:x={}:y={},setsar=1:1,format=nv12",
                CROP_CUDA_FILTER, rect.width, rect.height, rect.x, rect.y
            )
        }
        DecodePath::DecoderCrop { decoder } => {
            let bottom = original_h.saturating_sub(rect.bottom());
            let right = original_w.saturating_sub(rect.right());
            cmd.args(["-c:v", *decoder, "-hwaccel_device", CUDA_DEVICE_INDEX]);
            cmd.args([
                "-crop",
                &format!("{}x{}x{}x{}", rect.y, bottom, rect.x, right),
            ]);
            "setsar=1:1,format=nv12".to_string()
        }
        DecodePath::Cpu => format!(
            "crop=w={}:h={}:x={}:y={},setsar=1:1,format=nv12",
            rect.width, rect.height, rect.x, rect.y
        ),
    };

    cmd.input(&*src.to_string_lossy());
    cmd.args(["-vf", &filters]);
    cmd.args([
        "-c:v",
        "h264_nvenc",
        "-preset",
        &config.nvenc_preset,
        "-tune",
        "hq",
        "-cq",
        &config.nvenc_cq.to_string(),
        "-c:a",
        "copy",
        "-movflags",
        "+faststart",
        "-y",
    ]);
    cmd.output(&*dst.to_string_lossy());
    cmd
}

/// Crops `src` to `rect` and encodes the result to `dst`.
///
/// Errors when ffmpeg cannot be started or exits nonzero.
#[allow(clippy::too_many_arguments)]
pub fn crop_transcode<S, P>(
    spawner: &S,
    probe: &P,
    src: &Path,
    dst: &Path,
    rect: &CropRectangle,
    original_w: u32,
    original_h: u32,
    config: &CoreConfig,
) -> CoreResult<()>
where
    S: FfmpegSpawner,
    P: MediaProbe + ?Sized,
{
    let Some(rect) = even_crop(rect, original_w, original_h) else {
        return Err(CoreError::OperationFailed(format!(
            "crop {} does not fit {}x{}",
            rect, original_w, original_h
        )));
    };

    let codec = probe_codec(probe, src);
    let path = DecodePath::select(codec.as_deref(), probe.has_filter(CROP_CUDA_FILTER));
    if path == DecodePath::Cpu {
        log::warn!(
            "No GPU crop path for {} (codec {}), cropping on the CPU",
            src.display(),
            codec.as_deref().unwrap_or("unknown")
        );
    }
    log::debug!("Crop path for {}: {:?}", src.display(), path);

    let cmd = build_transcode_command(src, dst, &rect, original_w, original_h, &path, config);
    run_to_completion(spawner, cmd, "crop transcode")?;
    log::info!("Cropped {} to {} -> {}", src.display(), rect, dst.display());
    Ok(())
}
