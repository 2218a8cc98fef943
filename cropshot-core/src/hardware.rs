//! NVIDIA hardware decode helpers.
//!
//! Maps source codecs to their CUVID decoders and adds the CUDA input options
//! used by the crop probes and the crop transcode. Encoding always goes
//! through `h264_nvenc`, see `processing::transcode`.

use ffmpeg_sidecar::command::FfmpegCommand;

/// Name of the GPU-resident crop filter.
pub const CROP_CUDA_FILTER: &str = "crop_cuda";

/// Hardware device index used for every job.
pub const CUDA_DEVICE_INDEX: &str = "0";

/// Returns the CUVID decoder for a codec name as reported by ffprobe.
#[must_use]
pub fn cuvid_decoder(codec: &str) -> Option<&'static str> {
    match codec.trim().to_ascii_lowercase().as_str() {
        "h264" => Some("h264_cuvid"),
        "hevc" => Some("hevc_cuvid"),
        "vp9" => Some("vp9_cuvid"),
        "av1" => Some("av1_cuvid"),
        "mpeg2video" => Some("mpeg2_cuvid"),
        _ => None,
    }
}

/// Adds `-hwaccel cuda` ahead of the input, as used by the cropdetect probes.
pub fn add_cuda_hwaccel(cmd: &mut FfmpegCommand) {
    cmd.args(["-hwaccel", "cuda"]);
}

/// Adds input options that keep decoded frames in CUDA memory.
///
/// With a CUVID decoder the decoder is selected explicitly and pinned to
/// device 0; otherwise ffmpeg picks the decoder and only the hwaccel is set.
pub fn add_cuda_resident_input(cmd: &mut FfmpegCommand, decoder: Option<&str>) {
    cmd.args(["-hwaccel", "cuda", "-hwaccel_output_format", "cuda"]);
    if let Some(decoder) = decoder {
        cmd.args(["-c:v", decoder, "-hwaccel_device", CUDA_DEVICE_INDEX]);
    }
}
