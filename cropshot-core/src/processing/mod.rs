// ============================================================================
// cropshot-core/src/processing/mod.rs
// ============================================================================
//
// PROCESSING: Border detection, crop transcode and keyframe extraction
//
// KEY COMPONENTS:
// - crop_detection: CropRectangle, cropdetect probes and the crop decision
// - gradient: gradient-accumulation fallback detector
// - transcode: GPU crop + NVENC encode command
// - frames: scene keyframe extraction with border trim and fallback sampling
// - dedup: difference-hash de-duplication of extracted frames
// - batch: the three-phase orchestrator

pub mod batch;
pub mod crop_detection;
pub mod dedup;
pub mod frames;
pub mod gradient;
pub mod transcode;

pub use batch::{BatchSummary, FrameOutcome, VideoOutcome, VideoStatus, process_video, run_batch};
pub use crop_detection::{
    CropDecision, CropRectangle, DetectionStrategy, detect_crop, detect_crop_ffmpeg, is_good_crop,
};
pub use dedup::remove_duplicates;
pub use frames::{ExtractedFrameRecord, extract_frames};
pub use gradient::detect_crop_gradient;
pub use transcode::{DecodePath, crop_transcode};
