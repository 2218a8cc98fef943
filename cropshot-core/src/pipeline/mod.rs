//! Hardware decode → crop filter → NVENC encode pipeline.
//!
//! A library-level rendition of the GPU crop transcode: one [`PipelineJob`]
//! per video, driving a [`CodecEngine`] through explicit states, with CUDA
//! device and frame-pool references held as owned handles. The batch
//! orchestrator uses the ffmpeg subprocess path in `processing::transcode`;
//! this module is for embedding a codec binding directly.

pub mod clock;
pub mod engine;
pub mod hw;
pub mod job;
pub mod tracing;
pub mod types;

pub use clock::{PresentationClock, rescale};
pub use engine::{CodecEngine, DecoderInfo, DecoderParams, EncoderParams, GraphSpec};
pub use hw::{HwDeviceRef, HwFramesRef, RefLedger};
pub use job::{PipelineJob, PipelineState, PipelineStats, Step, run_pipeline};
pub use tracing::TracingEngine;
pub use types::{Frame, Packet, PixelFormat, Rational, Receive, StreamInfo};
