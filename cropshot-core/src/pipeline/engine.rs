// ============================================================================
// cropshot-core/src/pipeline/engine.rs
// ============================================================================
//
// CODEC ENGINE: the demux/decode/filter/encode/mux service behind a job
//
// `PipelineJob` drives the state machine; everything that touches actual
// codec or container state goes through this trait so the job can be run
// against a real binding or against `TracingEngine` in tests.
//
// Handles (`Input`, `Decoder`, ...) are owned by the job and handed back to
// the matching close/free method during teardown. Any hardware references a
// handle holds are released when the handle is dropped.

use super::hw::{HwDeviceRef, HwFramesRef, RefLedger};
use super::types::{Frame, Packet, PixelFormat, Rational, Receive, StreamInfo};
use crate::error::{CoreResult, pipeline_error};
use crate::hardware::cuvid_decoder;
use std::path::Path;
use std::sync::Arc;

/// Pixel-format negotiation callback installed on hardware decoders.
pub type GetFormatFn = fn(&[PixelFormat]) -> CoreResult<PixelFormat>;

/// Picks the CUDA format out of the formats a decoder offers.
pub fn negotiate_hw_format(offered: &[PixelFormat]) -> CoreResult<PixelFormat> {
    offered
        .iter()
        .copied()
        .find(|f| f.is_hardware())
        .ok_or_else(|| pipeline_error("negotiate", "no hardware format available"))
}

/// Everything needed to open a decoder for one stream.
#[derive(Debug)]
pub struct DecoderParams {
    pub decoder_name: String,
    pub stream: StreamInfo,
    /// Timebase after the 1/25 fallback.
    pub time_base: Rational,
    /// Sample aspect after the 1/1 fallback.
    pub sample_aspect: Rational,
    /// Set for hardware decoding; the decoder takes its own reference.
    pub device: Option<HwDeviceRef>,
    pub get_format: Option<GetFormatFn>,
}

/// What the opened decoder reports about its output.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderInfo {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Buffer source, buffer sink and the linear chain between them.
#[derive(Debug)]
pub struct GraphSpec {
    pub width: u32,
    pub height: u32,
    pub time_base: Rational,
    pub sample_aspect: Rational,
    pub source_format: PixelFormat,
    /// Required when `source_format` is hardware-resident.
    pub source_frames: Option<HwFramesRef>,
    pub sink_formats: Vec<PixelFormat>,
    pub device: Option<HwDeviceRef>,
    pub chain: String,
}

#[derive(Debug)]
pub struct EncoderParams {
    pub codec: &'static str,
    pub width: u32,
    pub height: u32,
    pub time_base: Rational,
    pub format: PixelFormat,
    pub hw_frames: Option<HwFramesRef>,
    pub preset: String,
    pub cq: u8,
}

/// Codec and container operations used by [`super::PipelineJob`].
///
/// `receive_*` and `pull_frame` report back-pressure and end of stream through
/// [`Receive`]; an `Err` from any method is fatal for the job.
pub trait CodecEngine {
    type Input;
    type Decoder;
    type Graph;
    type Encoder;
    type Output;

    /// Ledger that counts this engine's hardware references.
    fn ledger(&self) -> Arc<RefLedger>;

    /// Opens a container and returns its first video stream.
    fn open_input(&mut self, path: &Path) -> CoreResult<(Self::Input, StreamInfo)>;
    /// Next packet of any stream, `None` at end of input.
    fn read_packet(&mut self, input: &mut Self::Input) -> CoreResult<Option<Packet>>;
    fn close_input(&mut self, input: Self::Input);

    /// Hardware decoder for a codec id, if one exists.
    fn hw_decoder_name(&self, codec_id: &str) -> Option<&'static str> {
        cuvid_decoder(codec_id)
    }

    fn create_hw_device(&mut self, device_index: &str) -> CoreResult<HwDeviceRef>;
    fn alloc_hw_frames(
        &mut self,
        device: &HwDeviceRef,
        width: u32,
        height: u32,
        pool_size: usize,
    ) -> CoreResult<HwFramesRef>;

    fn open_decoder(&mut self, params: DecoderParams) -> CoreResult<(Self::Decoder, DecoderInfo)>;
    /// A new reference on the decoder's frame pool, if it has one.
    fn decoder_hw_frames(&self, decoder: &Self::Decoder) -> Option<HwFramesRef>;
    fn set_decoder_hw_frames(&mut self, decoder: &mut Self::Decoder, frames: HwFramesRef);
    /// `None` enters draining mode.
    fn send_packet(&mut self, decoder: &mut Self::Decoder, packet: Option<&Packet>)
    -> CoreResult<()>;
    fn receive_frame(&mut self, decoder: &mut Self::Decoder) -> CoreResult<Receive<Frame>>;
    fn close_decoder(&mut self, decoder: Self::Decoder);

    /// Builds and configures the graph.
    fn build_graph(&mut self, spec: GraphSpec) -> CoreResult<Self::Graph>;
    /// The graph takes its own reference on the frame. `None` flushes.
    fn push_frame(&mut self, graph: &mut Self::Graph, frame: Option<&Frame>) -> CoreResult<()>;
    fn pull_frame(&mut self, graph: &mut Self::Graph) -> CoreResult<Receive<Frame>>;
    fn free_graph(&mut self, graph: Self::Graph);

    fn open_encoder(&mut self, params: &EncoderParams) -> CoreResult<Self::Encoder>;
    /// `None` enters draining mode.
    fn send_frame(&mut self, encoder: &mut Self::Encoder, frame: Option<&Frame>) -> CoreResult<()>;
    fn receive_packet(&mut self, encoder: &mut Self::Encoder) -> CoreResult<Receive<Packet>>;
    fn close_encoder(&mut self, encoder: Self::Encoder);

    /// Creates the output container with one video stream and writes its
    /// header. Returns the stream's timebase as chosen by the muxer.
    fn open_output(
        &mut self,
        path: &Path,
        params: &EncoderParams,
    ) -> CoreResult<(Self::Output, Rational)>;
    fn write_packet(&mut self, output: &mut Self::Output, packet: &Packet) -> CoreResult<()>;
    /// Writes the trailer when `finalize` is set; otherwise abandons the file.
    fn finish_output(&mut self, output: Self::Output, finalize: bool) -> CoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_prefers_hardware() {
        let picked = negotiate_hw_format(&[PixelFormat::Nv12, PixelFormat::Cuda]).unwrap();
        assert_eq!(picked, PixelFormat::Cuda);
    }

    #[test]
    fn negotiation_fails_without_hardware() {
        let err = negotiate_hw_format(&[PixelFormat::Yuv420p]).unwrap_err();
        assert!(err.to_string().contains("no hardware format available"));
    }
}
