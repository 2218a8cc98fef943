// ============================================================================
// cropshot-core/src/pipeline/job.rs
// ============================================================================
//
// PIPELINE JOB: per-video decode -> filter -> encode state machine
//
// One `PipelineJob` owns every handle of one crop transcode: input and
// output containers, decoder, filter graph, encoder, the CUDA device and the
// two frame pools. Each state has its own transition method returning a
// `Step`; `run` loops them until `Finished`.
//
// Teardown happens in `Drop`, so handles are released on success, on error
// and while unwinding from a panic. Order:
//   frames, graph, decoder pool, decoder, encoder pool, encoder, device,
//   input, output (abandoned unless the job reached `Closed`).

use super::clock::{PresentationClock, rescale, rescale_opt};
use super::engine::{
    CodecEngine, DecoderParams, EncoderParams, GetFormatFn, GraphSpec, negotiate_hw_format,
};
use super::hw::{HwDeviceRef, HwFramesRef, RefLedger};
use super::types::{Frame, Packet, PixelFormat, Rational, Receive};
use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult, pipeline_error};
use crate::hardware::CUDA_DEVICE_INDEX;
use crate::processing::crop_detection::CropRectangle;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Buffers in an explicitly allocated hardware frame pool.
pub const HW_POOL_SIZE: usize = 20;

/// Timebase used when the source stream has none.
pub const FALLBACK_TIME_BASE: Rational = Rational::new(1, 25);

/// Sample aspect ratio used when the source stream has none.
pub const FALLBACK_SAMPLE_ASPECT: Rational = Rational::new(1, 1);

const ENCODER: &str = "h264_nvenc";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Opened,
    Decoding,
    Filtering,
    Encoding,
    Flushing,
    Closed,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Opened => "opened",
            PipelineState::Decoding => "decoding",
            PipelineState::Filtering => "filtering",
            PipelineState::Encoding => "encoding",
            PipelineState::Flushing => "flushing",
            PipelineState::Closed => "closed",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The decoder produced nothing; read more input.
    NeedInput,
    Finished,
}

/// Sub-state of `Flushing`. Each stage drains fully before the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStage {
    Decoder,
    Graph,
    Encoder,
    Output,
}

/// Counters collected while a job runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub packets_read: usize,
    pub video_packets: usize,
    pub frames_decoded: usize,
    pub frames_filtered: usize,
    pub packets_written: usize,
    /// Hardware frames that arrived without a pool reference.
    pub context_repairs: usize,
    /// Filtered frames whose timestamp came back from the source frame.
    pub restored_pts: usize,
    /// Decoded or filtered timestamps rewritten to keep them strictly increasing.
    pub rewritten_pts: usize,
}

/// Filter chain between buffer source and buffer sink.
///
/// Hardware-resident sources are downloaded first; the result is always
/// uploaded back to CUDA for the encoder.
pub fn filter_chain(crop: &CropRectangle, source_format: PixelFormat) -> String {
    let download = if source_format.is_hardware() {
        "hwdownload,"
    } else {
        ""
    };
    format!(
        "{download}format=nv12,crop=w={}:h={}:x={}:y={},hwupload_cuda",
        crop.width, crop.height, crop.x, crop.y
    )
}

fn missing(what: &str) -> CoreError {
    pipeline_error("state", format!("{what} is not open"))
}

/// Per-job state for one GPU crop transcode.
pub struct PipelineJob<'e, E: CodecEngine> {
    engine: &'e mut E,
    ledger: Arc<RefLedger>,
    state: PipelineState,
    flush: FlushStage,

    input: Option<E::Input>,
    decoder: Option<E::Decoder>,
    graph: Option<E::Graph>,
    encoder: Option<E::Encoder>,
    output: Option<E::Output>,

    device: Option<HwDeviceRef>,
    decoder_frames: Option<HwFramesRef>,
    encoder_frames: Option<HwFramesRef>,

    decoded: VecDeque<Frame>,
    filtered: VecDeque<Frame>,

    stream_index: usize,
    clock: PresentationClock,
    /// Timestamps of frames pushed into the graph and not yet pulled out.
    in_graph_pts: VecDeque<Option<i64>>,
    filter_clock: PresentationClock,
    encoder_time_base: Rational,
    output_time_base: Rational,
    stats: PipelineStats,
}

impl<'e, E: CodecEngine> PipelineJob<'e, E> {
    /// Opens every stage of a crop transcode from `src` to `dst`.
    ///
    /// On error the partially opened job is torn down before returning.
    pub fn open(
        engine: &'e mut E,
        src: &Path,
        dst: &Path,
        crop: CropRectangle,
        config: &CoreConfig,
    ) -> CoreResult<Self> {
        let ledger = engine.ledger();
        let mut job = Self {
            engine,
            ledger,
            state: PipelineState::Opened,
            flush: FlushStage::Decoder,
            input: None,
            decoder: None,
            graph: None,
            encoder: None,
            output: None,
            device: None,
            decoder_frames: None,
            encoder_frames: None,
            decoded: VecDeque::new(),
            filtered: VecDeque::new(),
            stream_index: 0,
            clock: PresentationClock::new(),
            in_graph_pts: VecDeque::new(),
            filter_clock: PresentationClock::new(),
            encoder_time_base: FALLBACK_TIME_BASE,
            output_time_base: FALLBACK_TIME_BASE,
            stats: PipelineStats::default(),
        };
        if let Err(e) = job.open_stages(src, dst, crop, config) {
            warn!("Opening pipeline for {} failed: {}", src.display(), e);
            job.state = PipelineState::Failed;
            return Err(e);
        }
        debug!(
            "Pipeline open: {} -> {} crop {}",
            src.display(),
            dst.display(),
            crop
        );
        Ok(job)
    }

    fn open_stages(
        &mut self,
        src: &Path,
        dst: &Path,
        crop: CropRectangle,
        config: &CoreConfig,
    ) -> CoreResult<()> {
        let (input, stream) = self.engine.open_input(src)?;
        self.input = Some(input);
        self.stream_index = stream.index;

        let time_base = stream
            .time_base
            .filter(Rational::is_valid)
            .unwrap_or(FALLBACK_TIME_BASE);
        let sample_aspect = stream
            .sample_aspect
            .filter(Rational::is_valid)
            .unwrap_or(FALLBACK_SAMPLE_ASPECT);
        self.encoder_time_base = time_base;

        // NVENC and hwupload need the device even when decoding in software.
        let device = self.engine.create_hw_device(CUDA_DEVICE_INDEX)?;
        self.device = Some(device.clone());

        let hw_decoder = self.engine.hw_decoder_name(&stream.codec_id);
        let hardware = hw_decoder.is_some();
        let decoder_name = hw_decoder
            .map(str::to_string)
            .unwrap_or_else(|| stream.codec_id.clone());
        debug!(
            "Decoder {} for {} ({})",
            decoder_name,
            stream.codec_id,
            if hardware { "hardware" } else { "software" }
        );

        let params = DecoderParams {
            decoder_name,
            stream: stream.clone(),
            time_base,
            sample_aspect,
            device: hardware.then(|| device.clone()),
            get_format: hardware.then_some(negotiate_hw_format as GetFormatFn),
        };
        let (decoder, info) = self.engine.open_decoder(params)?;
        let decoder = self.decoder.insert(decoder);

        if hardware {
            let pool = match self.engine.decoder_hw_frames(decoder) {
                Some(pool) => pool,
                None => {
                    let pool =
                        self.engine
                            .alloc_hw_frames(&device, info.width, info.height, HW_POOL_SIZE)?;
                    self.engine.set_decoder_hw_frames(decoder, pool.clone());
                    pool
                }
            };
            if info.format.is_hardware() && self.engine.decoder_hw_frames(decoder).is_none() {
                return Err(pipeline_error(
                    "open",
                    "hardware frame pool unset after decoder open",
                ));
            }
            self.decoder_frames = Some(pool);
        }

        if crop.right() > info.width || crop.bottom() > info.height {
            return Err(CoreError::Config(format!(
                "crop {} exceeds decoded size {}x{}",
                crop, info.width, info.height
            )));
        }

        let source_frames = if info.format.is_hardware() {
            Some(self.decoder_frames.clone().ok_or_else(|| {
                CoreError::Config(
                    "hardware buffer source requires the decoder's frame pool".to_string(),
                )
            })?)
        } else {
            None
        };
        let graph = self.engine.build_graph(GraphSpec {
            width: info.width,
            height: info.height,
            time_base,
            sample_aspect,
            source_format: info.format,
            source_frames,
            sink_formats: vec![PixelFormat::Cuda],
            device: Some(device.clone()),
            chain: filter_chain(&crop, info.format),
        })?;
        self.graph = Some(graph);

        let encoder_pool =
            self.engine
                .alloc_hw_frames(&device, crop.width, crop.height, HW_POOL_SIZE)?;
        self.encoder_frames = Some(encoder_pool.clone());
        let params = EncoderParams {
            codec: ENCODER,
            width: crop.width,
            height: crop.height,
            time_base,
            format: PixelFormat::Cuda,
            hw_frames: Some(encoder_pool),
            preset: config.nvenc_preset.clone(),
            cq: config.nvenc_cq,
        };
        let encoder = self.engine.open_encoder(&params)?;
        self.encoder = Some(encoder);

        let (output, output_time_base) = self.engine.open_output(dst, &params)?;
        self.output = Some(output);
        self.output_time_base = output_time_base;
        Ok(())
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn output_time_base(&self) -> Rational {
        self.output_time_base
    }

    /// Runs one transition. Any error moves the job to `Failed`.
    pub fn step(&mut self) -> CoreResult<Step> {
        let result = match self.state {
            PipelineState::Opened => {
                self.state = PipelineState::Decoding;
                Ok(Step::Continue)
            }
            PipelineState::Decoding => self.decode_step(),
            PipelineState::Filtering => self.filter_step(),
            PipelineState::Encoding => self.encode_step(),
            PipelineState::Flushing => self.flush_step(),
            PipelineState::Closed => Ok(Step::Finished),
            PipelineState::Failed => Err(pipeline_error("step", "job has already failed")),
        };
        if result.is_err() {
            self.state = PipelineState::Failed;
        }
        result
    }

    /// Steps until the job is closed.
    pub fn run(&mut self) -> CoreResult<PipelineStats> {
        loop {
            if self.step()? == Step::Finished {
                return Ok(self.stats.clone());
            }
        }
    }

    fn decode_step(&mut self) -> CoreResult<Step> {
        let input = self.input.as_mut().ok_or_else(|| missing("input"))?;
        let Some(packet) = self.engine.read_packet(input)? else {
            debug!("End of input after {} packets", self.stats.packets_read);
            self.state = PipelineState::Flushing;
            self.flush = FlushStage::Decoder;
            return Ok(Step::Continue);
        };
        self.stats.packets_read += 1;
        if packet.stream_index != self.stream_index {
            return Ok(Step::NeedInput);
        }
        self.stats.video_packets += 1;

        let decoder = self.decoder.as_mut().ok_or_else(|| missing("decoder"))?;
        self.engine.send_packet(decoder, Some(&packet))?;
        if self.drain_decoder()? > 0 {
            self.state = PipelineState::Filtering;
            Ok(Step::Continue)
        } else {
            Ok(Step::NeedInput)
        }
    }

    fn filter_step(&mut self) -> CoreResult<Step> {
        self.filter_pending()?;
        self.state = PipelineState::Encoding;
        Ok(Step::Continue)
    }

    fn encode_step(&mut self) -> CoreResult<Step> {
        self.encode_pending()?;
        self.state = PipelineState::Decoding;
        Ok(Step::Continue)
    }

    fn flush_step(&mut self) -> CoreResult<Step> {
        match self.flush {
            FlushStage::Decoder => {
                let decoder = self.decoder.as_mut().ok_or_else(|| missing("decoder"))?;
                self.engine.send_packet(decoder, None)?;
                self.drain_decoder()?;
                self.filter_pending()?;
                self.encode_pending()?;
                self.flush = FlushStage::Graph;
            }
            FlushStage::Graph => {
                let graph = self.graph.as_mut().ok_or_else(|| missing("filter graph"))?;
                self.engine.push_frame(graph, None)?;
                self.drain_graph()?;
                self.encode_pending()?;
                self.flush = FlushStage::Encoder;
            }
            FlushStage::Encoder => {
                let encoder = self.encoder.as_mut().ok_or_else(|| missing("encoder"))?;
                self.engine.send_frame(encoder, None)?;
                self.drain_encoder(true)?;
                self.flush = FlushStage::Output;
            }
            FlushStage::Output => {
                let output = self.output.take().ok_or_else(|| missing("output"))?;
                self.engine.finish_output(output, true)?;
                self.state = PipelineState::Closed;
                info!(
                    "Pipeline finished: {} frames, {} packets written",
                    self.stats.frames_filtered, self.stats.packets_written
                );
                return Ok(Step::Finished);
            }
        }
        Ok(Step::Continue)
    }

    /// Pulls every frame the decoder has ready. Returns how many arrived.
    fn drain_decoder(&mut self) -> CoreResult<usize> {
        let mut received = 0;
        loop {
            let decoder = self.decoder.as_mut().ok_or_else(|| missing("decoder"))?;
            match self.engine.receive_frame(decoder)? {
                Receive::Ready(mut frame) => {
                    if frame.lacks_hw_context() {
                        let pool = self.decoder_frames.as_ref().ok_or_else(|| {
                            pipeline_error("decode", "hardware frame without a frames context")
                        })?;
                        frame.hw_frames = Some(pool.clone());
                        self.stats.context_repairs += 1;
                    }
                    let before = frame.pts;
                    frame.pts = Some(self.clock.correct(before));
                    if frame.pts != before {
                        self.stats.rewritten_pts += 1;
                    }
                    self.stats.frames_decoded += 1;
                    self.decoded.push_back(frame);
                    received += 1;
                }
                Receive::Again | Receive::Eof => return Ok(received),
            }
        }
    }

    /// Feeds decoded frames to the graph, draining the sink after each.
    fn filter_pending(&mut self) -> CoreResult<()> {
        while let Some(frame) = self.decoded.pop_front() {
            let graph = self.graph.as_mut().ok_or_else(|| missing("filter graph"))?;
            self.engine.push_frame(graph, Some(&frame))?;
            self.in_graph_pts.push_back(frame.pts);
            self.drain_graph()?;
        }
        Ok(())
    }

    fn drain_graph(&mut self) -> CoreResult<()> {
        loop {
            let graph = self.graph.as_mut().ok_or_else(|| missing("filter graph"))?;
            match self.engine.pull_frame(graph)? {
                Receive::Ready(mut frame) => {
                    if frame.lacks_hw_context() {
                        let pool = self.encoder_frames.as_ref().ok_or_else(|| {
                            pipeline_error("filter", "filtered frame without a frames context")
                        })?;
                        frame.hw_frames = Some(pool.clone());
                        self.stats.context_repairs += 1;
                    }
                    // The chain is one-in one-out, so the oldest pushed frame is the origin.
                    let origin = self.in_graph_pts.pop_front().flatten();
                    if frame.pts.is_none() && origin.is_some() {
                        frame.pts = origin;
                        self.stats.restored_pts += 1;
                    }
                    let before = frame.pts;
                    frame.pts = Some(self.filter_clock.correct(before));
                    if frame.pts != before {
                        self.stats.rewritten_pts += 1;
                    }
                    self.stats.frames_filtered += 1;
                    self.filtered.push_back(frame);
                }
                Receive::Again | Receive::Eof => return Ok(()),
            }
        }
    }

    fn encode_pending(&mut self) -> CoreResult<()> {
        while let Some(frame) = self.filtered.pop_front() {
            let encoder = self.encoder.as_mut().ok_or_else(|| missing("encoder"))?;
            self.engine.send_frame(encoder, Some(&frame))?;
            self.drain_encoder(false)?;
        }
        Ok(())
    }

    fn drain_encoder(&mut self, flushing: bool) -> CoreResult<()> {
        loop {
            let encoder = self.encoder.as_mut().ok_or_else(|| missing("encoder"))?;
            match self.engine.receive_packet(encoder)? {
                Receive::Ready(packet) => self.write(packet)?,
                Receive::Again if flushing => {
                    return Err(pipeline_error("flush", "encoder stalled while draining"));
                }
                Receive::Again | Receive::Eof => return Ok(()),
            }
        }
    }

    fn write(&mut self, mut packet: Packet) -> CoreResult<()> {
        let (from, to) = (self.encoder_time_base, self.output_time_base);
        packet.pts = rescale_opt(packet.pts, from, to);
        packet.dts = rescale_opt(packet.dts, from, to);
        packet.duration = rescale(packet.duration, from, to);
        packet.stream_index = 0;
        let output = self.output.as_mut().ok_or_else(|| missing("output"))?;
        self.engine.write_packet(output, &packet)?;
        self.stats.packets_written += 1;
        Ok(())
    }

    fn teardown(&mut self) {
        self.decoded.clear();
        self.filtered.clear();
        self.ledger.record("teardown frames");

        if let Some(graph) = self.graph.take() {
            self.engine.free_graph(graph);
        }
        self.ledger.record("teardown graph");

        self.decoder_frames = None;
        self.ledger.record("teardown decoder pool");
        if let Some(decoder) = self.decoder.take() {
            self.engine.close_decoder(decoder);
        }
        self.ledger.record("teardown decoder");

        self.encoder_frames = None;
        self.ledger.record("teardown encoder pool");
        if let Some(encoder) = self.encoder.take() {
            self.engine.close_encoder(encoder);
        }
        self.ledger.record("teardown encoder");

        self.device = None;
        self.ledger.record("teardown device");

        if let Some(input) = self.input.take() {
            self.engine.close_input(input);
        }
        self.ledger.record("teardown input");

        // Reaching `Closed` already finalized the output.
        if let Some(output) = self.output.take() {
            warn!("Abandoning partial output (job {})", self.state);
            if let Err(e) = self.engine.finish_output(output, false) {
                warn!("Failed to abandon output: {}", e);
            }
        }
        self.ledger.record("teardown output");
    }
}

impl<E: CodecEngine> Drop for PipelineJob<'_, E> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Opens and runs a job to completion. The job is torn down before returning.
pub fn run_pipeline<E: CodecEngine>(
    engine: &mut E,
    src: &Path,
    dst: &Path,
    crop: CropRectangle,
    config: &CoreConfig,
) -> CoreResult<PipelineStats> {
    let mut job = PipelineJob::open(engine, src, dst, crop, config)?;
    job.run()
}
