// cropshot-core/src/pipeline/tracing.rs

// --- Tracing engine (for testing) ---
//
// In-memory `CodecEngine` that records every call, counts hardware
// references through a shared `RefLedger`, and can be told to fail or panic
// on the n-th call of a given operation.

use super::engine::{CodecEngine, DecoderInfo, DecoderParams, EncoderParams, GraphSpec};
use super::hw::{HwDeviceRef, HwFramesRef, RefLedger};
use super::types::{Frame, Packet, PixelFormat, Rational, Receive, StreamInfo};
use crate::error::{CoreError, CoreResult, pipeline_error};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
pub struct TracingInput {
    packets: VecDeque<Packet>,
}

#[derive(Debug)]
pub struct TracingDecoder {
    hardware: bool,
    width: u32,
    height: u32,
    device: Option<HwDeviceRef>,
    frames: Option<HwFramesRef>,
    queue: VecDeque<Frame>,
    draining: bool,
}

#[derive(Debug)]
pub struct TracingGraph {
    crop: (u32, u32),
    source_frames: Option<HwFramesRef>,
    // Frames the source has accepted; the graph holds its own references.
    held: VecDeque<Frame>,
    draining: bool,
}

#[derive(Debug)]
pub struct TracingEncoder {
    frames: Option<HwFramesRef>,
    queue: VecDeque<Packet>,
    last_pts: Option<i64>,
    draining: bool,
}

#[derive(Debug)]
pub struct TracingOutput {
    path: PathBuf,
    packets: Vec<Packet>,
}

/// What ended up in a finished output.
#[derive(Debug, Clone)]
pub struct OutputRecord {
    pub path: PathBuf,
    pub finalized: bool,
    pub packets: Vec<Packet>,
}

/// Scriptable in-memory engine.
///
/// Decoded frames lag one packet behind their input and encoded packets lag
/// one frame behind, so the flush stages always have something to drain.
pub struct TracingEngine {
    ledger: Arc<RefLedger>,
    stream: StreamInfo,
    packets: Vec<Packet>,
    offered_formats: Vec<PixelFormat>,
    output_time_base: Rational,
    decoder_allocates_pool: bool,
    ignore_pool_attach: bool,
    strip_decoded_hw_context: bool,
    drop_filter_pts: bool,
    delay_filter_output: bool,
    failures: HashMap<&'static str, usize>,
    panics: HashMap<&'static str, usize>,
    counts: HashMap<&'static str, usize>,
    calls: Vec<String>,
    outputs: Vec<OutputRecord>,
}

impl TracingEngine {
    /// An h264 1920x1080 input with `video_packets` video packets, each
    /// followed by one audio packet.
    pub fn new(video_packets: usize) -> Self {
        let mut packets = Vec::with_capacity(video_packets * 2);
        for i in 0..video_packets as i64 {
            packets.push(Packet::new(0, Some(i)));
            packets.push(Packet::new(1, Some(i * 1024)));
        }
        Self {
            ledger: RefLedger::new(),
            stream: StreamInfo {
                index: 0,
                codec_id: "h264".to_string(),
                width: 1920,
                height: 1080,
                time_base: Some(Rational::new(1, 25)),
                sample_aspect: Some(Rational::new(1, 1)),
            },
            packets,
            offered_formats: vec![PixelFormat::Cuda, PixelFormat::Nv12],
            output_time_base: Rational::new(1, 90000),
            decoder_allocates_pool: false,
            ignore_pool_attach: false,
            strip_decoded_hw_context: false,
            drop_filter_pts: false,
            delay_filter_output: false,
            failures: HashMap::new(),
            panics: HashMap::new(),
            counts: HashMap::new(),
            calls: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_stream(mut self, stream: StreamInfo) -> Self {
        self.stream = stream;
        self
    }

    /// Replaces the scripted packets.
    pub fn with_packets(mut self, packets: Vec<Packet>) -> Self {
        self.packets = packets;
        self
    }

    pub fn with_offered_formats(mut self, formats: Vec<PixelFormat>) -> Self {
        self.offered_formats = formats;
        self
    }

    pub fn with_output_time_base(mut self, tb: Rational) -> Self {
        self.output_time_base = tb;
        self
    }

    /// The decoder allocates its own pool while opening.
    pub fn decoder_allocates_pool(mut self) -> Self {
        self.decoder_allocates_pool = true;
        self
    }

    /// `set_decoder_hw_frames` silently does nothing.
    pub fn ignore_pool_attach(mut self) -> Self {
        self.ignore_pool_attach = true;
        self
    }

    /// Decoded hardware frames come out without a pool reference.
    pub fn strip_decoded_hw_context(mut self) -> Self {
        self.strip_decoded_hw_context = true;
        self
    }

    /// Filtered frames come out without a timestamp.
    pub fn drop_filter_pts(mut self) -> Self {
        self.drop_filter_pts = true;
        self
    }

    /// The graph keeps one frame buffered until it is flushed.
    pub fn delay_filter_output(mut self) -> Self {
        self.delay_filter_output = true;
        self
    }

    /// The `nth` call (1-based) of `op` returns an error.
    pub fn fail_on(mut self, op: &'static str, nth: usize) -> Self {
        self.failures.insert(op, nth);
        self
    }

    /// The `nth` call (1-based) of `op` panics.
    pub fn panic_on(mut self, op: &'static str, nth: usize) -> Self {
        self.panics.insert(op, nth);
        self
    }

    pub fn shared_ledger(&self) -> Arc<RefLedger> {
        Arc::clone(&self.ledger)
    }

    /// Operation names in call order; flush calls carry a `(null)` suffix.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    pub fn outputs(&self) -> &[OutputRecord] {
        &self.outputs
    }

    fn enter(&mut self, op: &'static str, label: &str) -> CoreResult<()> {
        let count = self.counts.entry(op).or_insert(0);
        *count += 1;
        let n = *count;
        self.calls.push(label.to_string());
        if self.panics.get(op) == Some(&n) {
            panic!("injected panic in {op} (call {n})");
        }
        if self.failures.get(op) == Some(&n) {
            return Err(pipeline_error("engine", format!("injected failure in {op} (call {n})")));
        }
        Ok(())
    }

    fn note(&mut self, label: &str) {
        self.calls.push(label.to_string());
    }
}

fn parse_crop(chain: &str) -> Option<(u32, u32)> {
    let crop = chain.split(',').find_map(|f| f.strip_prefix("crop="))?;
    let mut w = None;
    let mut h = None;
    for kv in crop.split(':') {
        match kv.split_once('=') {
            Some(("w", v)) => w = v.parse().ok(),
            Some(("h", v)) => h = v.parse().ok(),
            _ => {}
        }
    }
    Some((w?, h?))
}

impl CodecEngine for TracingEngine {
    type Input = TracingInput;
    type Decoder = TracingDecoder;
    type Graph = TracingGraph;
    type Encoder = TracingEncoder;
    type Output = TracingOutput;

    fn ledger(&self) -> Arc<RefLedger> {
        Arc::clone(&self.ledger)
    }

    fn open_input(&mut self, path: &Path) -> CoreResult<(TracingInput, StreamInfo)> {
        self.enter("open_input", "open_input")?;
        log::debug!("tracing engine: open {}", path.display());
        Ok((
            TracingInput {
                packets: self.packets.iter().cloned().collect(),
            },
            self.stream.clone(),
        ))
    }

    fn read_packet(&mut self, input: &mut TracingInput) -> CoreResult<Option<Packet>> {
        self.enter("read_packet", "read_packet")?;
        Ok(input.packets.pop_front())
    }

    fn close_input(&mut self, _input: TracingInput) {
        self.note("close_input");
    }

    fn create_hw_device(&mut self, device_index: &str) -> CoreResult<HwDeviceRef> {
        self.enter("create_hw_device", "create_hw_device")?;
        Ok(HwDeviceRef::create(device_index, &self.ledger))
    }

    fn alloc_hw_frames(
        &mut self,
        device: &HwDeviceRef,
        width: u32,
        height: u32,
        pool_size: usize,
    ) -> CoreResult<HwFramesRef> {
        self.enter("alloc_hw_frames", "alloc_hw_frames")?;
        Ok(HwFramesRef::alloc(device, width, height, pool_size))
    }

    fn open_decoder(&mut self, params: DecoderParams) -> CoreResult<(TracingDecoder, DecoderInfo)> {
        self.enter("open_decoder", "open_decoder")?;
        let hardware = params.device.is_some();
        let format = match (hardware, params.get_format) {
            (true, Some(get_format)) => get_format(&self.offered_formats)?,
            (true, None) => {
                return Err(CoreError::Config(
                    "hardware decoder opened without a format callback".to_string(),
                ));
            }
            (false, _) => PixelFormat::Yuv420p,
        };
        let frames = match (&params.device, self.decoder_allocates_pool) {
            (Some(device), true) => Some(HwFramesRef::alloc(
                device,
                params.stream.width,
                params.stream.height,
                20,
            )),
            _ => None,
        };
        let info = DecoderInfo {
            width: params.stream.width,
            height: params.stream.height,
            format,
        };
        Ok((
            TracingDecoder {
                hardware,
                width: params.stream.width,
                height: params.stream.height,
                device: params.device,
                frames,
                queue: VecDeque::new(),
                draining: false,
            },
            info,
        ))
    }

    fn decoder_hw_frames(&self, decoder: &TracingDecoder) -> Option<HwFramesRef> {
        decoder.frames.clone()
    }

    fn set_decoder_hw_frames(&mut self, decoder: &mut TracingDecoder, frames: HwFramesRef) {
        self.note("set_decoder_hw_frames");
        if !self.ignore_pool_attach {
            decoder.frames = Some(frames);
        }
    }

    fn send_packet(
        &mut self,
        decoder: &mut TracingDecoder,
        packet: Option<&Packet>,
    ) -> CoreResult<()> {
        match packet {
            Some(packet) => {
                self.enter("send_packet", "send_packet")?;
                let hw_frames = if decoder.hardware && !self.strip_decoded_hw_context {
                    decoder.frames.clone()
                } else {
                    None
                };
                decoder.queue.push_back(Frame {
                    pts: packet.pts,
                    width: decoder.width,
                    height: decoder.height,
                    format: if decoder.hardware {
                        PixelFormat::Cuda
                    } else {
                        PixelFormat::Yuv420p
                    },
                    hw_frames,
                });
            }
            None => {
                self.enter("send_packet", "send_packet(null)")?;
                decoder.draining = true;
            }
        }
        Ok(())
    }

    fn receive_frame(&mut self, decoder: &mut TracingDecoder) -> CoreResult<Receive<Frame>> {
        self.enter("receive_frame", "receive_frame")?;
        if decoder.queue.len() > 1 || (decoder.draining && !decoder.queue.is_empty()) {
            return Ok(decoder.queue.pop_front().map_or(Receive::Again, Receive::Ready));
        }
        Ok(if decoder.draining {
            Receive::Eof
        } else {
            Receive::Again
        })
    }

    fn close_decoder(&mut self, decoder: TracingDecoder) {
        self.note("close_decoder");
        drop(decoder);
    }

    fn build_graph(&mut self, spec: GraphSpec) -> CoreResult<TracingGraph> {
        self.enter("build_graph", "build_graph")?;
        if spec.source_format.is_hardware() && spec.source_frames.is_none() {
            return Err(CoreError::Config(
                "hardware buffer source without a frames context".to_string(),
            ));
        }
        if !spec.sink_formats.iter().all(|f| f.is_hardware()) {
            return Err(pipeline_error("graph", "sink must accept only the hardware format"));
        }
        let crop = parse_crop(&spec.chain)
            .ok_or_else(|| pipeline_error("graph", format!("cannot parse chain '{}'", spec.chain)))?;
        Ok(TracingGraph {
            crop,
            source_frames: spec.source_frames,
            held: VecDeque::new(),
            draining: false,
        })
    }

    fn push_frame(&mut self, graph: &mut TracingGraph, frame: Option<&Frame>) -> CoreResult<()> {
        match frame {
            Some(frame) => {
                self.enter("push_frame", "push_frame")?;
                if frame.lacks_hw_context() {
                    return Err(pipeline_error("graph", "source frame without a frames context"));
                }
                graph.held.push_back(frame.clone());
            }
            None => {
                self.enter("push_frame", "push_frame(null)")?;
                graph.draining = true;
            }
        }
        Ok(())
    }

    fn pull_frame(&mut self, graph: &mut TracingGraph) -> CoreResult<Receive<Frame>> {
        self.enter("pull_frame", "pull_frame")?;
        if self.delay_filter_output && !graph.draining && graph.held.len() < 2 {
            return Ok(Receive::Again);
        }
        match graph.held.pop_front() {
            Some(source) => {
                let (width, height) = graph.crop;
                Ok(Receive::Ready(Frame {
                    pts: if self.drop_filter_pts { None } else { source.pts },
                    width,
                    height,
                    format: PixelFormat::Cuda,
                    hw_frames: None,
                }))
            }
            None if graph.draining => Ok(Receive::Eof),
            None => Ok(Receive::Again),
        }
    }

    fn free_graph(&mut self, graph: TracingGraph) {
        self.note("free_graph");
        drop(graph.source_frames);
    }

    fn open_encoder(&mut self, params: &EncoderParams) -> CoreResult<TracingEncoder> {
        self.enter("open_encoder", "open_encoder")?;
        if params.format.is_hardware() && params.hw_frames.is_none() {
            return Err(CoreError::Config(
                "hardware encoder without a frames context".to_string(),
            ));
        }
        Ok(TracingEncoder {
            frames: params.hw_frames.clone(),
            queue: VecDeque::new(),
            last_pts: None,
            draining: false,
        })
    }

    fn send_frame(&mut self, encoder: &mut TracingEncoder, frame: Option<&Frame>) -> CoreResult<()> {
        let Some(frame) = frame else {
            self.enter("send_frame", "send_frame(null)")?;
            encoder.draining = true;
            return Ok(());
        };
        self.enter("send_frame", "send_frame")?;
        if frame.lacks_hw_context() {
            return Err(pipeline_error("encode", "frame without a frames context"));
        }
        let pts = frame
            .pts
            .ok_or_else(|| pipeline_error("encode", "frame without a timestamp"))?;
        if encoder.last_pts.is_some_and(|last| pts <= last) {
            return Err(pipeline_error("encode", format!("non-increasing pts {pts}")));
        }
        encoder.last_pts = Some(pts);
        let mut packet = Packet::new(0, Some(pts));
        packet.data = vec![0u8; 16];
        encoder.queue.push_back(packet);
        Ok(())
    }

    fn receive_packet(&mut self, encoder: &mut TracingEncoder) -> CoreResult<Receive<Packet>> {
        self.enter("receive_packet", "receive_packet")?;
        if encoder.queue.len() > 1 || (encoder.draining && !encoder.queue.is_empty()) {
            return Ok(encoder.queue.pop_front().map_or(Receive::Again, Receive::Ready));
        }
        Ok(if encoder.draining {
            Receive::Eof
        } else {
            Receive::Again
        })
    }

    fn close_encoder(&mut self, encoder: TracingEncoder) {
        self.note("close_encoder");
        drop(encoder.frames);
    }

    fn open_output(
        &mut self,
        path: &Path,
        _params: &EncoderParams,
    ) -> CoreResult<(TracingOutput, Rational)> {
        self.enter("open_output", "open_output")?;
        Ok((
            TracingOutput {
                path: path.to_path_buf(),
                packets: Vec::new(),
            },
            self.output_time_base,
        ))
    }

    fn write_packet(&mut self, output: &mut TracingOutput, packet: &Packet) -> CoreResult<()> {
        self.enter("write_packet", "write_packet")?;
        output.packets.push(packet.clone());
        Ok(())
    }

    fn finish_output(&mut self, output: TracingOutput, finalize: bool) -> CoreResult<()> {
        let label = if finalize {
            "finish_output"
        } else {
            "abandon_output"
        };
        self.enter("finish_output", label)?;
        self.outputs.push(OutputRecord {
            path: output.path,
            finalized: finalize,
            packets: output.packets,
        });
        Ok(())
    }
}
