//! Value types passed between the pipeline stages.

use super::hw::HwFramesRef;
use std::fmt;

/// A rational number such as a timebase or a sample aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Both terms strictly positive.
    pub fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Pixel formats the pipeline distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Opaque CUDA surface; the data lives in a hardware frame pool.
    Cuda,
    Nv12,
    Yuv420p,
    Other,
}

impl PixelFormat {
    pub fn is_hardware(self) -> bool {
        matches!(self, PixelFormat::Cuda)
    }

    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Cuda => "cuda",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Other => "other",
        }
    }
}

/// A decoded or filtered picture.
///
/// Hardware-format frames must carry `hw_frames`; cloning a frame takes a
/// new reference on its pool.
#[derive(Debug, Clone)]
pub struct Frame {
    pub pts: Option<i64>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub hw_frames: Option<HwFramesRef>,
}

impl Frame {
    /// Hardware-format frame with no pool reference attached.
    pub fn lacks_hw_context(&self) -> bool {
        self.format.is_hardware() && self.hw_frames.is_none()
    }
}

/// A compressed packet, either demuxed or produced by the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub stream_index: usize,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(stream_index: usize, pts: Option<i64>) -> Self {
        Self {
            stream_index,
            pts,
            dts: pts,
            duration: 1,
            data: Vec::new(),
        }
    }
}

/// Result of a receive call on a decoder, filter sink or encoder.
#[derive(Debug)]
pub enum Receive<T> {
    Ready(T),
    /// Nothing available until more input arrives.
    Again,
    /// Fully drained.
    Eof,
}

/// First video stream of an input container.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub index: usize,
    pub codec_id: String,
    pub width: u32,
    pub height: u32,
    pub time_base: Option<Rational>,
    pub sample_aspect: Option<Rational>,
}
