//! Value types shared by the execution context, the pipelines and the
//! collaborator traits.
//!
//! # Frame layout
//!
//! Host-side frames are tightly packed NV12: a `width × height` luma plane
//! followed by `ceil(height / 2)` rows of interleaved Cb/Cr, each `width`
//! bytes long.  Device-side buffers use the same plane order but with a
//! device-chosen row pitch that may exceed `width`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};

// ─── Geometry ────────────────────────────────────────────────────────────────

/// Pixel dimensions of the stream.  Encoders, decoders and the execution
/// context are only valid for one geometry at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamGeometry {
    width: u32,
    height: u32,
}

impl StreamGeometry {
    /// Validate and build a geometry.  Both dimensions must be positive.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CodecError::InvalidGeometry { width, height });
        }
        Ok(Self { width, height })
    }

    #[inline]
    pub const fn width(self) -> u32 {
        self.width
    }

    #[inline]
    pub const fn height(self) -> u32 {
        self.height
    }

    /// Bytes in the luma plane (`width × height`).
    #[inline]
    pub const fn luma_bytes(self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Rows in the NV12 chroma plane.
    #[inline]
    pub const fn chroma_rows(self) -> usize {
        (self.height as usize).div_ceil(2)
    }

    /// Bytes in a tightly packed NV12 frame.
    #[inline]
    pub const fn nv12_bytes(self) -> usize {
        PixelFormat::Nv12.byte_size(self, self.width as usize)
    }
}

impl fmt::Display for StreamGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ─── Pixel format ────────────────────────────────────────────────────────────

/// Encoder input buffer format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Y plane: `height × pitch` bytes.
    /// UV plane: `ceil(height / 2) × pitch` bytes (interleaved Cb Cr, 2×2 sub-sampled).
    Nv12,
}

impl PixelFormat {
    /// Buffer size in bytes for the given geometry and row pitch.
    #[inline]
    pub const fn byte_size(self, geometry: StreamGeometry, pitch: usize) -> usize {
        match self {
            Self::Nv12 => pitch * (geometry.height as usize) + pitch * geometry.chroma_rows(),
        }
    }

    /// Number of chroma planes following the luma plane.
    #[inline]
    pub const fn chroma_planes(self) -> usize {
        match self {
            Self::Nv12 => 1,
        }
    }
}

/// Compressed stream format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoCodec {
    H264,
}

// ─── Backend state ───────────────────────────────────────────────────────────

/// Per-direction lifecycle state tracked by the orchestrator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BackendState {
    /// No hardware session exists; the next call constructs one.
    #[default]
    Uninitialized,
    /// A hardware session bound to the current geometry exists.
    Active,
}

// ─── Handles ─────────────────────────────────────────────────────────────────

/// Driver-level device ordinal handle (`CUdevice`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub i32);

/// Opaque execution context handle (`CUcontext`) stored as an address.
///
/// Never dereferenced by this crate; it is only handed back to the driver
/// and to codec factories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextHandle(pub usize);

/// Device memory address (`CUdeviceptr`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DevicePtr(pub u64);

impl DevicePtr {
    #[inline]
    pub const fn offset(self, bytes: usize) -> Self {
        Self(self.0 + bytes as u64)
    }
}

/// Properties queried from the device when a context is created.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProperties {
    pub name: String,
    pub total_memory_bytes: usize,
    pub compute_capability: (i32, i32),
    pub multiprocessor_count: i32,
}

/// A pitched host → device copy of one plane.
#[derive(Clone, Copy, Debug)]
pub struct HostToDeviceCopy<'a> {
    pub src: &'a [u8],
    pub src_pitch: usize,
    pub dst: DevicePtr,
    pub dst_pitch: usize,
    pub width_bytes: usize,
    pub rows: usize,
}

// ─── Encode submission ───────────────────────────────────────────────────────

/// Monotonic per-encoder ordering tag.  Not wall-clock time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameTimestamp(pub u64);

impl FrameTimestamp {
    /// Return the current value and advance by one.
    #[inline]
    pub fn advance(&mut self) -> Self {
        let current = *self;
        self.0 += 1;
        current
    }
}

/// Picture type requested from the encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PictureType {
    /// Instantaneous decoder refresh (keyframe).
    Idr,
    /// Predicted from earlier pictures.
    P,
}

/// Per-picture encode parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PicParams {
    pub picture_type: PictureType,
    /// Re-emit SPS/PPS ahead of this picture.
    pub output_sps_pps: bool,
    /// Force an IDR even if the encoder would pick another type.
    pub force_idr: bool,
    pub input_pitch: usize,
    pub timestamp: FrameTimestamp,
}

impl PicParams {
    /// Parameters for a keyframe (`keyframe = true`) or predicted picture.
    pub fn for_frame(keyframe: bool, input_pitch: usize, timestamp: FrameTimestamp) -> Self {
        Self {
            picture_type: if keyframe {
                PictureType::Idr
            } else {
                PictureType::P
            },
            output_sps_pps: keyframe,
            force_idr: keyframe,
            input_pitch,
            timestamp,
        }
    }
}

/// Device-resident encoder input buffer handed out by the encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderInputFrame {
    pub device_ptr: DevicePtr,
    /// Row pitch in bytes; may exceed the frame width.
    pub pitch: usize,
    /// Byte offsets of each chroma plane from `device_ptr`.
    pub chroma_offsets: Vec<usize>,
    pub format: PixelFormat,
}

/// One NAL-unit-equivalent chunk of encoder output.
pub type BitstreamUnit = Vec<u8>;

// ─── Decode submission ───────────────────────────────────────────────────────

/// Packet flags passed with a decode submission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacketFlags {
    /// The packet completes a picture; emit it without waiting for more input.
    pub end_of_picture: bool,
}

/// CUDA stream a backend issues decode work and output copies on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SubmitStream {
    /// The calling thread's default stream (`cudaStreamPerThread`), so
    /// codecs driven from different threads do not serialize on each other.
    #[default]
    PerThread,
    /// The legacy NULL stream, synchronizing with all other work.
    Legacy,
}

/// One submission to the hardware decoder.
#[derive(Clone, Copy, Debug)]
pub struct DecodePacket<'a> {
    pub data: &'a [u8],
    pub flags: PacketFlags,
    pub timestamp: i64,
    pub stream: SubmitStream,
}
