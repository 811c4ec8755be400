//! Collaborator traits: the GPU driver and the vendor codec SDK.
//!
//! The codec core only talks to hardware through these traits.  A platform
//! backend (`zdepth-nvcodec`) implements them over CUDA and NVENC/NVDEC;
//! tests implement them in memory.

use crate::config::EncoderPreset;
use crate::error::Result;
use crate::types::{
    BitstreamUnit, ContextHandle, DecodePacket, DeviceHandle, DeviceProperties,
    EncoderInputFrame, HostToDeviceCopy, PicParams, PixelFormat, StreamGeometry, VideoCodec,
};

// ─── GPU driver ──────────────────────────────────────────────────────────

/// Driver-level context and memory primitives.
pub trait GpuDriver {
    /// Initialize the driver.  Must be safe to call repeatedly.
    fn init(&mut self) -> Result<()>;

    /// Resolve the device handle for a device ordinal.
    fn device(&mut self, index: u32) -> Result<DeviceHandle>;

    fn properties(&mut self, device: DeviceHandle) -> Result<DeviceProperties>;

    /// Retain the process-wide primary context of `device`.
    ///
    /// The driver reference-counts primary contexts across every user in the
    /// process; each successful retain must be paired with one release.
    fn retain_primary_context(&mut self, device: DeviceHandle) -> Result<ContextHandle>;

    fn release_primary_context(&mut self, device: DeviceHandle) -> Result<()>;

    /// Synchronous pitched copy of one plane from host to device memory.
    fn copy_host_to_device_2d(
        &mut self,
        context: ContextHandle,
        copy: &HostToDeviceCopy<'_>,
    ) -> Result<()>;
}

// ─── Codec sessions ──────────────────────────────────────────────────────

/// Construction parameters for a hardware encoder session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncoderSettings {
    pub geometry: StreamGeometry,
    pub format: PixelFormat,
    pub codec: VideoCodec,
    pub preset: EncoderPreset,
}

/// Construction parameters for a hardware decoder session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecoderSettings {
    pub geometry: StreamGeometry,
    pub codec: VideoCodec,
    /// Decoded pictures are copied to host memory instead of staying on the device.
    pub host_output: bool,
    pub low_latency: bool,
    /// `None` = no cropping.
    pub crop: Option<StreamGeometry>,
    /// `None` = no resizing.
    pub resize: Option<StreamGeometry>,
}

/// Hardware encoder session bound to one geometry.
pub trait HwEncoder {
    /// Next free device input buffer, or `None` if the encoder queue is full.
    fn next_input_frame(&mut self) -> Option<EncoderInputFrame>;

    /// Encode the most recently acquired input buffer.
    ///
    /// `units` is cleared and refilled with every bitstream unit produced by
    /// this submission, in emission order.  It may end up empty.
    fn encode_frame(&mut self, params: &PicParams, units: &mut Vec<BitstreamUnit>) -> Result<()>;

    /// Signal end of stream and drain buffered units into `units` (cleared first).
    fn end_encode(&mut self, units: &mut Vec<BitstreamUnit>) -> Result<()>;
}

/// Hardware decoder session bound to one geometry.
pub trait HwDecoder {
    /// Submit bitstream bytes.  Returns the number of pictures now available
    /// through [`frame`](Self::frame); zero is not an error.  Work is issued
    /// on the CUDA stream named by `packet.stream`.
    fn decode(&mut self, packet: &DecodePacket<'_>) -> Result<usize>;

    /// Host-resident NV12 picture produced by the last `decode` call.
    fn frame(&self, index: usize) -> Option<&[u8]>;
}

/// Factory tying a driver to the encoder/decoder sessions it can host.
pub trait CodecBackend {
    type Driver: GpuDriver;
    type Encoder: HwEncoder;
    type Decoder: HwDecoder;

    fn driver(&mut self) -> &mut Self::Driver;

    fn create_encoder(
        &mut self,
        context: ContextHandle,
        settings: &EncoderSettings,
    ) -> Result<Self::Encoder>;

    fn create_decoder(
        &mut self,
        context: ContextHandle,
        settings: &DecoderSettings,
    ) -> Result<Self::Decoder>;
}
