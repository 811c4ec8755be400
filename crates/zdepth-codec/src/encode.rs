//! Encode pipeline: lazily constructed hardware encoder, one frame in flight.
//!
//! # Per-frame flow
//!
//! ```text
//! host NV12 ──▸ next_input_frame() ──▸ pitched H2D copy (luma, chroma)
//!                                              │
//!                          PicParams { IDR | P, SPS/PPS, timestamp }
//!                                              │
//!                                      encode_frame()
//!                                              │
//!                            bitstream units ──▸ concatenated output
//! ```
//!
//! The encoder session is created on the first call and lives until the
//! owner tears the pipeline down (geometry change or reset).  Failures after
//! construction leave the session in place so the next call can retry.

use tracing::{debug, info};

use zdepth_core::codec_traits::{CodecBackend, EncoderSettings, GpuDriver, HwEncoder};
use zdepth_core::config::EncoderPreset;
use zdepth_core::context::ExecutionContext;
use zdepth_core::error::{CodecError, Result};
use zdepth_core::types::{
    BitstreamUnit, ContextHandle, EncoderInputFrame, FrameTimestamp, HostToDeviceCopy, PicParams,
    PixelFormat, StreamGeometry, VideoCodec,
};

use crate::guard::guarded;

pub struct EncodePipeline<B: CodecBackend> {
    encoder: Option<B::Encoder>,
    preset: EncoderPreset,
    /// Scratch list reused across calls to avoid per-frame allocation.
    units: Vec<BitstreamUnit>,
}

impl<B: CodecBackend> EncodePipeline<B> {
    pub fn new(preset: EncoderPreset) -> Self {
        Self {
            encoder: None,
            preset,
            units: Vec::new(),
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.encoder.is_some()
    }

    /// Drop the encoder session.  The next call constructs a new one.
    pub fn teardown(&mut self) {
        if self.encoder.take().is_some() {
            debug!("Encoder session released");
        }
        self.units.clear();
    }

    /// Encode one NV12 frame.
    ///
    /// On success `compressed` holds exactly the bitstream units produced by
    /// this frame, concatenated in emission order.  On failure `compressed`
    /// is left untouched.
    ///
    /// `timestamp` is owned by the caller and advanced once per submission,
    /// so the sequence stays monotonic across encoder rebuilds.
    #[allow(clippy::too_many_arguments)]
    pub fn encode_begin(
        &mut self,
        backend: &mut B,
        context: &mut ExecutionContext,
        gpu_index: u32,
        geometry: StreamGeometry,
        keyframe: bool,
        timestamp: &mut FrameTimestamp,
        input: &[u8],
        compressed: &mut Vec<u8>,
    ) -> Result<()> {
        let need = geometry.nv12_bytes();
        if input.len() < need {
            return Err(CodecError::BufferTooSmall {
                need,
                have: input.len(),
            });
        }

        let context_handle = self.ensure_encoder(backend, context, gpu_index, geometry)?;
        let Some(encoder) = self.encoder.as_mut() else {
            return Err(CodecError::NotInitialized);
        };

        // Never block on a full queue.
        let frame = guarded("encoder input acquisition", || Ok(encoder.next_input_frame()))?
            .ok_or(CodecError::InputBufferExhausted)?;

        copy_frame_to_device(backend.driver(), context_handle, geometry, input, &frame)?;

        let params = PicParams::for_frame(keyframe, frame.pitch, timestamp.advance());
        self.units.clear();
        let units = &mut self.units;
        guarded("encode submission", || encoder.encode_frame(&params, units))?;

        compressed.clear();
        compressed.reserve(self.units.iter().map(Vec::len).sum());
        for unit in &self.units {
            compressed.extend_from_slice(unit);
        }

        debug!(
            keyframe,
            timestamp = params.timestamp.0,
            units = self.units.len(),
            bytes = compressed.len(),
            "Frame encoded"
        );
        Ok(())
    }

    /// Flush the encoder and append the trailing units to `compressed`.
    ///
    /// An empty flush is an error: the encoder was expected to emit trailing
    /// data.  On failure `compressed` is left untouched.
    pub fn encode_finish(&mut self, compressed: &mut Vec<u8>) -> Result<()> {
        let Some(encoder) = self.encoder.as_mut() else {
            return Err(CodecError::NotInitialized);
        };

        self.units.clear();
        let units = &mut self.units;
        guarded("encoder flush", || encoder.end_encode(units))?;

        if self.units.is_empty() {
            return Err(CodecError::EmptyFlush);
        }

        let before = compressed.len();
        compressed.reserve(self.units.iter().map(Vec::len).sum());
        for unit in &self.units {
            compressed.extend_from_slice(unit);
        }

        debug!(
            units = self.units.len(),
            appended = compressed.len() - before,
            "Encoder flushed"
        );
        Ok(())
    }

    fn ensure_encoder(
        &mut self,
        backend: &mut B,
        context: &mut ExecutionContext,
        gpu_index: u32,
        geometry: StreamGeometry,
    ) -> Result<ContextHandle> {
        let context_handle = context.create(backend.driver(), gpu_index)?;
        if self.encoder.is_some() {
            return Ok(context_handle);
        }

        let settings = EncoderSettings {
            geometry,
            format: PixelFormat::Nv12,
            codec: VideoCodec::H264,
            preset: self.preset,
        };
        let encoder = guarded("encoder construction", || {
            backend.create_encoder(context_handle, &settings)
        })?;

        info!(
            width = geometry.width(),
            height = geometry.height(),
            preset = ?self.preset,
            "H.264 encoder created"
        );
        self.encoder = Some(encoder);
        Ok(context_handle)
    }
}

/// Copy a tightly packed host NV12 frame into a pitched device buffer.
fn copy_frame_to_device<D: GpuDriver + ?Sized>(
    driver: &mut D,
    context: ContextHandle,
    geometry: StreamGeometry,
    input: &[u8],
    frame: &EncoderInputFrame,
) -> Result<()> {
    let width = geometry.width() as usize;
    let height = geometry.height() as usize;

    if frame.format != PixelFormat::Nv12 {
        return Err(CodecError::Encode(format!(
            "encoder input buffer has format {:?}, expected Nv12",
            frame.format
        )));
    }
    if frame.pitch < width {
        return Err(CodecError::Encode(format!(
            "encoder input pitch {} is smaller than frame width {width}",
            frame.pitch
        )));
    }
    if frame.chroma_offsets.len() != PixelFormat::Nv12.chroma_planes() {
        return Err(CodecError::Encode(format!(
            "encoder input buffer reports {} chroma planes, expected {}",
            frame.chroma_offsets.len(),
            PixelFormat::Nv12.chroma_planes()
        )));
    }

    let luma_bytes = geometry.luma_bytes();
    guarded("luma upload", || {
        driver.copy_host_to_device_2d(
            context,
            &HostToDeviceCopy {
                src: &input[..luma_bytes],
                src_pitch: width,
                dst: frame.device_ptr,
                dst_pitch: frame.pitch,
                width_bytes: width,
                rows: height,
            },
        )
    })?;

    let chroma = &input[luma_bytes..];
    for &offset in &frame.chroma_offsets {
        guarded("chroma upload", || {
            driver.copy_host_to_device_2d(
                context,
                &HostToDeviceCopy {
                    src: chroma,
                    src_pitch: width,
                    dst: frame.device_ptr.offset(offset),
                    dst_pitch: frame.pitch,
                    width_bytes: width,
                    rows: geometry.chroma_rows(),
                },
            )
        })?;
    }
    Ok(())
}
