//! H.264 codec façade: geometry tracking and routing to the pipelines.
//!
//! # State machine
//!
//! Encode and decode directions each move `Uninitialized → Active` on their
//! first successful lazy construction.  Any `encode_begin` or `decode` call
//! with a geometry different from the stored one sends both directions back
//! to `Uninitialized`: both sessions are dropped and the execution context
//! is released before the new geometry is adopted, because hardware sessions
//! are bound to a fixed geometry at construction.
//!
//! # Ownership
//!
//! The codec exclusively owns the backend, the execution context and both
//! pipelines.  Pipelines borrow the context and backend per call.  No state
//! is shared between codec instances; calls on one instance must be
//! serialized by the caller.

use tracing::{info, warn};

use zdepth_core::codec_traits::CodecBackend;
use zdepth_core::config::CodecConfig;
use zdepth_core::context::ExecutionContext;
use zdepth_core::error::{CodecError, Result};
use zdepth_core::types::{BackendState, FrameTimestamp, StreamGeometry};

use crate::decode::DecodePipeline;
use crate::encode::EncodePipeline;

pub struct H264Codec<B: CodecBackend> {
    backend: B,
    config: CodecConfig,
    context: ExecutionContext,
    geometry: Option<StreamGeometry>,
    encoder: EncodePipeline<B>,
    decoder: DecodePipeline<B>,
    /// Ordering tag for the next encode submission.  Survives geometry
    /// changes and resets.
    next_timestamp: FrameTimestamp,
}

impl<B: CodecBackend> H264Codec<B> {
    pub fn new(backend: B, config: CodecConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            encoder: EncodePipeline::new(config.encoder_preset),
            decoder: DecodePipeline::new(config.decode_attempts, config.decode_output),
            backend,
            config,
            context: ExecutionContext::new(),
            geometry: None,
            next_timestamp: FrameTimestamp::default(),
        })
    }

    /// Encode one NV12 frame (`width × height` luma + interleaved chroma).
    ///
    /// `keyframe` forces an IDR picture with SPS/PPS.  On success
    /// `compressed` is replaced by this frame's bitstream.  A short `input`
    /// is rejected before the geometry is adopted, so existing sessions
    /// survive it.
    pub fn encode_begin(
        &mut self,
        geometry: StreamGeometry,
        keyframe: bool,
        input: &[u8],
        compressed: &mut Vec<u8>,
    ) -> Result<()> {
        let need = geometry.nv12_bytes();
        if input.len() < need {
            let err = CodecError::BufferTooSmall {
                need,
                have: input.len(),
            };
            warn!(error = %err, %geometry, keyframe, "encode_begin failed");
            return Err(err);
        }

        self.adopt_geometry(geometry);
        self.encoder
            .encode_begin(
                &mut self.backend,
                &mut self.context,
                self.config.gpu_index,
                geometry,
                keyframe,
                &mut self.next_timestamp,
                input,
                compressed,
            )
            .inspect_err(|err| warn!(error = %err, %geometry, keyframe, "encode_begin failed"))
    }

    /// Flush the encoder, appending trailing units to `compressed`.
    ///
    /// Uses the geometry established by the preceding `encode_begin`.
    pub fn encode_finish(&mut self, compressed: &mut Vec<u8>) -> Result<()> {
        self.encoder
            .encode_finish(compressed)
            .inspect_err(|err| warn!(error = %err, "encode_finish failed"))
    }

    /// Decode one compressed picture into `decoded`.
    pub fn decode(
        &mut self,
        geometry: StreamGeometry,
        input: &[u8],
        decoded: &mut Vec<u8>,
    ) -> Result<()> {
        self.adopt_geometry(geometry);
        self.decoder
            .decode(
                &mut self.backend,
                &mut self.context,
                self.config.gpu_index,
                geometry,
                input,
                decoded,
            )
            .inspect_err(|err| warn!(error = %err, %geometry, "decode failed"))
    }

    /// Drop both sessions and release the execution context.
    ///
    /// The stored geometry is kept; the next call rebuilds lazily.
    pub fn reset(&mut self) {
        self.encoder.teardown();
        self.decoder.teardown();
        self.context.destroy(self.backend.driver());
    }

    fn adopt_geometry(&mut self, geometry: StreamGeometry) {
        if self.geometry == Some(geometry) {
            return;
        }
        if let Some(previous) = self.geometry {
            info!(from = %previous, to = %geometry, "Stream geometry changed; rebuilding codec");
        }
        self.reset();
        self.geometry = Some(geometry);
    }

    #[inline]
    pub fn geometry(&self) -> Option<StreamGeometry> {
        self.geometry
    }

    #[inline]
    pub fn encoder_state(&self) -> BackendState {
        if self.encoder.is_active() {
            BackendState::Active
        } else {
            BackendState::Uninitialized
        }
    }

    #[inline]
    pub fn decoder_state(&self) -> BackendState {
        if self.decoder.is_active() {
            BackendState::Active
        } else {
            BackendState::Uninitialized
        }
    }

    /// Ordering tag the next encoded frame will carry.
    #[inline]
    pub fn next_timestamp(&self) -> FrameTimestamp {
        self.next_timestamp
    }

    #[inline]
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    #[inline]
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: CodecBackend> Drop for H264Codec<B> {
    fn drop(&mut self) {
        self.reset();
    }
}
