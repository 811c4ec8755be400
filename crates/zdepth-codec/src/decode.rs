//! Decode pipeline: lazily constructed hardware decoder with bounded resubmission.
//!
//! Hardware decoders are internally pipelined: a complete picture handed in
//! with the end-of-picture flag may still not come out on the first
//! submission.  Each call therefore submits the same packet up to
//! `attempts` times and stops as soon as a picture is available.  This is a
//! latency accommodation, not an error retry: a submission that fails
//! outright aborts the call immediately.

use tracing::{debug, info};

use zdepth_core::codec_traits::{CodecBackend, DecoderSettings, HwDecoder};
use zdepth_core::config::DecodeOutput;
use zdepth_core::context::ExecutionContext;
use zdepth_core::error::{CodecError, Result};
use zdepth_core::types::{DecodePacket, PacketFlags, StreamGeometry, SubmitStream, VideoCodec};

use crate::guard::guarded;

pub struct DecodePipeline<B: CodecBackend> {
    decoder: Option<B::Decoder>,
    attempts: u32,
    output: DecodeOutput,
}

impl<B: CodecBackend> DecodePipeline<B> {
    /// `attempts` is clamped to at least one submission per call.
    pub fn new(attempts: u32, output: DecodeOutput) -> Self {
        Self {
            decoder: None,
            attempts: attempts.max(1),
            output,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.decoder.is_some()
    }

    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn teardown(&mut self) {
        if self.decoder.take().is_some() {
            debug!("Decoder session released");
        }
    }

    /// Decode one compressed picture into `decoded`.
    ///
    /// On success `decoded` holds the first returned picture's luma plane
    /// (or full NV12 picture, per [`DecodeOutput`]); any further pictures
    /// from the same submission are discarded.  On failure `decoded` is left
    /// untouched.
    pub fn decode(
        &mut self,
        backend: &mut B,
        context: &mut ExecutionContext,
        gpu_index: u32,
        geometry: StreamGeometry,
        input: &[u8],
        decoded: &mut Vec<u8>,
    ) -> Result<()> {
        self.ensure_decoder(backend, context, gpu_index, geometry)?;
        let Some(decoder) = self.decoder.as_mut() else {
            return Err(CodecError::NotInitialized);
        };

        let packet = DecodePacket {
            data: input,
            flags: PacketFlags {
                end_of_picture: true,
            },
            timestamp: 0,
            stream: SubmitStream::PerThread,
        };

        let mut frame_count = 0;
        let mut submissions = 0;
        while submissions < self.attempts {
            submissions += 1;
            frame_count = guarded("decode submission", || decoder.decode(&packet))?;
            if frame_count >= 1 {
                break;
            }
        }

        if frame_count == 0 {
            return Err(CodecError::NoFrameDecoded {
                attempts: submissions,
            });
        }

        let need = match self.output {
            DecodeOutput::Luma => geometry.luma_bytes(),
            DecodeOutput::Nv12 => geometry.nv12_bytes(),
        };
        let picture = decoder
            .frame(0)
            .ok_or_else(|| CodecError::Decode("decoder reported a frame but returned none".into()))?;
        if picture.len() < need {
            return Err(CodecError::Decode(format!(
                "decoded picture holds {} bytes, expected at least {need} for {geometry}",
                picture.len()
            )));
        }

        decoded.clear();
        decoded.extend_from_slice(&picture[..need]);

        debug!(
            submissions,
            frames = frame_count,
            bytes = need,
            "Picture decoded"
        );
        Ok(())
    }

    fn ensure_decoder(
        &mut self,
        backend: &mut B,
        context: &mut ExecutionContext,
        gpu_index: u32,
        geometry: StreamGeometry,
    ) -> Result<()> {
        let context_handle = context.create(backend.driver(), gpu_index)?;
        if self.decoder.is_some() {
            return Ok(());
        }

        let settings = DecoderSettings {
            geometry,
            codec: VideoCodec::H264,
            host_output: true,
            low_latency: true,
            crop: None,
            resize: None,
        };
        let decoder = guarded("decoder construction", || {
            backend.create_decoder(context_handle, &settings)
        })?;

        info!(
            width = geometry.width(),
            height = geometry.height(),
            attempts = self.attempts,
            output = ?self.output,
            "H.264 decoder created"
        );
        self.decoder = Some(decoder);
        Ok(())
    }
}
