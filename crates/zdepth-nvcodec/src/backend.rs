//! [`CodecBackend`] for NVIDIA GPUs.

use tracing::warn;

use zdepth_core::codec_traits::{CodecBackend, DecoderSettings, EncoderSettings};
use zdepth_core::cuda::CudaDriver;
use zdepth_core::error::Result;
use zdepth_core::types::ContextHandle;

use crate::nvdec_stub::NvDecoder;
use crate::nvenc_stub::NvEncoder;

#[derive(Debug, Default)]
pub struct NvidiaBackend {
    driver: CudaDriver,
}

impl NvidiaBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CodecBackend for NvidiaBackend {
    type Driver = CudaDriver;
    type Encoder = NvEncoder;
    type Decoder = NvDecoder;

    fn driver(&mut self) -> &mut CudaDriver {
        &mut self.driver
    }

    fn create_encoder(
        &mut self,
        _context: ContextHandle,
        settings: &EncoderSettings,
    ) -> Result<NvEncoder> {
        warn!(
            width = settings.geometry.width(),
            height = settings.geometry.height(),
            "NVENC session requested from a stub build"
        );
        Err(NvEncoder::unavailable())
    }

    fn create_decoder(
        &mut self,
        _context: ContextHandle,
        settings: &DecoderSettings,
    ) -> Result<NvDecoder> {
        warn!(
            width = settings.geometry.width(),
            height = settings.geometry.height(),
            "NVDEC session requested from a stub build"
        );
        Err(NvDecoder::unavailable())
    }
}
