//! Stub NVDEC session for builds without Video Codec SDK bindings.

use zdepth_core::codec_traits::HwDecoder;
use zdepth_core::error::{CodecError, Result};
use zdepth_core::types::DecodePacket;

pub(crate) const NVDEC_UNAVAILABLE: &str =
    "zdepth-nvcodec built in stub mode: NVDEC is unavailable on this build host";

/// Uninhabited: a stub build can never open an NVDEC session.
#[derive(Debug)]
pub enum NvDecoder {}

impl NvDecoder {
    pub(crate) fn unavailable() -> CodecError {
        CodecError::Unavailable(NVDEC_UNAVAILABLE.into())
    }
}

impl HwDecoder for NvDecoder {
    fn decode(&mut self, _packet: &DecodePacket<'_>) -> Result<usize> {
        match *self {}
    }

    fn frame(&self, _index: usize) -> Option<&[u8]> {
        match *self {}
    }
}
