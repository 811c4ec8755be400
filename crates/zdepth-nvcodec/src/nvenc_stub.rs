//! Stub NVENC session for builds without Video Codec SDK bindings.

use zdepth_core::codec_traits::HwEncoder;
use zdepth_core::error::{CodecError, Result};
use zdepth_core::types::{BitstreamUnit, EncoderInputFrame, PicParams};

pub(crate) const NVENC_UNAVAILABLE: &str =
    "zdepth-nvcodec built in stub mode: NVENC is unavailable on this build host";

/// Uninhabited: a stub build can never open an NVENC session.
#[derive(Debug)]
pub enum NvEncoder {}

impl NvEncoder {
    pub(crate) fn unavailable() -> CodecError {
        CodecError::Unavailable(NVENC_UNAVAILABLE.into())
    }
}

impl HwEncoder for NvEncoder {
    fn next_input_frame(&mut self) -> Option<EncoderInputFrame> {
        match *self {}
    }

    fn encode_frame(&mut self, _params: &PicParams, _units: &mut Vec<BitstreamUnit>) -> Result<()> {
        match *self {}
    }

    fn end_encode(&mut self, _units: &mut Vec<BitstreamUnit>) -> Result<()> {
        match *self {}
    }
}
