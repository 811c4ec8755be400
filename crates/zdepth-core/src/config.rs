//! Codec configuration.
//!
//! All fields have defaults, so an empty JSON object (or no file at all)
//! yields the stock configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};

/// Submissions per `decode` call before giving up on a picture.  Hardware
/// decoders buffer internally and may need the same packet more than once
/// before they emit the first frame.
pub const DEFAULT_DECODE_ATTEMPTS: u32 = 3;

/// Encoder rate/latency preset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderPreset {
    /// SDK default preset.
    Default,
    /// Low per-frame latency, quality-biased.
    #[default]
    LowLatencyHighQuality,
    /// Low per-frame latency, speed-biased.
    LowLatencyHighPerformance,
}

/// Which planes `decode` copies out of the decoded picture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeOutput {
    /// Luma plane only, `width × height` bytes.
    #[default]
    Luma,
    /// Luma followed by the interleaved chroma plane.
    Nv12,
}

/// Runtime configuration for one codec instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecConfig {
    /// CUDA device ordinal.
    pub gpu_index: u32,
    /// Upper bound on decoder submissions per call (at least 1).
    pub decode_attempts: u32,
    pub encoder_preset: EncoderPreset,
    pub decode_output: DecodeOutput,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            gpu_index: 0,
            decode_attempts: DEFAULT_DECODE_ATTEMPTS,
            encoder_preset: EncoderPreset::default(),
            decode_output: DecodeOutput::default(),
        }
    }
}

impl CodecConfig {
    pub fn from_json_str(data: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(data)
            .map_err(|err| CodecError::Config(format!("invalid codec config JSON: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|err| {
            CodecError::Config(format!("failed to read '{}': {err}", path.display()))
        })?;
        Self::from_json_str(&data)
    }

    pub fn validate(&self) -> Result<()> {
        if self.decode_attempts == 0 {
            return Err(CodecError::Config(
                "decode_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn with_gpu_index(mut self, gpu_index: u32) -> Self {
        self.gpu_index = gpu_index;
        self
    }
}
