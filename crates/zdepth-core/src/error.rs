//! Typed error hierarchy for the codec.
//!
//! Every failure a caller can observe is one of these variants.  Errors and
//! panics raised by the GPU driver or the vendor codec SDK are converted at
//! the pipeline boundary and never unwind into the orchestrator.
//!
//! # Error codes
//!
//! Each variant maps to a stable integer code via [`CodecError::error_code`]
//! for structured logging without string parsing.

/// All errors originating from the zdepth codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    // ── Driver / execution context ───────────────────────────────────
    #[error("CUDA driver error: {0}")]
    Cuda(#[from] cudarc::driver::DriverError),

    #[error("GPU driver error: {0}")]
    Driver(String),

    // ── Configuration / lifecycle ────────────────────────────────────
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Encoder not initialized; call encode_begin() first")]
    NotInitialized,

    // ── Codec construction ───────────────────────────────────────────
    #[error("Encoder construction failed: {0}")]
    EncoderCreate(String),

    #[error("Decoder construction failed: {0}")]
    DecoderCreate(String),

    #[error("Codec SDK unavailable: {0}")]
    Unavailable(String),

    // ── Codec operation ──────────────────────────────────────────────
    #[error("No encoder input buffer available")]
    InputBufferExhausted,

    #[error("Decoder produced no frame after {attempts} attempt(s)")]
    NoFrameDecoded { attempts: u32 },

    #[error("H.264 encode error: {0}")]
    Encode(String),

    #[error("H.264 decode error: {0}")]
    Decode(String),

    #[error("Encoder flush produced no output")]
    EmptyFlush,

    // ── Type contracts ───────────────────────────────────────────────
    #[error("Invalid stream geometry {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },

    #[error("Buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },

    // ── Recovered panics ─────────────────────────────────────────────
    #[error("Panic recovered in {stage}: {message}")]
    PanicRecovered {
        stage: &'static str,
        message: String,
    },
}

impl CodecError {
    /// Stable integer error code.
    ///
    /// Codes are grouped by category:
    /// - 1xx: driver/context
    /// - 2xx: configuration/lifecycle
    /// - 3xx: codec
    /// - 5xx: type contracts
    /// - 7xx: recovered panics
    pub fn error_code(&self) -> u32 {
        match self {
            Self::Cuda(_) => 100,
            Self::Driver(_) => 101,
            Self::Config(_) => 200,
            Self::NotInitialized => 201,
            Self::EncoderCreate(_) => 300,
            Self::DecoderCreate(_) => 301,
            Self::Unavailable(_) => 302,
            Self::InputBufferExhausted => 303,
            Self::NoFrameDecoded { .. } => 304,
            Self::Encode(_) => 305,
            Self::Decode(_) => 306,
            Self::EmptyFlush => 307,
            Self::InvalidGeometry { .. } => 500,
            Self::BufferTooSmall { .. } => 501,
            Self::PanicRecovered { .. } => 700,
        }
    }

    /// Whether the failure only affects the current call.
    ///
    /// Transient failures clear up on their own: the encoder queue drains,
    /// or the decoder pipeline fills up and starts emitting pictures.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::InputBufferExhausted | Self::NoFrameDecoded { .. }
        )
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::CodecError;

    #[test]
    fn codes_are_grouped_by_category() {
        assert_eq!(CodecError::Driver(String::new()).error_code() / 100, 1);
        assert_eq!(CodecError::NotInitialized.error_code() / 100, 2);
        assert_eq!(CodecError::EmptyFlush.error_code() / 100, 3);
        assert_eq!(
            CodecError::InvalidGeometry {
                width: 0,
                height: 1
            }
            .error_code()
                / 100,
            5
        );
        assert_eq!(
            CodecError::PanicRecovered {
                stage: "encode",
                message: String::new()
            }
            .error_code(),
            700
        );
    }

    #[test]
    fn only_queue_and_latency_failures_are_transient() {
        assert!(CodecError::InputBufferExhausted.is_transient());
        assert!(CodecError::NoFrameDecoded { attempts: 3 }.is_transient());
        assert!(!CodecError::EmptyFlush.is_transient());
        assert!(!CodecError::Encode("boom".into()).is_transient());
    }

    #[test]
    fn display_includes_attempt_count() {
        let msg = CodecError::NoFrameDecoded { attempts: 3 }.to_string();
        assert!(msg.contains("3 attempt"));
    }
}
