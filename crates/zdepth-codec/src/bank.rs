//! A fixed set of independent codecs driven in parallel.
//!
//! Callers that split a frame into slices (for example the high and low bit
//! planes of a depth image) give each slice its own [`H264Codec`] and
//! dispatch all of them at once.  Every codec owns its own execution
//! context and sessions; only the calling thread's borrow is shared.

use rayon::prelude::*;
use tracing::{debug, warn};

use zdepth_core::codec_traits::CodecBackend;
use zdepth_core::config::CodecConfig;
use zdepth_core::error::{CodecError, Result};
use zdepth_core::types::StreamGeometry;

use crate::h264::H264Codec;

/// Number of codecs a depth compressor runs side by side.
pub const DEFAULT_PARALLEL_CODECS: usize = 4;

pub struct CodecBank<B: CodecBackend> {
    codecs: Vec<H264Codec<B>>,
}

impl<B: CodecBackend> CodecBank<B>
where
    H264Codec<B>: Send,
{
    /// Build `count` codecs, creating one backend per codec.
    pub fn new(
        count: usize,
        config: &CodecConfig,
        mut make_backend: impl FnMut(usize) -> B,
    ) -> Result<Self> {
        if count == 0 {
            return Err(CodecError::Config("codec bank needs at least one codec".into()));
        }
        let codecs = (0..count)
            .map(|index| H264Codec::new(make_backend(index), config.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { codecs })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    pub fn codec(&self, index: usize) -> Option<&H264Codec<B>> {
        self.codecs.get(index)
    }

    pub fn codec_mut(&mut self, index: usize) -> Option<&mut H264Codec<B>> {
        self.codecs.get_mut(index)
    }

    /// Encode one input per codec concurrently.  Outputs are in codec order.
    ///
    /// Every codec is submitted even if a sibling fails; the call then
    /// returns the first error in codec order.
    pub fn encode_begin_all(
        &mut self,
        geometry: StreamGeometry,
        keyframe: bool,
        inputs: &[&[u8]],
    ) -> Result<Vec<Vec<u8>>> {
        self.check_arity(inputs.len())?;
        debug!(codecs = self.codecs.len(), keyframe, "Parallel encode dispatch");
        self.scatter(inputs, |codec, input| {
            let mut compressed = Vec::new();
            codec
                .encode_begin(geometry, keyframe, input, &mut compressed)
                .map(|()| compressed)
        })
    }

    /// Flush every codec into its own accumulator.
    ///
    /// All codecs are flushed even if one fails, so successful flushes are
    /// appended to their accumulators while a failed one is left untouched.
    /// Returns the first error in codec order.
    pub fn encode_finish_all(&mut self, accumulators: &mut [Vec<u8>]) -> Result<()> {
        self.check_arity(accumulators.len())?;
        let mut first_error = None;
        for (index, (codec, compressed)) in
            self.codecs.iter_mut().zip(accumulators.iter_mut()).enumerate()
        {
            if let Err(err) = codec.encode_finish(compressed) {
                warn!(codec = index, error = %err, "Codec flush failed");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Decode one input per codec concurrently.  Outputs are in codec order.
    pub fn decode_all(
        &mut self,
        geometry: StreamGeometry,
        inputs: &[&[u8]],
    ) -> Result<Vec<Vec<u8>>> {
        self.check_arity(inputs.len())?;
        debug!(codecs = self.codecs.len(), "Parallel decode dispatch");
        self.scatter(inputs, |codec, input| {
            let mut decoded = Vec::new();
            codec.decode(geometry, input, &mut decoded).map(|()| decoded)
        })
    }

    fn check_arity(&self, got: usize) -> Result<()> {
        if got != self.codecs.len() {
            return Err(CodecError::Config(format!(
                "codec bank has {} codecs but was given {got} buffers",
                self.codecs.len()
            )));
        }
        Ok(())
    }

    /// Run `work` once per codec on the rayon pool.  Every codec runs to
    /// completion; the first error in codec order is returned.
    fn scatter<F>(&mut self, inputs: &[&[u8]], work: F) -> Result<Vec<Vec<u8>>>
    where
        F: Fn(&mut H264Codec<B>, &[u8]) -> Result<Vec<u8>> + Send + Sync,
    {
        let results: Vec<Result<Vec<u8>>> = self
            .codecs
            .par_iter_mut()
            .zip(inputs.par_iter())
            .map(|(codec, input)| work(codec, input))
            .collect();
        results.into_iter().collect()
    }
}
