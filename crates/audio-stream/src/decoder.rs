//! Decoder capability consumed by the pipeline.
//!
//! A decoder is pull-based: each [`Decoder::fill`] overwrites one buffer with the next
//! chunk of interleaved `f32` PCM. It owns the [`DataSource`] it was opened on, so
//! dropping the decoder releases the source too.

use anyhow::Result;

use crate::buffer::Buffer;
use crate::error::SeekError;
use crate::source::DataSource;

pub trait Decoder: Send {
    /// Overwrite `buffer` with the next decoded chunk, including its sample rate and
    /// channel count.
    ///
    /// Returns `false` at end of stream or on an unrecoverable error; the pipeline treats
    /// both as "stop pulling". Implementations log their own failures.
    fn fill(&mut self, buffer: &mut Buffer) -> bool;

    /// Seek to `seconds`, returning the time actually reached.
    fn seek(&mut self, seconds: f64) -> std::result::Result<f64, SeekError>;

    /// Total duration, when the container reports it.
    fn duration_seconds(&self) -> Option<f64> {
        None
    }

    /// `(sample_rate, channels)` of the output, when known before the first `fill`.
    fn format(&self) -> Option<(u32, usize)> {
        None
    }
}

/// Selects and constructs decoders for opened data sources.
pub trait DecoderFactory: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    /// Cheap pre-check (extension, URI scheme) before the source is handed over.
    fn can_handle(&self, source: &dyn DataSource) -> bool;

    /// Take ownership of `source` and build a decoder, failing if the content is not
    /// understood.
    fn open(&self, source: Box<dyn DataSource>) -> Result<Box<dyn Decoder>>;
}
