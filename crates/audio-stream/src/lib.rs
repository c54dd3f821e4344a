//! Streaming audio pipeline core.
//!
//! A [`DynamicStream`] opens a URI through the [`Registry`] (data source, then decoder),
//! pulls interleaved `f32` [`Buffer`]s from the decoder, coalesces small ones, runs them
//! through an ordered DSP chain, and hands them to the caller with a position stamp.
//! Buffers recycle through a shared [`BufferPool`].
//!
//! For device playback, [`producer::spawn_producer`] moves pulling onto its own thread and
//! feeds a bounded [`BufferQueue`] that a real-time callback drains.

pub mod buffer;
pub mod config;
pub mod decoder;
pub mod dsp;
pub mod error;
pub mod http_source;
pub mod pool;
pub mod position;
pub mod producer;
pub mod queue;
pub mod registry;
pub mod source;
pub mod stream;
pub mod symphonia_decoder;

pub use buffer::Buffer;
pub use config::{PlaybackConfig, StreamOptions};
pub use error::{SeekError, StreamError};
pub use pool::BufferPool;
pub use queue::{BufferQueue, PopStrategy};
pub use registry::Registry;
pub use stream::DynamicStream;
