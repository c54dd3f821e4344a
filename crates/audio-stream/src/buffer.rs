//! Owned PCM buffer carried through the pipeline.
//!
//! Samples are stored **interleaved** `f32`:
//! `frame0[ch0], frame0[ch1], ..., frame1[ch0], frame1[ch1], ...`
//!
//! A [`Buffer`] is exclusively owned by whoever holds it (pool, decoder, DSP stage,
//! consumer). Hand-offs are moves; nothing in the crate aliases a buffer.

/// Interleaved `f32` samples plus format and timeline metadata.
#[derive(Clone, Debug, Default)]
pub struct Buffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
    position: f64,
}

impl Buffer {
    /// Create an empty buffer with no format.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `samples` samples.
    pub fn with_capacity(samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(samples),
            ..Self::default()
        }
    }

    /// Build a buffer from interleaved samples.
    pub fn from_interleaved(samples: Vec<f32>, sample_rate: u32, channels: usize) -> Self {
        debug_assert!(channels == 0 || samples.len() % channels == 0);
        Self {
            samples,
            sample_rate,
            channels,
            position: 0.0,
        }
    }

    /// Interleaved sample data.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Mutable interleaved sample data.
    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Total samples across all channels.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples the buffer can hold without reallocating.
    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    /// Number of whole frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Set sample rate and channel count.
    pub fn set_format(&mut self, sample_rate: u32, channels: usize) {
        self.sample_rate = sample_rate;
        self.channels = channels;
    }

    /// Copy sample rate and channel count from `other`.
    pub fn copy_format(&mut self, other: &Buffer) {
        self.set_format(other.sample_rate, other.channels);
    }

    /// Timeline position in seconds at which this buffer's samples end.
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn set_position(&mut self, seconds: f64) {
        self.position = seconds;
    }

    /// Duration of the buffered audio in seconds (zero without a format).
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Drop all samples, keeping the allocation.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Append interleaved samples after the current contents.
    pub fn append(&mut self, samples: &[f32]) {
        self.samples.extend_from_slice(samples);
        debug_assert!(self.is_frame_aligned());
    }

    /// Replace the contents with `samples`, reusing the allocation.
    pub fn copy_from_slice(&mut self, samples: &[f32]) {
        self.samples.clear();
        self.samples.extend_from_slice(samples);
    }

    /// Resize to `len` samples, zero-filling any new tail.
    ///
    /// Decoders and DSP stages use this before writing through [`Buffer::samples_mut`].
    pub fn resize(&mut self, len: usize) {
        self.samples.resize(len, 0.0);
    }

    /// Whether the sample count is a whole multiple of the channel count.
    pub fn is_frame_aligned(&self) -> bool {
        self.channels == 0 || self.samples.len() % self.channels == 0
    }
}
