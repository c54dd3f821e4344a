/// Construction-time options for a [`DynamicStream`](crate::stream::DynamicStream).
#[derive(Clone, Debug)]
pub struct StreamOptions {
    /// Skip building the DSP chain entirely.
    pub disable_dsp: bool,
    /// Coalesce decoder output until a buffer holds at least this many samples
    /// (interleaved, across all channels).
    pub preferred_buffer_samples: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            disable_dsp: false,
            preferred_buffer_samples: 4096,
        }
    }
}

/// Tuning for the producer/consumer hand-off used during device playback.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Processed buffers held in the queue before the producer blocks.
    pub queue_buffers: usize,
    /// Upper bound on the fixed device buffer size, in frames.
    pub max_device_buffer_frames: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            queue_buffers: 16,
            max_device_buffer_frames: 16_384,
        }
    }
}
