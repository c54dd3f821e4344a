//! Sample-accurate playback position bookkeeping.

/// Absolute sample counter plus the most recently observed decoder format.
///
/// The counter counts interleaved samples (not frames) consumed from the decoder.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PositionTracker {
    samples: u64,
    sample_rate: u32,
    channels: usize,
    /// Seek target recorded before any format was known; applied on the next advance.
    pending_seek: Option<f64>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interleaved samples consumed so far.
    pub fn sample_position(&self) -> u64 {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Adopt a format without consuming samples.
    pub fn set_format(&mut self, sample_rate: u32, channels: usize) {
        self.sample_rate = sample_rate;
        self.channels = channels;
    }

    /// Record a decoded buffer: adopt its format, then advance by `samples`.
    ///
    /// Returns the position in seconds after these samples, i.e. where the buffer ends.
    pub fn advance(&mut self, sample_rate: u32, channels: usize, samples: usize) -> f64 {
        self.set_format(sample_rate, channels);
        if let Some(seconds) = self.pending_seek.take() {
            self.seek_to(seconds);
        }
        self.samples = self.samples.saturating_add(samples as u64);
        self.seconds()
    }

    /// Current position in seconds, zero until a format is known.
    pub fn seconds(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples as f64 / self.channels as f64 / self.sample_rate as f64
    }

    /// Move the counter to `seconds` using the last known format.
    ///
    /// Without a format the counter drops to zero and the target is kept until the next
    /// [`advance`](Self::advance) supplies one.
    pub fn seek_to(&mut self, seconds: f64) {
        if self.sample_rate == 0 || self.channels == 0 {
            self.samples = 0;
            self.pending_seek = Some(seconds);
            return;
        }
        self.pending_seek = None;
        let frames = (seconds.max(0.0) * self.sample_rate as f64).round() as u64;
        self.samples = frames.saturating_mul(self.channels as u64);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
