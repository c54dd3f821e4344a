//! Sample-rate conversion stage.
//!
//! Uses Rubato's streaming sinc resampler. Rubato wants fixed-size input chunks while the
//! pipeline hands over buffers of any length, so input frames that do not fill a whole
//! chunk are carried over to the next call.

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::buffer::Buffer;

use super::{Dsp, DspFactory};

/// Creates [`ResampleDsp`] stages converting to `target_rate`.
#[derive(Clone, Copy, Debug)]
pub struct ResampleFactory {
    pub target_rate: u32,
    /// Input chunk size in frames.
    pub chunk_frames: usize,
}

impl DspFactory for ResampleFactory {
    fn create(&self) -> Box<dyn Dsp> {
        Box::new(ResampleDsp::new(self.target_rate, self.chunk_frames))
    }
}

pub struct ResampleDsp {
    target_rate: u32,
    chunk_frames: usize,
    state: Option<ResampleState>,
}

struct ResampleState {
    src_rate: u32,
    channels: usize,
    resampler: Box<dyn Resampler<f32>>,
    pending: Vec<f32>,
    out: Vec<f32>,
}

impl ResampleDsp {
    pub fn new(target_rate: u32, chunk_frames: usize) -> Self {
        Self {
            target_rate,
            chunk_frames: chunk_frames.max(1),
            state: None,
        }
    }

    /// Input frames held back waiting for a full chunk.
    pub fn pending_frames(&self) -> usize {
        self.state
            .as_ref()
            .map(|s| s.pending.len() / s.channels)
            .unwrap_or(0)
    }

    fn build_state(&self, src_rate: u32, channels: usize) -> Option<ResampleState> {
        let sinc_len = 128;
        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 256,
            window,
        };
        let f_ratio = self.target_rate as f64 / src_rate as f64;

        let resampler = match Async::<f32>::new_sinc(
            f_ratio,
            1.1,
            &params,
            self.chunk_frames,
            channels,
            FixedAsync::Input,
        ) {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("resampler init error: {e:#}");
                return None;
            }
        };
        let out = vec![0.0f32; channels * resampler.output_frames_max()];

        tracing::info!(
            from_hz = src_rate,
            to_hz = self.target_rate,
            channels,
            "resampling"
        );
        Some(ResampleState {
            src_rate,
            channels,
            resampler: Box::new(resampler),
            pending: Vec::new(),
            out,
        })
    }
}

impl Dsp for ResampleDsp {
    fn name(&self) -> &str {
        "resample"
    }

    fn process(&mut self, input: &Buffer, output: &mut Buffer) -> bool {
        let src_rate = input.sample_rate();
        let channels = input.channels();
        if src_rate == 0 || channels == 0 || src_rate == self.target_rate {
            self.state = None;
            return false;
        }

        let stale = self
            .state
            .as_ref()
            .is_none_or(|s| s.src_rate != src_rate || s.channels != channels);
        if stale {
            self.state = self.build_state(src_rate, channels);
        }
        let chunk_frames = self.chunk_frames;
        let Some(state) = self.state.as_mut() else {
            return false;
        };

        state.pending.extend_from_slice(input.samples());
        output.clear();

        let chunk_samples = chunk_frames * channels;
        let out_frames = state.out.len() / channels;
        let indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            active_channels_mask: None,
            partial_len: None,
        };

        let mut consumed = 0usize;
        while state.pending.len() - consumed >= chunk_samples {
            let chunk = &state.pending[consumed..consumed + chunk_samples];
            let input_adapter = match InterleavedSlice::new(chunk, channels, chunk_frames) {
                Ok(a) => a,
                Err(e) => {
                    tracing::error!("interleaved slice (input) error: {e:#}");
                    break;
                }
            };
            let mut output_adapter =
                match InterleavedSlice::new_mut(&mut state.out, channels, out_frames) {
                    Ok(a) => a,
                    Err(e) => {
                        tracing::error!("interleaved slice (output) error: {e:#}");
                        break;
                    }
                };

            let (nbr_in, nbr_out) = match state.resampler.process_into_buffer(
                &input_adapter,
                &mut output_adapter,
                Some(&indexing),
            ) {
                Ok(x) => x,
                Err(e) => {
                    tracing::error!("resampler process error: {e:#}");
                    break;
                }
            };

            consumed += nbr_in.max(1) * channels;
            output.append(&state.out[..nbr_out * channels]);
        }
        state.pending.drain(..consumed.min(state.pending.len()));

        // held-back input has not been emitted yet, so the output ends that much earlier
        let held = (state.pending.len() / channels) as f64 / src_rate as f64;
        output.set_position((input.position() - held).max(0.0));
        output.set_format(self.target_rate, channels);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize, rate: u32, channels: usize) -> Buffer {
        let mut samples = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            let v = (i as f32 * 440.0 * std::f32::consts::TAU / rate as f32).sin() * 0.5;
            for _ in 0..channels {
                samples.push(v);
            }
        }
        Buffer::from_interleaved(samples, rate, channels)
    }

    #[test]
    fn matching_rate_passes_through() {
        let mut dsp = ResampleDsp::new(48_000, 1024);
        let input = sine(2048, 48_000, 2);
        let mut output = Buffer::new();
        assert!(!dsp.process(&input, &mut output));
        assert!(output.is_empty());
    }

    #[test]
    fn converts_rate_and_keeps_leftover() {
        let mut dsp = ResampleDsp::new(48_000, 1024);
        let mut input = sine(4410, 44_100, 2);
        input.set_position(0.1);
        let mut output = Buffer::new();
        output.set_position(0.1);

        assert!(dsp.process(&input, &mut output));
        assert_eq!(output.sample_rate(), 48_000);
        assert_eq!(output.channels(), 2);
        assert!((output.position() - (0.1 - 314.0 / 44_100.0)).abs() < 1e-12);
        assert!(output.len() > 0);
        assert!(output.is_frame_aligned());
        assert_eq!(dsp.pending_frames(), 4410 - 4 * 1024);
    }

    #[test]
    fn position_catches_up_when_leftover_is_consumed() {
        let mut dsp = ResampleDsp::new(48_000, 256);
        let mut output = Buffer::new();

        let mut first = sine(300, 44_100, 1);
        first.set_position(300.0 / 44_100.0);
        assert!(dsp.process(&first, &mut output));
        assert!((output.position() - 256.0 / 44_100.0).abs() < 1e-12);

        let mut second = sine(212, 44_100, 1);
        second.set_position(512.0 / 44_100.0);
        assert!(dsp.process(&second, &mut output));
        assert_eq!(dsp.pending_frames(), 0);
        assert!((output.position() - 512.0 / 44_100.0).abs() < 1e-12);
    }

    #[test]
    fn format_change_rebuilds_resampler() {
        let mut dsp = ResampleDsp::new(48_000, 256);
        let mut output = Buffer::new();
        assert!(dsp.process(&sine(300, 44_100, 2), &mut output));
        assert_eq!(dsp.pending_frames(), 44);

        assert!(dsp.process(&sine(300, 32_000, 1), &mut output));
        assert_eq!(output.channels(), 1);
        assert_eq!(dsp.pending_frames(), 44);
    }

    #[test]
    fn missing_format_is_not_handled() {
        let mut dsp = ResampleDsp::new(48_000, 256);
        let mut output = Buffer::new();
        assert!(!dsp.process(&Buffer::new(), &mut output));
    }
}
