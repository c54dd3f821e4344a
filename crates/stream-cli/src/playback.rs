//! CPAL output stream fed from a [`BufferQueue`].
//!
//! The callback never blocks: it pops processed buffers non-blocking, maps channels,
//! converts to the device sample format, and fills silence on underrun. Each buffer goes
//! back to the stream's pool once the callback has played it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use audio_stream::{Buffer, BufferPool, BufferQueue, PopStrategy};
use cpal::traits::DeviceTrait;

/// Counters the callback updates for the controlling thread.
#[derive(Debug, Default)]
pub struct PlaybackStatus {
    played_frames: AtomicU64,
    underrun_events: AtomicU64,
    position_bits: AtomicU64,
    finished: AtomicBool,
}

impl PlaybackStatus {
    pub fn played_frames(&self) -> u64 {
        self.played_frames.load(Ordering::Relaxed)
    }

    pub fn underrun_events(&self) -> u64 {
        self.underrun_events.load(Ordering::Relaxed)
    }

    /// Stream position of the buffer currently playing.
    pub fn position_seconds(&self) -> f64 {
        f64::from_bits(self.position_bits.load(Ordering::Relaxed))
    }

    /// The queue was closed and the callback has played everything in it.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Build an output stream that plays buffers from `queue` and recycles them into `pool`.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<BufferQueue>,
    pool: BufferPool,
    status: &Arc<PlaybackStatus>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, queue, pool, status),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, queue, pool, status),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, queue, pool, status),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, queue, pool, status),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<BufferQueue>,
    pool: BufferPool,
    status: &Arc<PlaybackStatus>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;
    let device_rate = config.sample_rate;
    let queue = queue.clone();
    let status = status.clone();
    let mut cursor = Cursor::default();
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let frames = data.len() / channels_out;
            let mut filled = 0usize;

            while filled < frames {
                if cursor.exhausted() {
                    if let Some(done) = cursor.buffer.take() {
                        pool.release(done);
                    }
                    let Some(next) = queue.pop(PopStrategy::NonBlocking) else {
                        if queue.is_done() {
                            status.finished.store(true, Ordering::Relaxed);
                        } else {
                            status.underrun_events.fetch_add(1, Ordering::Relaxed);
                        }
                        break;
                    };
                    if next.sample_rate() != 0 && next.sample_rate() != device_rate {
                        cursor.log_rate_mismatch(next.sample_rate(), device_rate);
                    }
                    status
                        .position_bits
                        .store(next.position().to_bits(), Ordering::Relaxed);
                    cursor.start(next);
                    // an empty buffer is released on the next pass
                    continue;
                }

                let out = &mut data[filled * channels_out..(filled + 1) * channels_out];
                for (ch, slot) in out.iter_mut().enumerate() {
                    *slot = <T as cpal::Sample>::from_sample::<f32>(cursor.sample_for(ch, channels_out));
                }
                cursor.advance();
                filled += 1;
            }

            data[filled * channels_out..].fill(silence);
            if filled > 0 {
                status.played_frames.fetch_add(filled as u64, Ordering::Relaxed);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Read position inside the buffer the callback is playing.
#[derive(Default)]
struct Cursor {
    buffer: Option<Buffer>,
    pos: usize,
    warned_rate: Option<u32>,
}

impl Cursor {
    fn start(&mut self, buffer: Buffer) {
        self.buffer = Some(buffer);
        self.pos = 0;
    }

    fn exhausted(&self) -> bool {
        self.buffer
            .as_ref()
            .is_none_or(|b| b.channels() == 0 || self.pos + b.channels() > b.len())
    }

    fn advance(&mut self) {
        if let Some(b) = &self.buffer {
            self.pos += b.channels();
        }
    }

    /// Output sample for `dst_ch` of the current frame.
    ///
    /// mono → stereo duplicates, stereo → mono averages, other layouts clamp to the last
    /// available source channel.
    fn sample_for(&self, dst_ch: usize, dst_channels: usize) -> f32 {
        let Some(b) = &self.buffer else {
            return 0.0;
        };
        let frame = &b.samples()[self.pos..self.pos + b.channels()];
        map_channel(frame, dst_ch, dst_channels)
    }

    fn log_rate_mismatch(&mut self, src: u32, dst: u32) {
        if self.warned_rate != Some(src) {
            self.warned_rate = Some(src);
            tracing::warn!(source_hz = src, device_hz = dst, "buffer rate differs from device rate");
        }
    }
}

fn map_channel(frame: &[f32], dst_ch: usize, dst_channels: usize) -> f32 {
    match (frame.len(), dst_channels) {
        (0, _) => 0.0,
        (2, 1) => 0.5 * (frame[0] + frame[1]),
        (src, _) => frame[dst_ch.min(src - 1)],
    }
}
