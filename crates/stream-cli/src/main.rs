//! stream-cli: drive the audio-stream pipeline from the command line.
//!
//! ## Pipeline
//! 1. **Open**: the registry resolves the URI (file or http range reader) and a Symphonia
//!    decoder for it.
//! 2. **Pull**: a producer thread pulls coalesced, resampled buffers and queues them.
//! 3. **Playback**: the CPAL callback drains the queue without blocking and releases
//!    played buffers back to the stream's pool.
//!
//! `scan` runs steps 1-2 synchronously without a device and prints a report.

mod cli;
mod device;
mod playback;
mod scan;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use audio_stream::dsp::{GainFactory, ResampleFactory};
use audio_stream::producer::spawn_producer;
use audio_stream::{BufferQueue, DynamicStream, PlaybackConfig, Registry, StreamOptions};
use clap::Parser;
use cpal::traits::{DeviceTrait, StreamTrait};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,stream_cli=info,audio_stream=info")
        }))
        .init();

    let host = cpal::default_host();
    if args.list_devices {
        device::list_devices(&host)?;
        return Ok(());
    }

    match &args.cmd {
        Some(cli::Command::Play { uri, seek }) => play(&host, &args, uri, *seek),
        Some(cli::Command::Scan {
            uri,
            seek,
            resample_to,
            json,
        }) => {
            let mut stream = open_stream(&args, *resample_to, uri, *seek)?;
            let report = scan::run(&mut stream);
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                report.print_text();
            }
            Ok(())
        }
        None => Err(anyhow!("no command given (try `play <uri>` or `--list-devices`)")),
    }
}

/// Registry with the default backends plus the DSP stages the flags ask for.
fn build_registry(args: &cli::Args, resample_to: Option<u32>) -> Registry {
    let mut registry = Registry::with_defaults();
    if let Some(target_rate) = resample_to {
        registry = registry.with_dsp(ResampleFactory {
            target_rate,
            chunk_frames: args.chunk_frames,
        });
    }
    if args.gain_db != 0.0 {
        registry = registry.with_dsp(GainFactory { db: args.gain_db });
    }
    registry
}

fn open_stream(
    args: &cli::Args,
    resample_to: Option<u32>,
    uri: &str,
    seek: Option<f64>,
) -> Result<DynamicStream> {
    let options = StreamOptions {
        disable_dsp: args.no_dsp,
        preferred_buffer_samples: args.preferred_samples,
    };
    let mut stream = DynamicStream::new(Arc::new(build_registry(args, resample_to)), options);
    stream.open(uri)?;
    tracing::debug!(dsp_stages = stream.dsp_count(), "stream opened");

    if let Some(d) = stream.duration_seconds() {
        tracing::info!(duration_s = d, "source");
    }
    if let Some(seconds) = seek {
        match stream.seek(seconds) {
            Ok(actual) => tracing::info!(requested = seconds, actual, "seeked"),
            Err(e) => tracing::warn!("seek ignored: {e}"),
        }
    }
    Ok(stream)
}

fn play(host: &cpal::Host, args: &cli::Args, uri: &str, seek: Option<f64>) -> Result<()> {
    let playback_cfg = PlaybackConfig {
        queue_buffers: args.queue_buffers,
        ..PlaybackConfig::default()
    };

    let device = device::pick_device(host, args.device.as_deref())?;
    tracing::info!(device = %device.description()?, "output device");

    let config = device::pick_output_config(&device, device::default_rate(&device))?;
    let mut stream_config: cpal::StreamConfig = config.clone().into();
    if let Some(buf) = device::pick_buffer_size(&config, playback_cfg.max_device_buffer_frames) {
        stream_config.buffer_size = buf;
    }
    let device_rate = stream_config.sample_rate;
    tracing::info!(
        rate_hz = device_rate,
        channels = stream_config.channels,
        format = ?config.sample_format(),
        "output config"
    );
    if args.no_dsp {
        tracing::warn!("dsp disabled; audio plays at the source rate unconverted");
    }

    let stream = open_stream(args, Some(device_rate), uri, seek)?;
    let pool = stream.pool();
    let queue = Arc::new(BufferQueue::new(playback_cfg.queue_buffers));
    let cancel = Arc::new(AtomicBool::new(false));

    let cancel_for_signal = cancel.clone();
    let queue_for_signal = queue.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        cancel_for_signal.store(true, Ordering::Relaxed);
        queue_for_signal.close();
    }) {
        tracing::warn!("ctrl-c handler not installed: {e}");
    }

    let producer = spawn_producer(stream, queue.clone(), cancel.clone());
    let status = Arc::new(playback::PlaybackStatus::default());
    let output = playback::build_output_stream(
        &device,
        &stream_config,
        config.sample_format(),
        &queue,
        pool,
        &status,
    )?;
    output.play()?;

    let drained = queue.wait_until_done_and_empty_or_cancel(&cancel);
    // the callback still holds the last buffer; give it time to play out
    let deadline = Instant::now() + Duration::from_secs(2);
    while drained && !status.is_finished() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    drop(output);

    let stats = producer
        .join()
        .map_err(|_| anyhow!("producer thread panicked"))?;
    tracing::info!(
        buffers = stats.buffers,
        queued_to_s = stats.last_position,
        position_s = status.position_seconds(),
        played_frames = status.played_frames(),
        underruns = status.underrun_events(),
        cancelled = !drained,
        "playback finished"
    );
    Ok(())
}
