//! Output device discovery and configuration.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// First output device whose name contains `needle` (case-insensitive), or the host default.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let Some(needle) = needle else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow!("No default output device"));
    };

    host.output_devices()
        .context("No output devices")?
        .find(|d| {
            d.description()
                .map(|desc| matches_device_name(&desc.name(), needle))
                .unwrap_or(false)
        })
        .ok_or_else(|| anyhow!("No output device matched: {needle}"))
}

/// The rate the device runs at by default, used as the resampling target.
pub fn default_rate(device: &cpal::Device) -> Option<u32> {
    device
        .default_output_config()
        .ok()
        .map(|cfg| cfg.sample_rate())
}

/// Pick the supported output config closest to `target_rate`.
///
/// Prefers the highest rate `<= target_rate` (any rate when `None`), then the lowest-ranked
/// sample format (`f32` first).
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig> {
    let mut best: Option<(Candidate, cpal::SupportedStreamConfig)> = None;

    for range in device.supported_output_configs()? {
        let rate = rate_for_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let candidate = Candidate {
            below: target_rate.is_none_or(|t| rate <= t),
            rate,
            format_rank: sample_format_rank(range.sample_format()),
        };
        if best.as_ref().is_none_or(|(b, _)| candidate.beats(b)) {
            best = Some((candidate, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Largest fixed buffer size the device allows, capped at `max_frames`.
///
/// `None` leaves the device default in place.
pub fn pick_buffer_size(
    config: &cpal::SupportedStreamConfig,
    max_frames: u32,
) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed((*max).min(max_frames).max(*min)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Print available output devices to stdout.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let default_name = host
        .default_output_device()
        .and_then(|d| d.description().ok())
        .map(|d| d.name().to_string());

    for (i, d) in host.output_devices().context("No output devices")?.enumerate() {
        let desc = d.description()?;
        let marker = if default_name.as_deref() == Some(&*desc.name()) { " (default)" } else { "" };
        match default_rate(&d) {
            Some(rate) => println!("#{i}: {desc}{marker} [{rate} Hz]"),
            None => println!("#{i}: {desc}{marker}"),
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    below: bool,
    rate: u32,
    format_rank: u8,
}

impl Candidate {
    fn beats(&self, other: &Candidate) -> bool {
        if self.below != other.below {
            self.below
        } else if self.rate != other.rate {
            self.rate > other.rate
        } else {
            self.format_rank < other.format_rank
        }
    }
}

fn rate_for_range(min: u32, max: u32, target_rate: Option<u32>) -> u32 {
    match target_rate {
        Some(t) => t.clamp(min, max.max(min)),
        None => max,
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    !needle.is_empty() && name.to_lowercase().contains(&needle.to_lowercase())
}
