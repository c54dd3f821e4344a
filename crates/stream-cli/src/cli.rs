use clap::{Parser, Subcommand};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "stream-cli", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Coalesce decoder output until a buffer holds at least this many samples
    #[arg(long, default_value_t = 4096)]
    pub preferred_samples: usize,

    /// Skip the DSP chain (no resampling, no gain)
    #[arg(long)]
    pub no_dsp: bool,

    /// Gain in dB applied after resampling
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub gain_db: f32,

    /// Resampler input chunk size in frames (higher => more latency, lower => more overhead)
    #[arg(long, default_value_t = 1024)]
    pub chunk_frames: usize,

    /// Processed buffers queued between the decode thread and the device
    #[arg(long, default_value_t = 16)]
    pub queue_buffers: usize,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a file path or http(s) URL on an output device
    Play {
        uri: String,

        /// Start position in seconds
        #[arg(long)]
        seek: Option<f64>,
    },

    /// Decode a source without a device and report what the pipeline produced
    Scan {
        uri: String,

        /// Start position in seconds
        #[arg(long)]
        seek: Option<f64>,

        /// Resample to this rate (Hz) instead of keeping the source rate
        #[arg(long)]
        resample_to: Option<u32>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}
