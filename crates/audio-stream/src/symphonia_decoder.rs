//! Symphonia-backed decoder.
//!
//! Uses Symphonia to:
//! - detect the container and codec of a data source (extension hint taken from the URI)
//! - decode packets of the first audio track into interleaved `f32`
//! - seek accurately by time, resetting codec state and trimming up to the target

use std::io::{self, Read, Seek, SeekFrom};

use anyhow::{Result, anyhow};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters, DecoderOptions};
use symphonia::core::errors::{Error as SymphoniaError, SeekErrorKind};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::buffer::Buffer;
use crate::decoder::{Decoder, DecoderFactory};
use crate::error::SeekError;
use crate::source::DataSource;

/// Extensions the enabled Symphonia features can demux.
const KNOWN_EXTENSIONS: &[&str] = &[
    "flac", "mp3", "aac", "adts", "wav", "wave", "aif", "aiff", "aifc", "ogg", "oga",
];

#[derive(Clone, Debug, Default)]
pub struct SymphoniaDecoderFactory;

impl DecoderFactory for SymphoniaDecoderFactory {
    fn name(&self) -> &str {
        "symphonia"
    }

    /// Known extensions, or no extension at all (content is sniffed on open).
    fn can_handle(&self, source: &dyn DataSource) -> bool {
        match source.extension() {
            Some(ext) => KNOWN_EXTENSIONS.contains(&ext.as_str()),
            None => true,
        }
    }

    fn open(&self, source: Box<dyn DataSource>) -> Result<Box<dyn Decoder>> {
        Ok(Box::new(SymphoniaDecoder::open(source)?))
    }
}

/// Adapts a [`DataSource`] to Symphonia's [`MediaSource`].
struct SourceAdapter(Box<dyn DataSource>);

impl Read for SourceAdapter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Seek for SourceAdapter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.seek(pos)
    }
}

impl MediaSource for SourceAdapter {
    fn is_seekable(&self) -> bool {
        self.0.is_seekable()
    }

    fn byte_len(&self) -> Option<u64> {
        self.0.byte_len()
    }
}

pub struct SymphoniaDecoder {
    uri: String,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    codec_params: CodecParameters,
    track_id: u32,
    seekable: bool,
    sample_buf: Option<SampleBuffer<f32>>,
    /// After an accurate seek: frames before this timestamp are decoded and dropped.
    skip_until_ts: Option<u64>,
    /// Set by a seek past the end; `fill` reports end of stream until the next good seek.
    past_end: bool,
}

impl SymphoniaDecoder {
    /// Detect the format of `source` and prepare its first audio track for decoding.
    pub fn open(source: Box<dyn DataSource>) -> Result<Self> {
        let uri = source.uri().to_string();
        let seekable = source.is_seekable();

        let mut hint = Hint::new();
        if let Some(ext) = source.extension() {
            hint.with_extension(&ext);
        }

        let mss = MediaSourceStream::new(Box::new(SourceAdapter(source)), Default::default());
        let detected = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;

        let format = detected.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| anyhow!("No audio track"))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let decoder =
            symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

        tracing::debug!(
            uri = %uri,
            rate_hz = codec_params.sample_rate,
            channels = codec_params.channels.map(|c| c.count()),
            "symphonia track opened"
        );

        Ok(Self {
            uri,
            format,
            decoder,
            codec_params,
            track_id,
            seekable,
            sample_buf: None,
            skip_until_ts: None,
            past_end: false,
        })
    }

    /// Seconds at track timestamp `ts`.
    fn ts_to_seconds(&self, ts: u64) -> Option<f64> {
        match (self.codec_params.time_base, self.codec_params.sample_rate) {
            (Some(tb), _) => {
                let t = tb.calc_time(ts);
                Some(t.seconds as f64 + t.frac)
            }
            (None, Some(rate)) if rate > 0 => Some(ts as f64 / rate as f64),
            _ => None,
        }
    }

    /// Audio frames spanned by `delta` timestamp units.
    fn ts_to_frames(&self, delta: u64) -> usize {
        match (self.codec_params.time_base, self.codec_params.sample_rate) {
            (Some(tb), Some(rate)) if tb.denom > 0 => {
                (delta as u128 * tb.numer as u128 * rate as u128 / tb.denom as u128) as usize
            }
            _ => delta as usize,
        }
    }

    fn mark_past_end(&mut self, seconds: f64) -> SeekError {
        self.past_end = true;
        self.skip_until_ts = None;
        tracing::debug!(uri = %self.uri, requested = seconds, "seek past end");
        SeekError::Failed(format!("{seconds:.3}s is past the end of {}", self.uri))
    }
}

impl Decoder for SymphoniaDecoder {
    fn fill(&mut self, buffer: &mut Buffer) -> bool {
        if self.past_end {
            return false;
        }
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return false;
                }
                Err(e) => {
                    tracing::error!(uri = %self.uri, "read packet: {e}");
                    return false;
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let skip_frames = match self.skip_until_ts {
                Some(required) if packet.ts() < required => self.ts_to_frames(required - packet.ts()),
                _ => 0,
            };

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::warn!(uri = %self.uri, "corrupt packet skipped: {e}");
                    continue;
                }
                Err(e) => {
                    tracing::error!(uri = %self.uri, "decode: {e}");
                    return false;
                }
            };
            let frames = decoded.frames();
            if frames <= skip_frames {
                continue;
            }

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            let needed = decoded.capacity() * channels;
            let frames_cap = decoded.capacity() as u64;
            if self.sample_buf.as_ref().is_some_and(|b| b.capacity() < needed) {
                self.sample_buf = None;
            }
            let sample_buf = self
                .sample_buf
                .get_or_insert_with(|| SampleBuffer::<f32>::new(frames_cap, spec));
            sample_buf.copy_interleaved_ref(decoded);

            buffer.copy_from_slice(&sample_buf.samples()[skip_frames * channels..]);
            buffer.set_format(spec.rate, channels);
            self.skip_until_ts = None;
            return true;
        }
    }

    /// Accurate seek: lands on the packet before `seconds`, then `fill` trims the frames
    /// up to the requested time. Returns the requested time as reached.
    fn seek(&mut self, seconds: f64) -> std::result::Result<f64, SeekError> {
        if !self.seekable {
            return Err(SeekError::Unsupported);
        }
        let seconds = seconds.max(0.0);
        if self.duration_seconds().is_some_and(|d| seconds >= d) {
            return Err(self.mark_past_end(seconds));
        }

        let seeked = match self.format.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: Time::from(seconds),
                track_id: Some(self.track_id),
            },
        ) {
            Ok(s) => s,
            Err(SymphoniaError::SeekError(SeekErrorKind::Unseekable)) => {
                return Err(SeekError::Unsupported);
            }
            Err(SymphoniaError::SeekError(SeekErrorKind::OutOfRange)) => {
                return Err(self.mark_past_end(seconds));
            }
            Err(e) => return Err(SeekError::Failed(e.to_string())),
        };
        self.decoder.reset();
        self.past_end = false;
        self.skip_until_ts = (seeked.required_ts > seeked.actual_ts).then_some(seeked.required_ts);

        Ok(self.ts_to_seconds(seeked.required_ts).unwrap_or(seconds))
    }

    fn duration_seconds(&self) -> Option<f64> {
        duration_from_codec_params(&self.codec_params)
    }

    fn format(&self) -> Option<(u32, usize)> {
        let rate = self.codec_params.sample_rate?;
        let channels = self.codec_params.channels?.count();
        (rate > 0 && channels > 0).then_some((rate, channels))
    }
}

/// Best-effort duration from codec metadata.
///
/// Returns `None` if the container does not provide total frames or sample rate.
fn duration_from_codec_params(codec_params: &CodecParameters) -> Option<f64> {
    let frames = codec_params.n_frames?;
    let rate = codec_params.sample_rate?;
    if rate == 0 {
        return None;
    }
    Some(frames as f64 / rate as f64)
}
