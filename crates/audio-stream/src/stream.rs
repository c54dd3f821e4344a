//! Pull-based decode → coalesce → DSP pipeline.
//!
//! [`DynamicStream`] is driven synchronously by one caller: each [`DynamicStream::pull`]
//! may block on decoder I/O. Latency-sensitive consumers sit behind a
//! [`BufferQueue`](crate::queue::BufferQueue) fed by a producer thread.

use std::sync::Arc;

use crate::buffer::Buffer;
use crate::config::StreamOptions;
use crate::decoder::Decoder;
use crate::dsp::DspChain;
use crate::error::{Result, StreamError};
use crate::pool::BufferPool;
use crate::position::PositionTracker;
use crate::registry::Registry;

pub struct DynamicStream {
    registry: Arc<Registry>,
    options: StreamOptions,
    decoder: Option<Box<dyn Decoder>>,
    uri: Option<String>,
    dsps: DspChain,
    pool: BufferPool,
    position: PositionTracker,
}

impl DynamicStream {
    /// Create an unopened stream. The DSP chain is built here, once, unless
    /// `options.disable_dsp` is set.
    pub fn new(registry: Arc<Registry>, options: StreamOptions) -> Self {
        let dsps = if options.disable_dsp {
            DspChain::default()
        } else {
            DspChain::new(registry.create_dsps())
        };
        if !dsps.is_empty() {
            tracing::debug!(stages = ?dsps.names(), "dsp chain");
        }

        Self {
            registry,
            options,
            decoder: None,
            uri: None,
            dsps,
            pool: BufferPool::new(),
            position: PositionTracker::new(),
        }
    }

    /// Open `uri`: resolve a data source, then a decoder for it.
    ///
    /// Any previously opened source is released first. On failure the stream is left
    /// unopened and `open` may be retried.
    pub fn open(&mut self, uri: &str) -> Result<()> {
        self.close();
        tracing::info!(uri = %uri, "opening");

        let source = self.registry.open_uri(uri).inspect_err(|e| {
            tracing::error!("{e}");
        })?;
        let decoder = self.registry.decoder_for(source).inspect_err(|e| {
            tracing::error!("{e}");
        })?;

        self.decoder = Some(decoder);
        self.uri = Some(uri.to_string());
        Ok(())
    }

    /// Release the decoder and its data source. Buffers already handed out stay valid.
    pub fn close(&mut self) {
        if let Some(uri) = self.uri.take() {
            tracing::debug!(uri = %uri, "closing");
        }
        self.decoder = None;
        self.position.reset();
    }

    pub fn is_open(&self) -> bool {
        self.decoder.is_some()
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Seek to `seconds`; returns the time the decoder actually reached.
    ///
    /// On failure the position counter is left untouched. Before the first pull the
    /// counter is rebuilt from the decoder's reported format, or from the first decoded
    /// buffer if the decoder cannot say.
    pub fn seek(&mut self, seconds: f64) -> Result<f64> {
        let decoder = self.decoder.as_mut().ok_or(StreamError::NotOpen)?;
        match decoder.seek(seconds) {
            Ok(actual) => {
                if self.position.sample_rate() == 0 {
                    if let Some((rate, channels)) = decoder.format() {
                        self.position.set_format(rate, channels);
                    }
                }
                self.position.seek_to(actual);
                tracing::debug!(requested = seconds, actual, "seek");
                Ok(actual)
            }
            Err(e) => {
                tracing::warn!(requested = seconds, "seek failed: {e}");
                Err(e.into())
            }
        }
    }

    /// Next processed buffer, or `None` at end of stream (or when not open).
    ///
    /// Small decoder outputs are coalesced until the buffer holds at least
    /// `preferred_buffer_samples` samples or the decoder runs dry, then the result runs
    /// through the DSP chain. The caller owns the returned buffer and should hand it back
    /// via [`DynamicStream::release`] or a clone of [`DynamicStream::pool`].
    pub fn pull(&mut self) -> Option<Buffer> {
        let mut current = self.next_decoded()?;

        while current.len() < self.options.preferred_buffer_samples {
            let Some(next) = self.next_decoded() else {
                break;
            };
            current.append(next.samples());
            current.set_position(next.position());
            self.pool.release(next);
        }

        Some(self.dsps.process(current, &self.pool))
    }

    /// Return a consumed buffer for reuse.
    pub fn release(&self, buffer: Buffer) {
        self.pool.release(buffer);
    }

    /// Shared handle to this stream's buffer pool, for consumers on other threads.
    pub fn pool(&self) -> BufferPool {
        self.pool.clone()
    }

    /// Interleaved samples consumed from the decoder so far.
    pub fn sample_position(&self) -> u64 {
        self.position.sample_position()
    }

    /// Position in seconds of the end of the most recently decoded buffer.
    pub fn position_seconds(&self) -> f64 {
        self.position.seconds()
    }

    /// Sample rate of the most recently decoded buffer (zero before the first).
    pub fn sample_rate(&self) -> u32 {
        self.position.sample_rate()
    }

    pub fn channels(&self) -> usize {
        self.position.channels()
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.decoder.as_ref().and_then(|d| d.duration_seconds())
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    pub fn dsp_count(&self) -> usize {
        self.dsps.len()
    }

    /// One raw decoder buffer, stamped with the time at which it ends.
    fn next_decoded(&mut self) -> Option<Buffer> {
        let decoder = self.decoder.as_mut()?;
        let mut buffer = self.pool.acquire();
        if !decoder.fill(&mut buffer) {
            self.pool.release(buffer);
            return None;
        }

        // advance first, then stamp: the position marks the end of this buffer
        let end = self
            .position
            .advance(buffer.sample_rate(), buffer.channels(), buffer.len());
        buffer.set_position(end);
        Some(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{self, Cursor, Read, Seek, SeekFrom};
    use std::sync::Mutex;

    use crate::decoder::DecoderFactory;
    use crate::dsp::tests::{AddConst, Passthrough};
    use crate::dsp::{Dsp, DspFactory};
    use crate::error::SeekError;
    use crate::source::{DataSource, DataSourceFactory};

    /// Decoder that replays scripted buffer sizes; sample values count up from 0.
    struct ScriptedDecoder {
        sizes: VecDeque<usize>,
        rate: u32,
        channels: usize,
        next_value: f32,
        total_samples: usize,
        seekable: bool,
        announce_format: bool,
    }

    impl Decoder for ScriptedDecoder {
        fn fill(&mut self, buffer: &mut Buffer) -> bool {
            let Some(n) = self.sizes.pop_front() else {
                return false;
            };
            let start = self.next_value;
            let samples: Vec<f32> = (0..n).map(|i| start + i as f32).collect();
            self.next_value += n as f32;
            buffer.set_format(self.rate, self.channels);
            buffer.copy_from_slice(&samples);
            true
        }

        fn seek(&mut self, seconds: f64) -> std::result::Result<f64, SeekError> {
            if !self.seekable {
                return Err(SeekError::Unsupported);
            }
            let target = (seconds * self.rate as f64).round() as usize * self.channels;
            if target >= self.total_samples {
                self.sizes.clear();
                return Err(SeekError::Failed("past end".to_string()));
            }
            Ok(seconds)
        }

        fn duration_seconds(&self) -> Option<f64> {
            Some((self.total_samples / self.channels) as f64 / self.rate as f64)
        }

        fn format(&self) -> Option<(u32, usize)> {
            self.announce_format.then_some((self.rate, self.channels))
        }
    }

    struct MemSource(String, Cursor<Vec<u8>>);

    impl Read for MemSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.1.read(buf)
        }
    }

    impl Seek for MemSource {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.1.seek(pos)
        }
    }

    impl DataSource for MemSource {
        fn uri(&self) -> &str {
            &self.0
        }
    }

    /// Serves `mem://` URIs; `mem://missing` fails to open.
    struct MemSourceFactory;

    impl DataSourceFactory for MemSourceFactory {
        fn can_open(&self, uri: &str) -> bool {
            uri.starts_with("mem://")
        }

        fn open(&self, uri: &str) -> anyhow::Result<Box<dyn DataSource>> {
            if uri == "mem://missing" {
                anyhow::bail!("no such entry");
            }
            Ok(Box::new(MemSource(uri.to_string(), Cursor::new(Vec::new()))))
        }
    }

    /// Claims `.raw` sources and hands out decoders with the configured script.
    struct ScriptedFactory {
        sizes: Vec<usize>,
        rate: u32,
        channels: usize,
        seekable: bool,
        announce_format: bool,
    }

    impl DecoderFactory for ScriptedFactory {
        fn name(&self) -> &str {
            "scripted"
        }

        fn can_handle(&self, source: &dyn DataSource) -> bool {
            source.extension().as_deref() == Some("raw")
        }

        fn open(&self, _source: Box<dyn DataSource>) -> anyhow::Result<Box<dyn Decoder>> {
            Ok(Box::new(ScriptedDecoder {
                sizes: self.sizes.iter().copied().collect(),
                rate: self.rate,
                channels: self.channels,
                next_value: 0.0,
                total_samples: self.sizes.iter().sum(),
                seekable: self.seekable,
                announce_format: self.announce_format,
            }))
        }
    }

    struct StageFactory<F: Fn() -> Box<dyn Dsp> + Send + Sync>(F);

    impl<F: Fn() -> Box<dyn Dsp> + Send + Sync> DspFactory for StageFactory<F> {
        fn create(&self) -> Box<dyn Dsp> {
            (self.0)()
        }
    }

    fn registry(sizes: &[usize], rate: u32, channels: usize) -> Registry {
        Registry::new()
            .with_data_source(MemSourceFactory)
            .with_decoder(ScriptedFactory {
                sizes: sizes.to_vec(),
                rate,
                channels,
                seekable: true,
                announce_format: false,
            })
    }

    fn open_stream(registry: Registry, options: StreamOptions) -> DynamicStream {
        let mut stream = DynamicStream::new(Arc::new(registry), options);
        stream.open("mem://track.raw").unwrap();
        stream
    }

    fn preferred(samples: usize) -> StreamOptions {
        StreamOptions {
            preferred_buffer_samples: samples,
            ..StreamOptions::default()
        }
    }

    #[test]
    fn coalesces_until_threshold_then_ends() {
        let mut stream = open_stream(registry(&[1000, 1000, 1000], 44_100, 2), preferred(2048));

        let first = stream.pull().unwrap();
        assert_eq!(first.len(), 3000);
        assert!(stream.pull().is_none());
    }

    #[test]
    fn stops_coalescing_once_threshold_met() {
        let mut stream = open_stream(registry(&[1000, 1000, 1000, 1000], 44_100, 2), preferred(2000));

        assert_eq!(stream.pull().unwrap().len(), 2000);
        assert_eq!(stream.pull().unwrap().len(), 2000);
        assert!(stream.pull().is_none());
    }

    #[test]
    fn short_final_buffer_is_delivered() {
        let mut stream = open_stream(registry(&[4096, 100, 60], 48_000, 2), preferred(4096));

        assert_eq!(stream.pull().unwrap().len(), 4096);
        assert_eq!(stream.pull().unwrap().len(), 160);
        assert!(stream.pull().is_none());
    }

    #[test]
    fn coalesced_samples_are_concatenated_in_order() {
        let mut stream = open_stream(registry(&[4, 4, 4], 8_000, 2), preferred(12));
        let out = stream.pull().unwrap();
        let expected: Vec<f32> = (0..12).map(|v| v as f32).collect();
        assert_eq!(out.samples(), expected.as_slice());
    }

    #[test]
    fn position_marks_end_of_buffer() {
        let mut stream = open_stream(registry(&[96_000, 48_000], 48_000, 2), preferred(1));

        let first = stream.pull().unwrap();
        assert_eq!(first.position(), 1.0);
        let second = stream.pull().unwrap();
        assert_eq!(second.position(), 1.5);

        let back = second.position() * 48_000.0 * 2.0;
        assert!((back - stream.sample_position() as f64).abs() < 1e-6);
    }

    #[test]
    fn coalesced_position_is_last_appended_buffer() {
        let mut stream = open_stream(registry(&[1000, 1000, 1000], 1_000, 2), preferred(2048));
        let out = stream.pull().unwrap();
        assert_eq!(out.position(), 1.5);
        assert_eq!(stream.sample_position(), 3000);
    }

    #[test]
    fn recycled_buffers_are_reused() {
        let mut stream = open_stream(registry(&[512; 32], 48_000, 2), preferred(512));

        let first = stream.pull().unwrap();
        stream.release(first);
        let allocated = stream.pool().allocated();

        for _ in 0..10 {
            let buf = stream.pull().unwrap();
            stream.release(buf);
        }
        assert_eq!(stream.pool().allocated(), allocated);
    }

    #[test]
    fn end_of_stream_returns_acquired_buffer_to_pool() {
        let mut stream = open_stream(registry(&[10], 48_000, 2), preferred(4096));
        let buf = stream.pull().unwrap();
        assert!(stream.pull().is_none());
        // the buffer acquired for the failed fill went back
        assert_eq!(stream.pool().available(), stream.pool().allocated() - 1);
        stream.release(buf);
    }

    #[test]
    fn no_dsp_output_equals_raw() {
        let mut stream = open_stream(registry(&[6, 6], 8_000, 2), preferred(12));
        let out = stream.pull().unwrap();
        let expected: Vec<f32> = (0..12).map(|v| v as f32).collect();
        assert_eq!(out.samples(), expected.as_slice());
        assert_eq!(stream.dsp_count(), 0);
    }

    #[test]
    fn unhandled_dsp_leaves_buffer_untouched() {
        let reg = registry(&[6, 6], 8_000, 2)
            .with_dsp(StageFactory(|| Box::new(Passthrough) as Box<dyn Dsp>));
        let mut stream = open_stream(reg, preferred(12));
        let out = stream.pull().unwrap();

        let expected: Vec<f32> = (0..12).map(|v| v as f32).collect();
        assert_eq!(out.samples(), expected.as_slice());
        assert_eq!(out.sample_rate(), 8_000);
        assert_eq!(out.channels(), 2);
        assert_eq!(out.position(), 12.0 / 2.0 / 8_000.0);
    }

    #[test]
    fn dsp_chain_runs_in_order() {
        let reg = registry(&[2], 8_000, 2)
            .with_dsp(StageFactory(|| Box::new(AddConst(1.0)) as Box<dyn Dsp>))
            .with_dsp(StageFactory(|| Box::new(AddConst(10.0)) as Box<dyn Dsp>));
        let mut stream = open_stream(reg, preferred(2));
        assert_eq!(stream.pull().unwrap().samples(), &[11.0, 12.0]);
    }

    #[test]
    fn disable_dsp_skips_chain() {
        let reg = registry(&[2], 8_000, 2)
            .with_dsp(StageFactory(|| Box::new(AddConst(1.0)) as Box<dyn Dsp>));
        let options = StreamOptions {
            disable_dsp: true,
            preferred_buffer_samples: 2,
        };
        let mut stream = open_stream(reg, options);
        assert_eq!(stream.dsp_count(), 0);
        assert_eq!(stream.pull().unwrap().samples(), &[0.0, 1.0]);
    }

    #[test]
    fn dsp_stages_are_created_once_per_stream() {
        let created = Arc::new(Mutex::new(0usize));
        let counter = created.clone();
        let reg = registry(&[2, 2, 2], 8_000, 2).with_dsp(StageFactory(move || {
            *counter.lock().unwrap() += 1;
            Box::new(Passthrough) as Box<dyn Dsp>
        }));
        let mut stream = open_stream(reg, preferred(2));
        while let Some(buf) = stream.pull() {
            stream.release(buf);
        }
        assert_eq!(*created.lock().unwrap(), 1);
    }

    #[test]
    fn seek_recomputes_sample_counter() {
        let mut stream = open_stream(registry(&[100; 10], 100, 2), preferred(1));
        let _ = stream.pull().unwrap();

        let actual = stream.seek(2.0).unwrap();
        assert_eq!(actual, 2.0);
        assert_eq!(stream.sample_position(), 400);

        let next = stream.pull().unwrap();
        assert_eq!(next.position(), 2.5);
    }

    #[test]
    fn seek_before_first_pull_offsets_positions() {
        let mut stream = open_stream(registry(&[100; 10], 100, 2), preferred(1));
        assert_eq!(stream.seek(2.0).unwrap(), 2.0);

        let first = stream.pull().unwrap();
        assert_eq!(first.position(), 2.5);
        assert_eq!(stream.sample_position(), 500);
    }

    #[test]
    fn seek_before_first_pull_uses_decoder_format() {
        let reg = Registry::new()
            .with_data_source(MemSourceFactory)
            .with_decoder(ScriptedFactory {
                sizes: vec![100; 10],
                rate: 100,
                channels: 2,
                seekable: true,
                announce_format: true,
            });
        let mut stream = open_stream(reg, preferred(1));
        stream.seek(1.5).unwrap();
        assert_eq!(stream.sample_position(), 300);
        assert_eq!(stream.position_seconds(), 1.5);
        assert_eq!(stream.pull().unwrap().position(), 2.0);
    }

    #[test]
    fn failed_seek_leaves_counter_and_next_pull_ends_past_end() {
        let mut stream = open_stream(registry(&[100, 100], 100, 2), preferred(1));
        let _ = stream.pull().unwrap();
        let before = stream.sample_position();

        let err = stream.seek(60.0).unwrap_err();
        assert!(matches!(err, StreamError::SeekFailed(_)));
        assert_eq!(stream.sample_position(), before);
        assert!(stream.pull().is_none());
    }

    #[test]
    fn unsupported_seek_is_reported() {
        let reg = Registry::new()
            .with_data_source(MemSourceFactory)
            .with_decoder(ScriptedFactory {
                sizes: vec![10],
                rate: 100,
                channels: 1,
                seekable: false,
                announce_format: false,
            });
        let mut stream = open_stream(reg, preferred(1));
        assert!(matches!(stream.seek(1.0), Err(StreamError::SeekUnsupported)));
    }

    #[test]
    fn seek_before_open_is_not_open() {
        let mut stream = DynamicStream::new(Arc::new(Registry::new()), StreamOptions::default());
        assert!(matches!(stream.seek(1.0), Err(StreamError::NotOpen)));
        assert!(stream.pull().is_none());
    }

    #[test]
    fn open_failure_leaves_stream_unopened() {
        let mut stream = DynamicStream::new(Arc::new(registry(&[10], 100, 1)), preferred(1));

        let err = stream.open("mem://missing").unwrap_err();
        assert!(matches!(err, StreamError::Open { .. }));
        assert!(!stream.is_open());

        let err = stream.open("mem://notes.txt").unwrap_err();
        assert!(matches!(err, StreamError::NoDecoder { .. }));
        assert!(!stream.is_open());
        assert!(stream.uri().is_none());

        stream.open("mem://track.raw").unwrap();
        assert!(stream.is_open());
        assert_eq!(stream.uri(), Some("mem://track.raw"));
    }

    #[test]
    fn failed_reopen_releases_previous_decoder() {
        let mut stream = open_stream(registry(&[10, 10], 100, 1), preferred(1));
        let _ = stream.pull().unwrap();

        assert!(stream.open("mem://missing").is_err());
        assert!(!stream.is_open());
        assert_eq!(stream.sample_position(), 0);
        assert!(stream.pull().is_none());
    }

    #[test]
    fn close_keeps_handed_out_buffers_valid() {
        let mut stream = open_stream(registry(&[4], 100, 2), preferred(4));
        let buf = stream.pull().unwrap();
        stream.close();
        assert!(!stream.is_open());
        assert_eq!(buf.samples(), &[0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn format_follows_latest_buffer() {
        let mut stream = open_stream(registry(&[4], 22_050, 2), preferred(4));
        assert_eq!(stream.sample_rate(), 0);
        let _ = stream.pull().unwrap();
        assert_eq!(stream.sample_rate(), 22_050);
        assert_eq!(stream.channels(), 2);
        assert_eq!(stream.duration_seconds(), Some(2.0 / 22_050.0));
    }
}
