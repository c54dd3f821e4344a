//! Device-free decode pass: pull every buffer and summarize what came out.

use std::time::Instant;

use audio_stream::{Buffer, DynamicStream};
use serde::Serialize;

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct ScanReport {
    pub uri: String,
    pub buffers: u64,
    pub samples: u64,
    pub sample_rate: u32,
    pub channels: usize,
    pub min_buffer_samples: Option<usize>,
    pub max_buffer_samples: usize,
    pub first_position: Option<f64>,
    pub last_position: f64,
    /// Buffers whose position did not move forward.
    pub non_monotonic: u64,
    pub peak: f32,
    pub duration_seconds: Option<f64>,
    pub elapsed_ms: u64,
}

impl ScanReport {
    fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            ..Self::default()
        }
    }

    /// Fold one processed buffer into the report.
    pub fn record(&mut self, buffer: &Buffer) {
        let len = buffer.len();
        self.buffers += 1;
        self.samples += len as u64;
        self.sample_rate = buffer.sample_rate();
        self.channels = buffer.channels();
        self.min_buffer_samples = Some(self.min_buffer_samples.map_or(len, |m| m.min(len)));
        self.max_buffer_samples = self.max_buffer_samples.max(len);

        let position = buffer.position();
        if self.first_position.is_none() {
            self.first_position = Some(position);
        } else if position <= self.last_position {
            self.non_monotonic += 1;
        }
        self.last_position = position;

        let peak = buffer.samples().iter().fold(0.0f32, |m, s| m.max(s.abs()));
        self.peak = self.peak.max(peak);
    }

    /// Frames the report covers at its final format.
    pub fn frames(&self) -> u64 {
        if self.channels == 0 {
            0
        } else {
            self.samples / self.channels as u64
        }
    }

    pub fn print_text(&self) {
        println!("uri:         {}", self.uri);
        println!("format:      {} Hz, {} ch", self.sample_rate, self.channels);
        println!("buffers:     {}", self.buffers);
        println!("samples:     {} ({} frames)", self.samples, self.frames());
        println!(
            "buffer size: {}..{} samples",
            self.min_buffer_samples.unwrap_or(0),
            self.max_buffer_samples
        );
        match self.first_position {
            Some(first) => println!("position:    {first:.3}s .. {:.3}s", self.last_position),
            None => println!("position:    (no audio)"),
        }
        if let Some(d) = self.duration_seconds {
            println!("duration:    {d:.3}s");
        }
        println!("peak:        {:.4}", self.peak);
        if self.non_monotonic > 0 {
            println!("warning:     {} non-monotonic positions", self.non_monotonic);
        }
        println!("elapsed:     {} ms", self.elapsed_ms);
    }
}

/// Drain `stream` to end of stream, releasing every buffer back to its pool.
pub fn run(stream: &mut DynamicStream) -> ScanReport {
    let started = Instant::now();
    let mut report = ScanReport::new(stream.uri().unwrap_or_default());
    report.duration_seconds = stream.duration_seconds();

    while let Some(buffer) = stream.pull() {
        report.record(&buffer);
        stream.release(buffer);
    }

    report.elapsed_ms = started.elapsed().as_millis() as u64;
    tracing::debug!(
        buffers = report.buffers,
        pooled = stream.pool().allocated(),
        "scan finished"
    );
    report
}
