//! DSP stages and the ordered chain that runs them.
//!
//! The chain uses two buffers regardless of its length: the current buffer and one
//! scratch buffer from the pool. A stage reads the current buffer and may write the
//! scratch; when it reports that it did, the two swap roles (ping-pong).

mod gain;
mod resample;

pub use gain::{Gain, GainFactory};
pub use resample::{ResampleDsp, ResampleFactory};

use crate::buffer::Buffer;
use crate::pool::BufferPool;

/// A single audio transformation.
pub trait Dsp: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Transform `input` into `output`.
    ///
    /// `output` arrives carrying `input`'s format and position but stale samples. Return
    /// `true` after writing a result into `output`, or `false` to pass `input` through
    /// unchanged. A stage that cannot process simply returns `false`.
    fn process(&mut self, input: &Buffer, output: &mut Buffer) -> bool;
}

/// Builds a fresh [`Dsp`] instance for each stream.
pub trait DspFactory: Send + Sync {
    fn create(&self) -> Box<dyn Dsp>;
}

/// Ordered DSP stages; stage `n`'s output feeds stage `n + 1`.
#[derive(Default)]
pub struct DspChain {
    stages: Vec<Box<dyn Dsp>>,
}

impl DspChain {
    pub fn new(stages: Vec<Box<dyn Dsp>>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in processing order.
    pub fn names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }

    /// Run `buffer` through every stage and return the final result.
    ///
    /// An empty chain returns `buffer` untouched without touching the pool. Otherwise one
    /// scratch buffer is acquired and whichever buffer ends up unused goes back to `pool`.
    pub fn process(&mut self, buffer: Buffer, pool: &BufferPool) -> Buffer {
        if self.stages.is_empty() {
            return buffer;
        }

        let mut current = buffer;
        let mut scratch = pool.acquire();

        for stage in &mut self.stages {
            scratch.copy_format(&current);
            scratch.set_position(current.position());

            if stage.process(&current, &mut scratch) {
                std::mem::swap(&mut current, &mut scratch);
            }
        }

        pool.release(scratch);
        current
    }
}
