//! Background thread that feeds a [`BufferQueue`] from a [`DynamicStream`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crate::queue::BufferQueue;
use crate::stream::DynamicStream;

/// What the producer did before it stopped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProducerStats {
    pub buffers: u64,
    pub samples: u64,
    /// Position of the last buffer handed to the queue.
    pub last_position: f64,
    /// Stopped because of `cancel` or a closed queue rather than end of stream.
    pub interrupted: bool,
}

/// Pull processed buffers from `stream` into `queue` until end of stream.
///
/// The queue is closed when the thread exits, whatever the reason. Buffers the queue
/// refuses go straight back to the stream's pool. The stream is dropped with the thread,
/// releasing its decoder.
pub fn spawn_producer(
    mut stream: DynamicStream,
    queue: Arc<BufferQueue>,
    cancel: Arc<AtomicBool>,
) -> JoinHandle<ProducerStats> {
    thread::spawn(move || {
        let mut stats = ProducerStats::default();
        let pool = stream.pool();

        loop {
            if cancel.load(Ordering::Relaxed) {
                stats.interrupted = true;
                break;
            }
            let Some(buffer) = stream.pull() else {
                break;
            };

            let samples = buffer.len() as u64;
            let position = buffer.position();
            if let Err(rejected) = queue.push_blocking(buffer) {
                pool.release(rejected);
                stats.interrupted = true;
                break;
            }
            stats.buffers += 1;
            stats.samples += samples;
            stats.last_position = position;
        }

        queue.close();
        tracing::debug!(
            buffers = stats.buffers,
            samples = stats.samples,
            interrupted = stats.interrupted,
            "producer finished"
        );
        stats
    })
}
