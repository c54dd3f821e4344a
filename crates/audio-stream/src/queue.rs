//! Bounded hand-off queue for processed buffers.
//!
//! A producer thread pulls from a [`DynamicStream`](crate::stream::DynamicStream) and pushes
//! here; the output callback pops without blocking. Shutdown is deterministic: `close()`
//! wakes every waiter, pushes start failing, and pops drain whatever is left.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::buffer::Buffer;

/// Thread-safe bounded FIFO of [`Buffer`]s.
///
/// The `done` flag lives under the same mutex as the queue so that close and drain can't
/// race.
pub struct BufferQueue {
    inner: Mutex<QueueInner>,
    cv: Condvar,
    max_buffers: usize,
    low_watermark_ms: AtomicU64,
}

struct QueueInner {
    queue: VecDeque<Buffer>,
    done: bool,
}

/// How [`BufferQueue::pop`] waits.
#[derive(Clone, Copy, Debug)]
pub enum PopStrategy {
    /// Block until a buffer is available; `None` once closed and drained.
    Blocking,
    /// Return immediately; `None` if currently empty.
    NonBlocking,
}

impl BufferQueue {
    pub fn new(max_buffers: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                queue: VecDeque::new(),
                done: false,
            }),
            cv: Condvar::new(),
            max_buffers: max_buffers.max(1),
            low_watermark_ms: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_buffers
    }

    /// Buffers currently queued (best-effort snapshot).
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the producer has closed the queue. It may still hold buffers.
    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    /// Mark the queue finished and wake all waiters. Idempotent.
    pub fn close(&self) {
        self.lock().done = true;
        self.cv.notify_all();
    }

    /// Push `buffer`, blocking while the queue is full.
    ///
    /// If the queue is (or becomes) closed the buffer is handed back in `Err` so the caller
    /// can return it to its pool.
    pub fn push_blocking(&self, buffer: Buffer) -> Result<(), Buffer> {
        let mut g = self.lock();
        while g.queue.len() >= self.max_buffers && !g.done {
            g = self.cv.wait(g).unwrap_or_else(|e| e.into_inner());
        }
        if g.done {
            return Err(buffer);
        }
        g.queue.push_back(buffer);
        drop(g);
        self.cv.notify_all();
        Ok(())
    }

    pub fn pop(&self, strategy: PopStrategy) -> Option<Buffer> {
        let mut g = self.lock();
        if let PopStrategy::Blocking = strategy {
            while g.queue.is_empty() && !g.done {
                g = self.cv.wait(g).unwrap_or_else(|e| e.into_inner());
            }
        }

        let buffer = g.queue.pop_front()?;
        let queued = g.queue.len();
        drop(g);
        self.cv.notify_all();
        self.log_low_watermark(queued);
        Some(buffer)
    }

    /// Block until the queue is closed and drained, or `cancel` is set.
    ///
    /// Returns `true` if the queue drained, `false` if cancelled.
    pub fn wait_until_done_and_empty_or_cancel(&self, cancel: &AtomicBool) -> bool {
        let mut g = self.lock();
        loop {
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            if g.done && g.queue.is_empty() {
                return true;
            }
            let (ng, _timeout) = self
                .cv
                .wait_timeout(g, Duration::from_millis(50))
                .unwrap_or_else(|e| e.into_inner());
            g = ng;
        }
    }

    fn log_low_watermark(&self, queued: usize) {
        let threshold = (self.max_buffers / 4).max(1);
        if queued >= threshold || self.is_done() {
            return;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_millis(0))
            .as_millis() as u64;
        let last = self.low_watermark_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) > 1000 {
            self.low_watermark_ms.store(now, Ordering::Relaxed);
            tracing::info!(
                queued_buffers = queued,
                threshold_buffers = threshold,
                "buffer queue low watermark"
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
