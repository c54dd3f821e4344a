//! Recycling store for [`Buffer`]s.
//!
//! The pool is the only state shared between the producer (the thread pulling from a
//! [`DynamicStream`](crate::stream::DynamicStream)) and the consumer (the output callback
//! returning buffers it has played). Handles are cheap to clone; all clones share one
//! mutex-protected free list.
//!
//! Reuse order is FIFO: the oldest released buffer is handed out first.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::buffer::Buffer;

#[derive(Clone, Debug, Default)]
pub struct BufferPool {
    inner: Arc<Mutex<PoolInner>>,
}

#[derive(Debug, Default)]
struct PoolInner {
    free: VecDeque<Buffer>,
    allocated: usize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a recycled buffer, or allocate a new empty one if none is available.
    ///
    /// Recycled buffers keep their stale samples and metadata; the caller must overwrite
    /// them before reading.
    pub fn acquire(&self) -> Buffer {
        let mut g = self.lock();
        match g.free.pop_front() {
            Some(buffer) => buffer,
            None => {
                g.allocated += 1;
                Buffer::new()
            }
        }
    }

    /// Make `buffer` available to future [`BufferPool::acquire`] calls.
    ///
    /// Memory is neither cleared nor shrunk.
    pub fn release(&self, buffer: Buffer) {
        self.lock().free.push_back(buffer);
    }

    /// Buffers currently waiting for reuse.
    pub fn available(&self) -> usize {
        self.lock().free.len()
    }

    /// Total buffers this pool has allocated over its lifetime.
    pub fn allocated(&self) -> usize {
        self.lock().allocated
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        // The free list is valid after any panic mid-operation.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
