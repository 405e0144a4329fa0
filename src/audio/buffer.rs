//! Lock-free chunk ring for captured audio bytes
//!
//! Single-producer single-consumer queue between the audio callback and the
//! pull-based reader. The callback must never block, so a full ring drops
//! the chunk and counts the overflow instead.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Ring of raw PCM byte chunks with overflow/underrun accounting
pub struct ChunkRing {
    queue: ArrayQueue<Vec<u8>>,
    overflow_count: AtomicUsize,
    underrun_count: AtomicUsize,
}

impl ChunkRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            overflow_count: AtomicUsize::new(0),
            underrun_count: AtomicUsize::new(0),
        }
    }

    /// Push a chunk; returns false and drops it if the ring is full
    pub fn push(&self, chunk: Vec<u8>) -> bool {
        match self.queue.push(chunk) {
            Ok(()) => true,
            Err(_) => {
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Pop a chunk, counting an underrun when the ring is empty
    pub fn pop(&self) -> Option<Vec<u8>> {
        match self.queue.pop() {
            Some(chunk) => Some(chunk),
            None => {
                self.underrun_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Pop without counting an underrun
    pub fn try_pop(&self) -> Option<Vec<u8>> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }
}

/// Thread-safe handle to a chunk ring
pub type SharedChunkRing = Arc<ChunkRing>;

/// Create a new shared chunk ring
pub fn create_shared_ring(capacity: usize) -> SharedChunkRing {
    Arc::new(ChunkRing::new(capacity))
}
