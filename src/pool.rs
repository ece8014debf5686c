//! Lock-free pool of reusable payload buffers
//!
//! Staged writes copy caller bytes into a pooled `BytesMut` so the caller's
//! slice can be released immediately. The pool is a fixed-size lock-free
//! queue; when it runs dry a fresh buffer is allocated, and buffers whose
//! capacity no longer matches the pool are dropped instead of returned.
//! Payloads larger than a slot bypass the pool entirely.

use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of buffers pre-allocated per pool
pub(crate) const DEFAULT_POOL_SLOTS: usize = 128;

/// Capacity of each pooled buffer; payloads above this allocate directly
pub(crate) const DEFAULT_SLOT_CAPACITY: usize = 1024;

/// Counters for pool effectiveness
#[derive(Debug, Default)]
pub(crate) struct PoolMetrics {
    /// Buffer reused from the pool
    pub(crate) hits: AtomicU64,

    /// Fresh allocation (pool empty or payload oversize)
    pub(crate) misses: AtomicU64,

    /// Buffer accepted back into the pool
    pub(crate) returns: AtomicU64,

    /// Buffer released to the allocator (pool full or wrong capacity)
    pub(crate) drops: AtomicU64,
}

/// Bounded free-list of fixed-capacity `BytesMut` buffers
pub(crate) struct SlotPool {
    queue: ArrayQueue<BytesMut>,
    slot_capacity: usize,
    metrics: PoolMetrics,
}

impl SlotPool {
    /// Create a pool of `slots` buffers, each `slot_capacity` bytes
    pub(crate) fn new(slots: usize, slot_capacity: usize) -> Self {
        let queue = ArrayQueue::new(slots.max(1));
        for _ in 0..slots {
            let _ = queue.push(BytesMut::with_capacity(slot_capacity));
        }
        Self {
            queue,
            slot_capacity,
            metrics: PoolMetrics::default(),
        }
    }

    /// Get an empty buffer able to hold `len` bytes
    #[inline]
    pub(crate) fn get(&self, len: usize) -> BytesMut {
        if len <= self.slot_capacity {
            if let Some(buf) = self.queue.pop() {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                return buf;
            }
            self.metrics.misses.fetch_add(1, Ordering::Relaxed);
            // Allocate at slot capacity so the buffer is poolable later
            return BytesMut::with_capacity(self.slot_capacity);
        }

        // Oversize payload, never pooled
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        BytesMut::with_capacity(len)
    }

    /// Return a buffer; only exact-capacity buffers are kept
    #[inline]
    pub(crate) fn put(&self, mut buf: BytesMut) {
        buf.clear();
        if buf.capacity() != self.slot_capacity {
            self.metrics.drops.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match self.queue.push(buf) {
            Ok(()) => {
                self.metrics.returns.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.metrics.drops.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Buffers currently available
    #[inline]
    pub(crate) fn available(&self) -> usize {
        self.queue.len()
    }

    /// Capacity of each pooled buffer
    #[inline]
    pub(crate) fn slot_capacity(&self) -> usize {
        self.slot_capacity
    }

    #[inline]
    pub(crate) fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }
}

#[cfg(test)]
#[path = "pool_test.rs"]
mod tests;
