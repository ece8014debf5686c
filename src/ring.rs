//! Lock-free MPSC staging ring
//!
//! A bounded power-of-two ring of payload slots. Producers reserve a slot
//! by CAS on the tail, then publish a payload pointer into it; the single
//! consumer advances the head and takes payloads out. Head and tail are
//! monotonic 64-bit counters masked by `len - 1` for indexing.
//!
//! The reserve-then-publish ordering is what keeps two producers from ever
//! writing into the same slot. The price is a short window where a slot is
//! reserved but still empty; the consumer spins on the slot load until the
//! pointer appears.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use bytes::BytesMut;
use crossbeam::utils::CachePadded;

use crate::pool::SlotPool;

/// Smallest ring ever created, regardless of the requested capacity
pub(crate) const MIN_CAPACITY: usize = 64;

/// Hard ceiling on ring capacity, including adaptive growth
pub(crate) const MAX_CAPACITY: usize = 16_384;

/// Entries moved from the old ring to the new one during a resize
pub(crate) const RESIZE_DRAIN_LIMIT: usize = 100;

/// One payload cell; null means empty
struct Slot {
    payload: AtomicPtr<BytesMut>,
}

/// Bounded lock-free multi-producer single-consumer byte-payload queue
pub(crate) struct RingStage {
    slots: Box<[Slot]>,
    mask: u64,
    /// Consumer position
    head: CachePadded<AtomicU64>,
    /// Producer position
    tail: CachePadded<AtomicU64>,
}

impl RingStage {
    /// Create a ring of the next power of two at or above `requested`,
    /// clamped to `[MIN_CAPACITY, MAX_CAPACITY]`
    pub(crate) fn new(requested: usize) -> Self {
        let capacity = requested
            .clamp(MIN_CAPACITY, MAX_CAPACITY)
            .next_power_of_two();
        let slots: Box<[Slot]> = (0..capacity)
            .map(|_| Slot {
                payload: AtomicPtr::new(ptr::null_mut()),
            })
            .collect();
        Self {
            mask: capacity as u64 - 1,
            slots,
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> u64 {
        self.slots.len() as u64
    }

    /// Occupied slots at this instant (tail minus head)
    #[inline]
    pub(crate) fn fill(&self) -> u64 {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        tail.saturating_sub(head).min(self.capacity())
    }

    /// Push a copy of `data`, staging it in a pooled buffer.
    /// Returns false when the ring is full.
    pub(crate) fn push(&self, data: &[u8], pool: &SlotPool) -> bool {
        loop {
            let tail = self.tail.load(Ordering::Relaxed);
            let head = self.head.load(Ordering::Acquire);
            if tail.wrapping_sub(head) >= self.capacity() {
                return false;
            }

            // Reserve the slot first; copying happens only after the CAS so
            // two producers can never target the same slot
            if self
                .tail
                .compare_exchange_weak(tail, tail + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let mut buf = pool.get(data.len());
                buf.extend_from_slice(data);
                self.publish(tail, buf);
                return true;
            }
        }
    }

    /// Push the caller's buffer without copying. On a full ring the buffer
    /// is handed back so the caller can apply its backpressure policy.
    pub(crate) fn push_owned(&self, data: BytesMut) -> Result<(), BytesMut> {
        loop {
            let tail = self.tail.load(Ordering::Relaxed);
            let head = self.head.load(Ordering::Acquire);
            if tail.wrapping_sub(head) >= self.capacity() {
                return Err(data);
            }

            if self
                .tail
                .compare_exchange_weak(tail, tail + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                self.publish(tail, data);
                return Ok(());
            }
        }
    }

    #[inline]
    fn publish(&self, seq: u64, payload: BytesMut) {
        let ptr = Box::into_raw(Box::new(payload));
        self.slots[(seq & self.mask) as usize]
            .payload
            .store(ptr, Ordering::Release);
    }

    /// Take the oldest payload. Single-consumer; the CAS retry only matters
    /// if that discipline is ever violated.
    pub(crate) fn pop(&self) -> Option<BytesMut> {
        loop {
            let head = self.head.load(Ordering::Relaxed);
            let tail = self.tail.load(Ordering::Acquire);
            if head >= tail {
                return None;
            }

            if self
                .head
                .compare_exchange_weak(head, head + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let slot = &self.slots[(head & self.mask) as usize];
                loop {
                    let ptr = slot.payload.swap(ptr::null_mut(), Ordering::AcqRel);
                    if !ptr.is_null() {
                        // Safety: the pointer came from Box::into_raw in
                        // publish() and the swap above is the only take
                        return Some(*unsafe { Box::from_raw(ptr) });
                    }
                    // Producer has reserved this slot but not published yet
                    std::hint::spin_loop();
                }
            }
        }
    }
}

impl Drop for RingStage {
    fn drop(&mut self) {
        for slot in self.slots.iter() {
            let ptr = slot.payload.swap(ptr::null_mut(), Ordering::Relaxed);
            if !ptr.is_null() {
                // Safety: unconsumed publish, sole owner at drop time
                drop(unsafe { Box::from_raw(ptr) });
            }
        }
    }
}

#[cfg(test)]
#[path = "ring_test.rs"]
mod tests;
