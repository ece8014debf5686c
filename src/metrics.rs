//! Write-path metrics and the scale-up heuristic
//!
//! All counters are relaxed atomics updated on every write; a [`Stats`]
//! snapshot can be taken at any time without stopping writers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::BackpressurePolicy;

/// Minimum writes before the scale-up heuristic may fire; avoids thrash
/// during application startup
const SCALE_MIN_SAMPLE: u64 = 100;

/// Contention only counts once the write rate is established
const SCALE_CONTENTION_WRITES: u64 = 1_000;

/// Average latency above this suggests the filesystem is the bottleneck
const SCALE_AVG_LATENCY_NS: u64 = 1_000_000;

/// A single slow write this bad triggers reactive scaling
const SCALE_LAST_LATENCY_NS: u64 = 5_000_000;

/// Fraction of contended writes that indicates sustained competition
const SCALE_CONTENTION_RATIO: f64 = 0.10;

/// Atomic counters for the write path
#[derive(Debug, Default)]
pub(crate) struct WriteMetrics {
    /// Total write operations
    pub(crate) writes: AtomicU64,

    /// Writes that observed a rotation in progress or a full ring
    pub(crate) contentions: AtomicU64,

    /// Sum of synchronous write latencies in nanoseconds
    pub(crate) total_latency_ns: AtomicU64,

    /// Latency of the most recent synchronous write
    pub(crate) last_latency_ns: AtomicU64,

    /// Payloads discarded under the drop policy
    pub(crate) drops: AtomicU64,
}

impl WriteMetrics {
    pub(crate) const fn new() -> Self {
        Self {
            writes: AtomicU64::new(0),
            contentions: AtomicU64::new(0),
            total_latency_ns: AtomicU64::new(0),
            last_latency_ns: AtomicU64::new(0),
            drops: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_contention(&self) {
        self.contentions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_drop(&self) {
        self.drops.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_latency(&self, nanos: u64) {
        self.last_latency_ns.store(nanos, Ordering::Relaxed);
        self.total_latency_ns.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Decide whether writes should start routing through the staged path.
    ///
    /// Any one of these is enough: established contention, high average
    /// latency, a recent latency spike, or a contention ratio above 10%.
    /// The decision is one-way; once the ring exists the facade keeps
    /// using it.
    pub(crate) fn should_scale_async(&self) -> bool {
        let writes = self.writes.load(Ordering::Relaxed);
        if writes < SCALE_MIN_SAMPLE {
            return false;
        }

        let contentions = self.contentions.load(Ordering::Relaxed);
        if contentions > 0 && writes > SCALE_CONTENTION_WRITES {
            return true;
        }

        if self.total_latency_ns.load(Ordering::Relaxed) / writes > SCALE_AVG_LATENCY_NS {
            return true;
        }

        if self.last_latency_ns.load(Ordering::Relaxed) > SCALE_LAST_LATENCY_NS {
            return true;
        }

        contentions as f64 / writes as f64 > SCALE_CONTENTION_RATIO
    }
}

/// Point-in-time logger statistics for telemetry and monitoring
///
/// `total_bytes` is the current file size plus a per-rotation estimate and
/// is a monitoring hint, not an exact byte count.
#[derive(Debug, Clone)]
pub struct Stats {
    /// Total write operations
    pub write_count: u64,

    /// Approximate bytes written across the current file and rotations
    pub total_bytes: u64,

    /// Average synchronous write latency in nanoseconds
    pub avg_latency_ns: u64,

    /// Latency of the most recent synchronous write in nanoseconds
    pub last_latency_ns: u64,

    /// Writes that observed contention
    pub contention_count: u64,

    /// Contended fraction of all writes (0.0 to 1.0)
    pub contention_ratio: f64,

    /// Rotations performed so far
    pub rotation_count: u64,

    /// Bytes written to the active file since the last rotation
    pub current_file_size: u64,

    /// Ring capacity in slots; 0 when the staged path is inactive
    pub buffer_size: u64,

    /// Occupied ring slots (tail minus head)
    pub buffer_fill: u64,

    /// Whether the staged async path is active
    pub async_active: bool,

    /// Payloads discarded under the drop policy
    pub dropped_on_full: u64,

    /// Configured size threshold in bytes
    pub max_size_bytes: u64,

    /// Configured full-ring policy
    pub backpressure: BackpressurePolicy,

    /// Configured base flush interval
    pub flush_interval: Duration,
}

#[cfg(test)]
#[path = "metrics_test.rs"]
mod tests;
