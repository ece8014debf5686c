//! The public writer facade
//!
//! [`Logger`] accepts byte payloads from any number of threads and lands
//! them in the active file, rotating on size and age thresholds. Writes
//! either go straight to the file (sync path) or through the lock-free
//! staging ring (async path); unless async is forced, the facade watches
//! its own latency and contention metrics and scales up when the sync path
//! degrades.

use std::io::{self, Write as IoWrite};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use bytes::BytesMut;
use tokio::runtime::Handle;

use crate::active_file::ActiveFile;
use crate::background::{BackgroundWorkers, TaskContext};
use crate::config::{BackpressurePolicy, LoggerConfig, Settings};
use crate::consumer::{self, DrainHandle};
use crate::error::{Error, Result};
use crate::metrics::{Stats, WriteMetrics};
use crate::pool::{SlotPool, DEFAULT_POOL_SLOTS, DEFAULT_SLOT_CAPACITY};
use crate::ring::{RingStage, MAX_CAPACITY, RESIZE_DRAIN_LIMIT};
use crate::rotation;

/// Shared runtime state behind the facade; the consumer task and the
/// background pool hold their own references to it
pub(crate) struct Core {
    pub(crate) settings: Settings,
    pub(crate) active: ActiveFile,
    pub(crate) ring: ArcSwapOption<RingStage>,
    pub(crate) pool: SlotPool,
    pub(crate) metrics: WriteMetrics,
    pub(crate) rotating: AtomicBool,
    pub(crate) consumer: OnceLock<DrainHandle>,
    pub(crate) workers: OnceLock<Arc<BackgroundWorkers>>,
    runtime: OnceLock<Handle>,
    runtime_warned: AtomicBool,
    closed: AtomicBool,
}

impl Core {
    /// Forward a non-fatal error to the configured sink, if any
    pub(crate) fn report(&self, operation: &'static str, error: &Error) {
        if let Some(sink) = &self.settings.error_sink {
            sink.report(operation, error);
        }
    }

    /// Runtime to spawn tasks on: the one captured at construction, else
    /// whichever runtime the calling thread is inside right now
    pub(crate) fn runtime_handle(&self) -> Option<Handle> {
        if let Some(handle) = self.runtime.get() {
            return Some(handle.clone());
        }
        match Handle::try_current() {
            Ok(handle) => {
                let _ = self.runtime.set(handle.clone());
                Some(handle)
            }
            Err(_) => None,
        }
    }

    fn warn_no_runtime(&self) {
        if !self.runtime_warned.swap(true, Ordering::Relaxed) {
            let err = Error::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                "no tokio runtime available; staged writes and background tasks are disabled",
            ));
            tracing::warn!("no tokio runtime reachable, continuing on the sync path");
            self.report("background_spawn", &err);
        }
    }

    /// Worker pool for rotated-file finalization, created on first use.
    /// Returns `None` when no runtime can host the workers.
    pub(crate) fn background_workers(&self) -> Option<Arc<BackgroundWorkers>> {
        if let Some(workers) = self.workers.get() {
            return Some(Arc::clone(workers));
        }
        let runtime = match self.runtime_handle() {
            Some(handle) => handle,
            None => {
                self.warn_no_runtime();
                return None;
            }
        };
        // Rotation runs only after lazy init, so the path is set by now
        let primary_path = self.active.path()?.clone();

        let workers = self.workers.get_or_init(|| {
            let ctx = TaskContext {
                primary_path,
                max_backups: self.settings.max_backups,
                max_file_age: self.settings.max_file_age,
                retry: self.settings.retry,
                error_sink: self.settings.error_sink.clone(),
            };
            BackgroundWorkers::spawn(&runtime, Arc::new(ctx))
        });
        Some(Arc::clone(workers))
    }

    /// Rotation-aware file write shared by the sync path and the consumer:
    /// rotate first if the file has aged out, append, then rotate if the
    /// size threshold was crossed.
    pub(crate) fn write_direct(&self, data: &[u8]) -> Result<usize> {
        if rotation::age_exceeded(self) {
            rotation::trigger_rotation(self);
        }

        let file = self.active.ensure_open(&self.settings)?;
        (&*file).write_all(data)?;

        let new_size = self.active.add_bytes(data.len() as u64);
        if rotation::size_exceeded(&self.settings, new_size) {
            rotation::trigger_rotation(self);
        }

        Ok(data.len())
    }
}

/// Rotating file sink for log bytes
///
/// Thread-safe by design: all methods take `&self` and any number of
/// threads may write concurrently. Create one with [`Logger::new`] and
/// shut it down with [`Logger::close`].
///
/// # Example
///
/// ```no_run
/// use logroll::{Logger, LoggerConfig};
///
/// # async fn demo() -> logroll::Result<()> {
/// let logger = Logger::new(
///     LoggerConfig::new("app.log")
///         .with_max_size("100MB")
///         .with_max_backups(3)
///         .with_compress(true),
/// )?;
///
/// logger.write(b"application started\n")?;
/// logger.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Logger {
    core: Arc<Core>,
}

impl Logger {
    /// Validate the configuration and create a logger. The file itself is
    /// opened lazily on first write.
    pub fn new(config: LoggerConfig) -> Result<Self> {
        let settings = config.resolve()?;
        let core = Arc::new(Core {
            settings,
            active: ActiveFile::new(),
            ring: ArcSwapOption::const_empty(),
            pool: SlotPool::new(DEFAULT_POOL_SLOTS, DEFAULT_SLOT_CAPACITY),
            metrics: WriteMetrics::new(),
            rotating: AtomicBool::new(false),
            consumer: OnceLock::new(),
            workers: OnceLock::new(),
            runtime: OnceLock::new(),
            runtime_warned: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        if let Ok(handle) = Handle::try_current() {
            let _ = core.runtime.set(handle);
        }
        Ok(Self { core })
    }

    /// Write `data` to the log. On success exactly `data.len()` bytes are
    /// accounted for; the payload is never split across a rotation.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        if self.core.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        // The sample that powers the scale-up decision
        self.core.metrics.record_write();

        if self.use_async_path() {
            self.write_async(data)
        } else {
            self.write_sync(data)
        }
    }

    /// Write a buffer the caller gives up. On the staged path this skips
    /// the defensive copy; on the sync path it behaves exactly like
    /// [`write`](Self::write).
    pub fn write_owned(&self, data: BytesMut) -> Result<usize> {
        if self.core.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        self.core.metrics.record_write();

        if self.use_async_path() {
            self.write_async_owned(data)
        } else {
            let len = data.len();
            self.write_sync(&data)?;
            Ok(len)
        }
    }

    /// Force one rotation attempt. Returns Ok immediately when a rotation
    /// is already in flight.
    pub fn rotate(&self) -> Result<()> {
        if self.core.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        rotation::rotate_now(&self.core)
    }

    /// Snapshot of all counters plus the ring state and configuration echo
    pub fn stats(&self) -> Stats {
        let core = &self.core;
        let metrics = &core.metrics;

        let writes = metrics.writes.load(Ordering::Relaxed);
        let contentions = metrics.contentions.load(Ordering::Relaxed);
        let total_latency = metrics.total_latency_ns.load(Ordering::Relaxed);

        let (buffer_size, buffer_fill, async_active) = match &*core.ring.load() {
            Some(ring) => (ring.capacity(), ring.fill(), true),
            None => (0, 0, false),
        };

        let rotation_count = core.active.rotation_seq();
        let current_file_size = core.active.bytes();
        // Rough running total; rotated files are estimated at the size cap
        let total_bytes = current_file_size + rotation_count * core.settings.max_size_bytes;

        Stats {
            write_count: writes,
            total_bytes,
            avg_latency_ns: if writes > 0 { total_latency / writes } else { 0 },
            last_latency_ns: metrics.last_latency_ns.load(Ordering::Relaxed),
            contention_count: contentions,
            contention_ratio: if writes > 0 {
                contentions as f64 / writes as f64
            } else {
                0.0
            },
            rotation_count,
            current_file_size,
            buffer_size,
            buffer_fill,
            async_active,
            dropped_on_full: metrics.drops.load(Ordering::Relaxed),
            max_size_bytes: core.settings.max_size_bytes,
            backpressure: core.settings.backpressure,
            flush_interval: core.settings.flush_interval,
        }
    }

    /// Block until the background pipeline is quiescent. Meant for tests
    /// that need compression, checksums or retention to have finished.
    pub async fn wait_for_background_tasks(&self) {
        if let Some(workers) = self.core.workers.get() {
            while workers.pending() > 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
    }

    /// Shut down: drain the consumer, stop the background workers, release
    /// the file. Idempotent; later calls are no-ops.
    pub async fn close(&self) -> Result<()> {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(handle) = self.core.consumer.get() {
            handle.stop().await;
        }
        if let Some(workers) = self.core.workers.get() {
            workers.stop().await;
        }

        if let Some(file) = self.core.active.clear() {
            if let Err(err) = file.sync_all() {
                self.core.report("close_sync", &Error::Io(err));
            }
        }

        tracing::debug!("logger closed");
        Ok(())
    }

    /// Whether this write should use the staged path: forced async, a ring
    /// that already exists, or metrics that say the sync path is degrading
    fn use_async_path(&self) -> bool {
        self.core.settings.async_mode
            || self.core.ring.load().is_some()
            || self.core.metrics.should_scale_async()
    }

    fn write_sync(&self, data: &[u8]) -> Result<usize> {
        let core = &self.core;
        let start = Instant::now();

        // A rotation in flight is the contention signal, not a blocker
        if core.rotating.load(Ordering::Acquire) {
            core.metrics.record_contention();
        }

        let result = core.write_direct(data);
        core.metrics
            .record_latency(start.elapsed().as_nanos() as u64);
        result
    }

    fn write_async(&self, data: &[u8]) -> Result<usize> {
        let Some(ring) = self.ensure_ring() else {
            // Ring or runtime unavailable, degrade gracefully
            return self.write_sync(data);
        };

        if ring.push(data, &self.core.pool) {
            return Ok(data.len());
        }

        self.core.metrics.record_contention();
        match self.core.settings.backpressure {
            BackpressurePolicy::Drop => {
                self.core.metrics.record_drop();
                Ok(data.len())
            }
            BackpressurePolicy::Adaptive => {
                if let Some(resized) = self.try_adaptive_resize(&ring) {
                    if resized.push(data, &self.core.pool) {
                        return Ok(data.len());
                    }
                }
                self.write_sync(data)
            }
            BackpressurePolicy::Fallback => self.write_sync(data),
        }
    }

    fn write_async_owned(&self, data: BytesMut) -> Result<usize> {
        let len = data.len();
        let Some(ring) = self.ensure_ring() else {
            self.write_sync(&data)?;
            return Ok(len);
        };

        let data = match ring.push_owned(data) {
            Ok(()) => return Ok(len),
            Err(data) => data,
        };

        self.core.metrics.record_contention();
        match self.core.settings.backpressure {
            BackpressurePolicy::Drop => {
                self.core.metrics.record_drop();
                Ok(len)
            }
            BackpressurePolicy::Adaptive => {
                let data = if let Some(resized) = self.try_adaptive_resize(&ring) {
                    match resized.push_owned(data) {
                        Ok(()) => return Ok(len),
                        Err(data) => data,
                    }
                } else {
                    data
                };
                self.write_sync(&data)?;
                Ok(len)
            }
            BackpressurePolicy::Fallback => {
                self.write_sync(&data)?;
                Ok(len)
            }
        }
    }

    /// Current ring, initializing the ring and the consumer task on first
    /// use. `None` means the staged path cannot run and the caller should
    /// fall back to sync.
    fn ensure_ring(&self) -> Option<Arc<RingStage>> {
        let core = &self.core;
        if let Some(ring) = core.ring.load_full() {
            return Some(ring);
        }

        // Open the file first so open errors surface from the sync path
        // instead of dying inside the consumer
        if core.active.ensure_open(&core.settings).is_err() {
            return None;
        }
        let runtime = match core.runtime_handle() {
            Some(handle) => handle,
            None => {
                core.warn_no_runtime();
                return None;
            }
        };

        let fresh = Arc::new(RingStage::new(core.settings.buffer_size));
        let previous = core
            .ring
            .compare_and_swap(std::ptr::null::<RingStage>(), Some(Arc::clone(&fresh)));
        if previous.is_none() {
            // We won the init race; losers use the ring we just installed
            core.consumer
                .get_or_init(|| consumer::spawn(&runtime, Arc::clone(core)));
        }

        core.ring.load_full()
    }

    /// Grow the ring once under pressure: double the capacity, carry over a
    /// bounded number of staged entries, swap the pointer. Loses the race
    /// gracefully if another producer resized first.
    fn try_adaptive_resize(&self, current: &Arc<RingStage>) -> Option<Arc<RingStage>> {
        if current.capacity() >= MAX_CAPACITY as u64 {
            return None;
        }

        let doubled = Arc::new(RingStage::new(current.capacity() as usize * 2));
        let mut moved = 0;
        while moved < RESIZE_DRAIN_LIMIT {
            match current.pop() {
                Some(payload) => {
                    if doubled.push_owned(payload).is_err() {
                        return None;
                    }
                    moved += 1;
                }
                None => break,
            }
        }

        let previous = self
            .core
            .ring
            .compare_and_swap(current, Some(Arc::clone(&doubled)));
        let swapped = previous
            .as_ref()
            .is_some_and(|prev| Arc::ptr_eq(prev, current));
        if swapped {
            tracing::debug!(
                from = current.capacity(),
                to = doubled.capacity(),
                carried = moved,
                "staging ring resized under pressure"
            );
            Some(doubled)
        } else {
            None
        }
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        // Without an explicit close, at least stop the tasks holding the
        // core alive; staged data is drained by the consumer's final pass
        if !self.core.closed.load(Ordering::Acquire) {
            if let Some(handle) = self.core.consumer.get() {
                handle.cancel();
            }
            if let Some(workers) = self.core.workers.get() {
                workers.cancel();
            }
        }
    }
}

impl io::Write for Logger {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Logger::write(self, buf).map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for &Logger {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Logger::write(*self, buf).map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "logger_test.rs"]
mod tests;
