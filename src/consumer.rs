//! Single consumer draining the staging ring
//!
//! One long-running task owns the consumer side of the ring. It wakes on a
//! ticker, drains everything available, writes each payload through the
//! same rotation-aware path as synchronous writes, and hands pooled
//! buffers back. With adaptive flush enabled the tick period follows the
//! observed load.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::BytesMut;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::logger::Core;

/// Consecutive empty ticks before the consumer slows down
const IDLE_ROUNDS_BEFORE_BACKOFF: u32 = 10;

/// Tick period while idle
const IDLE_INTERVAL: Duration = Duration::from_millis(5);

/// Items per tick that count as a busy round
const BUSY_THRESHOLD: usize = 10;

/// Tick period while busy
const BUSY_INTERVAL: Duration = Duration::from_micros(500);

/// Handle to the consumer task
pub(crate) struct DrainHandle {
    cancel: CancellationToken,
    task: StdMutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl DrainHandle {
    /// Signal shutdown without waiting
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait for the final drain to finish
    pub(crate) async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        let task = {
            let mut guard = self
                .task
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.take()
        };
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Start the consumer task on the given runtime
pub(crate) fn spawn(runtime: &Handle, core: Arc<Core>) -> DrainHandle {
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();
    let task = runtime.spawn(run(core, task_cancel));
    DrainHandle {
        cancel,
        task: StdMutex::new(Some(task)),
        stopped: AtomicBool::new(false),
    }
}

async fn run(core: Arc<Core>, cancel: CancellationToken) {
    let base = core.settings.flush_interval;
    let mut period = base;
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut empty_rounds = 0u32;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Final drain so close() loses nothing that was staged
                drain(&core);
                break;
            }
            _ = ticker.tick() => {
                let processed = drain(&core);
                if core.settings.adaptive_flush {
                    if let Some(next) = next_period(processed, base, &mut empty_rounds) {
                        if next != period {
                            period = next;
                            ticker = tokio::time::interval(period);
                            ticker.set_missed_tick_behavior(
                                tokio::time::MissedTickBehavior::Skip,
                            );
                        }
                    }
                }
            }
        }
    }

    tracing::debug!("log drain task stopped");
}

/// Adaptive tick period: back off after sustained idleness, speed up under
/// load, otherwise return to base. `None` keeps the current period.
fn next_period(processed: usize, base: Duration, empty_rounds: &mut u32) -> Option<Duration> {
    if processed == 0 {
        *empty_rounds += 1;
        if *empty_rounds >= IDLE_ROUNDS_BEFORE_BACKOFF {
            *empty_rounds = 0;
            return Some(IDLE_INTERVAL);
        }
        return None;
    }

    *empty_rounds = 0;
    if processed > BUSY_THRESHOLD {
        Some(BUSY_INTERVAL)
    } else {
        Some(base)
    }
}

/// Drain the ring to exhaustion, re-loading the ring pointer each round so
/// an adaptive resize swap is picked up mid-drain
pub(crate) fn drain(core: &Core) -> usize {
    let mut processed = 0;
    loop {
        let guard = core.ring.load();
        let Some(ring) = guard.as_ref() else {
            break;
        };
        let Some(payload) = ring.pop() else {
            break;
        };
        write_payload(core, payload);
        processed += 1;
    }
    processed
}

fn write_payload(core: &Core, payload: BytesMut) {
    if let Err(err) = core.write_direct(&payload) {
        core.report("async_write", &err);
    }
    // Wrong-capacity buffers (owned payloads, oversize staging) fall out to
    // the allocator here
    core.pool.put(payload);
}

#[cfg(test)]
#[path = "consumer_test.rs"]
mod tests;
