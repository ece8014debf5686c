//! logroll - universal log rotation
//!
//! A byte-stream sink for arbitrary logging frontends that durably writes
//! to a named file, rotates on size and age thresholds, and finalizes
//! rotated segments in the background (gzip, SHA-256 sidecars, retention).
//! Built for high concurrency: the hot path is lock-free, rotation is
//! coordinated by a single CAS winner, and writers never observe a closed
//! or half-renamed file.
//!
//! # Architecture
//!
//! ```text
//! [writers] → Logger ─┬─ sync path ──────────────→ active file
//!                     └─ staged path → RingStage → drain task → active file
//!                                                       │ (threshold)
//!                                                  rotation winner
//!                                                       │
//!                                            backup file → worker pool
//!                                                  (gzip / sha256 / retention)
//! ```
//!
//! Two write paths share one rotation discipline:
//!
//! - **Sync**: the caller appends directly. Wait-free apart from the
//!   filesystem call itself.
//! - **Staged**: the payload goes into a lock-free MPSC ring; one consumer
//!   task drains it on an (optionally adaptive) ticker. When the ring is
//!   full, a configurable backpressure policy decides between falling back
//!   to sync, dropping, or growing the ring.
//!
//! Unless async is forced, the logger starts synchronous and switches to
//! the staged path when its own latency and contention metrics say the
//! sync path is degrading.
//!
//! # On-disk artifacts
//!
//! | artifact | name |
//! |---|---|
//! | active file | `<filename>` |
//! | rotated file | `<filename>.YYYY-MM-DD-HH-MM-SS` (UTC, or local time) |
//! | compressed | `<rotated>.gz` (transient `<rotated>.gz.tmp` while running) |
//! | checksum sidecar | `<rotated>.sha256` / `<rotated>.gz.sha256` |
//!
//! # Example
//!
//! ```no_run
//! use logroll::{Logger, LoggerConfig};
//!
//! # async fn demo() -> logroll::Result<()> {
//! let logger = Logger::new(
//!     LoggerConfig::new("logs/app.log")
//!         .with_max_size("50MB")
//!         .with_max_age_str("24h")
//!         .with_max_backups(7)
//!         .with_compress(true),
//! )?;
//!
//! logger.write(b"hello\n")?;
//! logger.close().await?;
//! # Ok(())
//! # }
//! ```

mod active_file;
mod background;
mod config;
mod consumer;
mod error;
mod logger;
mod metrics;
mod parse;
mod pool;
mod ring;
mod rotation;

pub use config::{
    BackpressurePolicy, LoggerConfig, DEFAULT_BUFFER_SIZE, DEFAULT_FLUSH_INTERVAL,
    DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY,
};
pub use error::{Error, ErrorSink, Result};
pub use logger::Logger;
pub use metrics::Stats;
pub use parse::{default_file_mode, parse_duration, parse_size, sanitize_filename, validate_path_length};
