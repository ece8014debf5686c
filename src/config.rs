//! Logger configuration
//!
//! All fields except `filename` are optional and fall back to safe
//! defaults. Size and age limits can be given either as typed values or as
//! human-readable strings ("100MB", "7d"); setting both forms of the same
//! limit is a configuration error.
//!
//! # Example
//!
//! ```
//! use logroll::{BackpressurePolicy, LoggerConfig};
//!
//! let config = LoggerConfig::new("app.log")
//!     .with_max_size("100MB")
//!     .with_max_backups(5)
//!     .with_compress(true)
//!     .with_backpressure(BackpressurePolicy::Adaptive);
//! # let _ = config;
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, ErrorSink, Result};
use crate::parse::{self, RetryPolicy};

/// Default ring capacity requested for async staging
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Default consumer flush interval
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

/// Default filesystem retry attempts
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default delay between filesystem retries
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Behavior when a staged write finds the ring full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Fall back to a synchronous write of the same bytes
    #[default]
    Fallback,

    /// Discard the payload and count it; useful for high-rate telemetry
    /// where dropping beats blocking
    Drop,

    /// Try to grow the ring once, then fall back to sync
    Adaptive,
}

impl fmt::Display for BackpressurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackpressurePolicy::Fallback => f.write_str("fallback"),
            BackpressurePolicy::Drop => f.write_str("drop"),
            BackpressurePolicy::Adaptive => f.write_str("adaptive"),
        }
    }
}

/// Configuration for a [`Logger`](crate::Logger)
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Primary log file path. Required.
    pub filename: PathBuf,

    /// Rotate once this many bytes have been written. 0 disables
    /// size-driven rotation.
    pub max_size_bytes: u64,

    /// Size limit as a string ("100MB", "2GB"). Conflicts with a non-zero
    /// `max_size_bytes`.
    pub max_size: Option<String>,

    /// Rotate once the active file is older than this
    #[serde(with = "humantime_serde::option")]
    pub max_age: Option<Duration>,

    /// Age limit as a string ("7d", "24h"). Conflicts with `max_age`.
    pub max_age_str: Option<String>,

    /// Keep at most this many rotated files; 0 keeps all of them
    pub max_backups: usize,

    /// Delete rotated files older than this
    #[serde(with = "humantime_serde::option")]
    pub max_file_age: Option<Duration>,

    /// Use local time in backup filenames instead of UTC
    pub local_time: bool,

    /// Gzip rotated files in the background
    pub compress: bool,

    /// Write SHA-256 sidecar files for rotated files
    pub checksum: bool,

    /// Force every write through the staged async path. When off, the
    /// logger starts synchronous and scales up on observed contention.
    #[serde(rename = "async")]
    pub async_mode: bool,

    /// Requested ring capacity; rounded up to a power of two, minimum 64
    pub buffer_size: usize,

    /// What to do when the ring is full
    pub backpressure: BackpressurePolicy,

    /// Base consumer ticker period
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Let the consumer speed up and slow down with load
    pub adaptive_flush: bool,

    /// Callback for non-fatal errors (rotation, compression, retention)
    #[serde(skip)]
    pub error_sink: Option<Arc<dyn ErrorSink>>,

    /// Permission bits for created files
    pub file_mode: u32,

    /// Filesystem retry attempts
    pub retry_count: u32,

    /// Delay between filesystem retries
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            filename: PathBuf::new(),
            max_size_bytes: 0,
            max_size: None,
            max_age: None,
            max_age_str: None,
            max_backups: 0,
            max_file_age: None,
            local_time: false,
            compress: false,
            checksum: false,
            async_mode: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            backpressure: BackpressurePolicy::Fallback,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            adaptive_flush: false,
            error_sink: None,
            file_mode: parse::default_file_mode(),
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl fmt::Debug for LoggerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerConfig")
            .field("filename", &self.filename)
            .field("max_size_bytes", &self.max_size_bytes)
            .field("max_size", &self.max_size)
            .field("max_age", &self.max_age)
            .field("max_age_str", &self.max_age_str)
            .field("max_backups", &self.max_backups)
            .field("max_file_age", &self.max_file_age)
            .field("local_time", &self.local_time)
            .field("compress", &self.compress)
            .field("checksum", &self.checksum)
            .field("async_mode", &self.async_mode)
            .field("buffer_size", &self.buffer_size)
            .field("backpressure", &self.backpressure)
            .field("flush_interval", &self.flush_interval)
            .field("adaptive_flush", &self.adaptive_flush)
            .field("error_sink", &self.error_sink.is_some())
            .field("file_mode", &format_args!("{:#o}", self.file_mode))
            .field("retry_count", &self.retry_count)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

impl LoggerConfig {
    /// Create a config for `filename` with all defaults
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }

    /// Production preset: 100MB / 7d rotation, 10 compressed backups,
    /// async with adaptive backpressure, local timestamps
    pub fn production(filename: impl Into<PathBuf>) -> Self {
        Self::new(filename)
            .with_max_size("100MB")
            .with_max_age_str("7d")
            .with_max_backups(10)
            .with_compress(true)
            .with_async(true)
            .with_backpressure(BackpressurePolicy::Adaptive)
            .with_local_time(true)
    }

    /// Daily preset: rotate every 24 h (or at 50MB), keep a week of
    /// compressed backups
    pub fn daily(filename: impl Into<PathBuf>) -> Self {
        Self::new(filename)
            .with_max_size("50MB")
            .with_max_age_str("24h")
            .with_max_backups(7)
            .with_compress(true)
            .with_async(true)
            .with_backpressure(BackpressurePolicy::Adaptive)
            .with_local_time(true)
    }

    /// Weekly preset: rotate every 7 d (or at 200MB), keep a month of
    /// compressed backups
    pub fn weekly(filename: impl Into<PathBuf>) -> Self {
        Self::new(filename)
            .with_max_size("200MB")
            .with_max_age_str("7d")
            .with_max_backups(4)
            .with_compress(true)
            .with_async(true)
            .with_backpressure(BackpressurePolicy::Adaptive)
            .with_local_time(true)
    }

    /// Development preset: small uncompressed files, hourly rotation,
    /// synchronous writes for immediate visibility
    pub fn development(filename: impl Into<PathBuf>) -> Self {
        Self::new(filename)
            .with_max_size("10MB")
            .with_max_age_str("1h")
            .with_max_backups(5)
            .with_local_time(true)
    }

    /// Set the size limit from a human-readable string
    #[must_use]
    pub fn with_max_size(mut self, size: impl Into<String>) -> Self {
        self.max_size = Some(size.into());
        self
    }

    /// Set the size limit in bytes
    #[must_use]
    pub fn with_max_size_bytes(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    /// Set the age limit
    #[must_use]
    pub fn with_max_age(mut self, age: Duration) -> Self {
        self.max_age = Some(age);
        self
    }

    /// Set the age limit from a human-readable string
    #[must_use]
    pub fn with_max_age_str(mut self, age: impl Into<String>) -> Self {
        self.max_age_str = Some(age.into());
        self
    }

    /// Set the number of rotated files to retain
    #[must_use]
    pub fn with_max_backups(mut self, count: usize) -> Self {
        self.max_backups = count;
        self
    }

    /// Delete rotated files older than `age`
    #[must_use]
    pub fn with_max_file_age(mut self, age: Duration) -> Self {
        self.max_file_age = Some(age);
        self
    }

    /// Use local time in backup filenames
    #[must_use]
    pub fn with_local_time(mut self, local: bool) -> Self {
        self.local_time = local;
        self
    }

    /// Enable background gzip of rotated files
    #[must_use]
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Enable SHA-256 sidecars for rotated files
    #[must_use]
    pub fn with_checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    /// Force async routing
    #[must_use]
    pub fn with_async(mut self, enabled: bool) -> Self {
        self.async_mode = enabled;
        self
    }

    /// Set the requested ring capacity
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the full-ring policy
    #[must_use]
    pub fn with_backpressure(mut self, policy: BackpressurePolicy) -> Self {
        self.backpressure = policy;
        self
    }

    /// Set the base consumer ticker period
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Enable adaptive consumer flush timing
    #[must_use]
    pub fn with_adaptive_flush(mut self, enabled: bool) -> Self {
        self.adaptive_flush = enabled;
        self
    }

    /// Install a non-fatal error callback
    #[must_use]
    pub fn with_error_sink(mut self, sink: impl ErrorSink + 'static) -> Self {
        self.error_sink = Some(Arc::new(sink));
        self
    }

    /// Set permission bits for created files
    #[must_use]
    pub fn with_file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    /// Set the filesystem retry budget
    #[must_use]
    pub fn with_retry(mut self, count: u32, delay: Duration) -> Self {
        self.retry_count = count;
        self.retry_delay = delay;
        self
    }

    /// Validate and resolve the string forms into a settings snapshot
    pub(crate) fn resolve(self) -> Result<Settings> {
        if self.filename.as_os_str().is_empty() {
            return Err(Error::EmptyFilename);
        }

        let max_size_bytes = match &self.max_size {
            Some(s) => {
                if self.max_size_bytes > 0 {
                    return Err(Error::ConflictingConfig {
                        what: "both max_size and max_size_bytes are set",
                    });
                }
                parse::parse_size(s)?
            }
            None => self.max_size_bytes,
        };

        let max_age = match &self.max_age_str {
            Some(s) => {
                if self.max_age.is_some() {
                    return Err(Error::ConflictingConfig {
                        what: "both max_age and max_age_str are set",
                    });
                }
                parse::parse_duration(s)?
            }
            None => self.max_age.unwrap_or(Duration::ZERO),
        };

        let flush_interval = if self.flush_interval.is_zero() {
            DEFAULT_FLUSH_INTERVAL
        } else {
            self.flush_interval
        };

        Ok(Settings {
            filename: self.filename,
            max_size_bytes,
            max_age,
            max_backups: self.max_backups,
            max_file_age: self.max_file_age.unwrap_or(Duration::ZERO),
            local_time: self.local_time,
            compress: self.compress,
            checksum: self.checksum,
            async_mode: self.async_mode,
            buffer_size: if self.buffer_size == 0 {
                DEFAULT_BUFFER_SIZE
            } else {
                self.buffer_size
            },
            backpressure: self.backpressure,
            flush_interval,
            adaptive_flush: self.adaptive_flush,
            error_sink: self.error_sink,
            file_mode: if self.file_mode == 0 {
                parse::default_file_mode()
            } else {
                self.file_mode
            },
            retry: RetryPolicy {
                attempts: if self.retry_count == 0 {
                    DEFAULT_RETRY_COUNT
                } else {
                    self.retry_count
                },
                delay: if self.retry_delay.is_zero() {
                    DEFAULT_RETRY_DELAY
                } else {
                    self.retry_delay
                },
            },
        })
    }
}

/// Resolved configuration snapshot shared by all runtime components
#[derive(Clone)]
pub(crate) struct Settings {
    pub(crate) filename: PathBuf,
    pub(crate) max_size_bytes: u64,
    /// Zero disables age-driven rotation
    pub(crate) max_age: Duration,
    pub(crate) max_backups: usize,
    /// Zero disables age-based retention
    pub(crate) max_file_age: Duration,
    pub(crate) local_time: bool,
    pub(crate) compress: bool,
    pub(crate) checksum: bool,
    pub(crate) async_mode: bool,
    pub(crate) buffer_size: usize,
    pub(crate) backpressure: BackpressurePolicy,
    pub(crate) flush_interval: Duration,
    pub(crate) adaptive_flush: bool,
    pub(crate) error_sink: Option<Arc<dyn ErrorSink>>,
    pub(crate) file_mode: u32,
    pub(crate) retry: RetryPolicy,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("filename", &self.filename)
            .field("max_size_bytes", &self.max_size_bytes)
            .field("max_age", &self.max_age)
            .field("max_backups", &self.max_backups)
            .field("max_file_age", &self.max_file_age)
            .field("local_time", &self.local_time)
            .field("compress", &self.compress)
            .field("checksum", &self.checksum)
            .field("async_mode", &self.async_mode)
            .field("buffer_size", &self.buffer_size)
            .field("backpressure", &self.backpressure)
            .field("flush_interval", &self.flush_interval)
            .field("adaptive_flush", &self.adaptive_flush)
            .field("error_sink", &self.error_sink.as_ref().map(|_| "ErrorSink"))
            .field("file_mode", &self.file_mode)
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
