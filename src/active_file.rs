//! Atomically swappable handle to the active log file
//!
//! The open file lives behind an `ArcSwapOption`: writers load a guard and
//! append through a shared reference, rotation replaces the handle with a
//! single atomic store. A writer that loaded the previous handle keeps a
//! valid file (by then renamed to the backup path) until its reference
//! drops, so no write ever lands on a closed descriptor.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwapOption;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::parse::{sanitize_filename, validate_path_length};

/// Open `path` in create-or-append mode with the given permission bits
pub(crate) fn open_append(path: &Path, mode: u32) -> io::Result<File> {
    let mut options = fs::OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    options.open(path)
}

fn unix_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// The active log file plus its rotation bookkeeping
pub(crate) struct ActiveFile {
    file: ArcSwapOption<File>,

    /// Sanitized path, fixed at first initialization
    path: OnceLock<PathBuf>,

    /// Bytes written to the active file since open or last rotation
    bytes_written: AtomicU64,

    /// Unix milliseconds when the active file was created; millisecond
    /// resolution keeps sub-second age thresholds meaningful
    created_ms: AtomicI64,

    /// Strictly monotonic rotation counter
    rotation_seq: AtomicU64,

    /// Serializes lazy initialization; never held on the write fast path
    init_lock: Mutex<()>,
}

impl ActiveFile {
    pub(crate) fn new() -> Self {
        Self {
            file: ArcSwapOption::const_empty(),
            path: OnceLock::new(),
            bytes_written: AtomicU64::new(0),
            created_ms: AtomicI64::new(0),
            rotation_seq: AtomicU64::new(0),
            init_lock: Mutex::new(()),
        }
    }

    #[inline]
    pub(crate) fn is_open(&self) -> bool {
        self.file.load().is_some()
    }

    /// Swap in a freshly opened file (rotation winner only)
    pub(crate) fn store(&self, file: File) {
        self.file.store(Some(Arc::new(file)));
    }

    /// Take the handle out entirely (shutdown)
    pub(crate) fn clear(&self) -> Option<Arc<File>> {
        self.file.swap(None)
    }

    /// Sanitized path of the primary file; `None` before first init
    pub(crate) fn path(&self) -> Option<&PathBuf> {
        self.path.get()
    }

    #[inline]
    pub(crate) fn bytes(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Add written bytes and return the new total
    #[inline]
    pub(crate) fn add_bytes(&self, n: u64) -> u64 {
        self.bytes_written.fetch_add(n, Ordering::Relaxed) + n
    }

    /// Age of the active file; zero before first init
    pub(crate) fn age(&self) -> Duration {
        let created = self.created_ms.load(Ordering::Relaxed);
        if created <= 0 {
            return Duration::ZERO;
        }
        let elapsed = unix_now_ms() - created;
        Duration::from_millis(elapsed.max(0) as u64)
    }

    #[inline]
    pub(crate) fn rotation_seq(&self) -> u64 {
        self.rotation_seq.load(Ordering::Relaxed)
    }

    /// Reset counters after a rotation: zero bytes, fresh creation stamp,
    /// next sequence number
    pub(crate) fn mark_rotated(&self) {
        self.bytes_written.store(0, Ordering::Relaxed);
        self.created_ms.store(unix_now_ms(), Ordering::Relaxed);
        self.rotation_seq.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the open file, initializing it on first use.
    ///
    /// Initialization validates and sanitizes the configured path, creates
    /// missing parent directories, opens the file in append mode and seeds
    /// the byte counter from the existing file size. Every filesystem step
    /// runs under the retry budget. Double-checked against the cell so
    /// concurrent first writers race on the lock, not the work.
    pub(crate) fn ensure_open(&self, settings: &Settings) -> Result<Arc<File>> {
        if let Some(file) = self.file.load_full() {
            return Ok(file);
        }

        let _guard = self
            .init_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(file) = self.file.load_full() {
            return Ok(file);
        }

        let path = self.sanitized_path(settings)?.clone();
        let retry = settings.retry;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                let mut builder = fs::DirBuilder::new();
                builder.recursive(true);
                #[cfg(unix)]
                {
                    use std::os::unix::fs::DirBuilderExt;
                    builder.mode(0o750);
                }
                retry.run_tagged("directory_create", || builder.create(parent))?;
            }
        }

        let file = retry.run_tagged("file_open", || open_append(&path, settings.file_mode))?;
        let metadata = retry.run_tagged("file_stat", || file.metadata())?;

        self.bytes_written.store(metadata.len(), Ordering::Relaxed);
        self.created_ms.store(unix_now_ms(), Ordering::Relaxed);

        let file = Arc::new(file);
        self.file.store(Some(Arc::clone(&file)));
        Ok(file)
    }

    /// Validate the configured path and cache the sanitized form
    fn sanitized_path(&self, settings: &Settings) -> Result<&PathBuf> {
        if let Some(path) = self.path.get() {
            return Ok(path);
        }

        validate_path_length(&settings.filename)?;
        let leaf = settings
            .filename
            .file_name()
            .ok_or_else(|| Error::InvalidPath {
                path: settings.filename.clone(),
            })?
            .to_string_lossy();
        let sanitized = sanitize_filename(&leaf);

        let full = match settings.filename.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(&sanitized),
            _ => PathBuf::from(&sanitized),
        };

        Ok(self.path.get_or_init(|| full))
    }
}

#[cfg(test)]
#[path = "active_file_test.rs"]
mod tests;
