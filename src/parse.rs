//! Size and duration parsing plus filesystem helpers
//!
//! Sizes accept plain byte counts and binary suffixes (KB/K, MB/M, GB/G,
//! TB/T, 1 KB = 1024), case-insensitive. Durations accept the usual
//! `humantime` literals (ns, us, ms, s, m, h) plus `d` (24 h), `w` (7 d)
//! and `y` (365 d). Decimal values are rejected in both.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;
const TIB: u64 = 1024 * GIB;

#[cfg(windows)]
const MAX_PATH_LEN: usize = 260;
#[cfg(not(windows))]
const MAX_PATH_LEN: usize = 4096;

/// Parse a human-readable size string into bytes
///
/// ```
/// assert_eq!(logroll::parse_size("4096").unwrap(), 4096);
/// assert_eq!(logroll::parse_size("100MB").unwrap(), 100 * 1024 * 1024);
/// assert_eq!(logroll::parse_size("1k").unwrap(), 1024);
/// ```
pub fn parse_size(input: &str) -> Result<u64> {
    let s = input.trim();
    if s.is_empty() {
        return Err(Error::InvalidSize {
            input: input.to_string(),
            reason: "empty size string".to_string(),
        });
    }

    // Plain numbers are byte counts
    if let Ok(value) = s.parse::<u64>() {
        return Ok(value);
    }

    let upper = s.to_ascii_uppercase();
    let (number, multiplier) = if let Some(n) = upper.strip_suffix("KB") {
        (n, KIB)
    } else if let Some(n) = upper.strip_suffix("MB") {
        (n, MIB)
    } else if let Some(n) = upper.strip_suffix("GB") {
        (n, GIB)
    } else if let Some(n) = upper.strip_suffix("TB") {
        (n, TIB)
    } else if let Some(n) = upper.strip_suffix('K') {
        (n, KIB)
    } else if let Some(n) = upper.strip_suffix('M') {
        (n, MIB)
    } else if let Some(n) = upper.strip_suffix('G') {
        (n, GIB)
    } else if let Some(n) = upper.strip_suffix('T') {
        (n, TIB)
    } else {
        return Err(Error::InvalidSize {
            input: input.to_string(),
            reason: "unknown size suffix (supported: KB/K, MB/M, GB/G, TB/T)".to_string(),
        });
    };

    let value: u64 = number.trim().parse().map_err(|e| Error::InvalidSize {
        input: input.to_string(),
        reason: format!("invalid number: {e}"),
    })?;

    value.checked_mul(multiplier).ok_or_else(|| Error::InvalidSize {
        input: input.to_string(),
        reason: "size overflows u64".to_string(),
    })
}

/// Parse a human-readable duration string
///
/// `d`, `w` and `y` are resolved here (a year is exactly 365 days);
/// everything else is delegated to `humantime`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(Error::InvalidDuration {
            input: input.to_string(),
            reason: "empty duration string".to_string(),
        });
    }

    let lower = s.to_ascii_lowercase();
    for (suffix, seconds) in [("d", 86_400u64), ("w", 7 * 86_400), ("y", 365 * 86_400)] {
        if let Some(number) = lower.strip_suffix(suffix) {
            if let Ok(value) = number.trim().parse::<u64>() {
                let secs = value.checked_mul(seconds).ok_or_else(|| Error::InvalidDuration {
                    input: input.to_string(),
                    reason: "duration overflows".to_string(),
                })?;
                return Ok(Duration::from_secs(secs));
            }
            // Not a bare integer (e.g. "1h30d"), let humantime have a go
        }
    }

    humantime::parse_duration(&lower).map_err(|e| Error::InvalidDuration {
        input: input.to_string(),
        reason: e.to_string(),
    })
}

/// Replace characters that are invalid in file names on the current platform
pub fn sanitize_filename(name: &str) -> String {
    if cfg!(windows) {
        name.chars()
            .map(|c| match c {
                '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
                c if (c as u32) < 32 => '_',
                c => c,
            })
            .collect()
    } else {
        name.replace('\0', "_")
    }
}

/// Check that the absolute form of `path` fits within the OS path limit
pub fn validate_path_length(path: &Path) -> Result<()> {
    let absolute: PathBuf = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let len = absolute.as_os_str().len();
    if len > MAX_PATH_LEN {
        return Err(Error::PathTooLong {
            len,
            limit: MAX_PATH_LEN,
        });
    }
    Ok(())
}

/// Default permission bits for created log files
pub fn default_file_mode() -> u32 {
    0o644
}

/// Retry parameters for filesystem operations
///
/// Transient failures happen on network shares, overlay filesystems and
/// under antivirus scanners. A short bounded retry rides them out without
/// masking real errors.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub(crate) attempts: u32,
    pub(crate) delay: Duration,
}

impl RetryPolicy {
    /// Run `op`, retrying up to `attempts` times with `delay` between tries.
    /// The last error is propagated when the budget is exhausted.
    pub(crate) fn run<T>(&self, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= attempts {
                        return Err(err);
                    }
                    std::thread::sleep(self.delay);
                }
            }
        }
    }

    /// Like [`run`](Self::run) but wraps exhaustion in [`Error::RetryExhausted`]
    pub(crate) fn run_tagged<T>(
        &self,
        op_name: &'static str,
        op: impl FnMut() -> io::Result<T>,
    ) -> Result<T> {
        self.run(op).map_err(|source| Error::RetryExhausted {
            op: op_name,
            attempts: self.attempts.max(1),
            source,
        })
    }
}

/// Append an extension after whatever the path already has
/// (`app.log` + `gz` = `app.log.gz`)
pub(crate) fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod tests;
