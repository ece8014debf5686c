//! Error types and the non-fatal error sink
//!
//! Errors that prevent a write from reaching some file are returned to the
//! caller. Everything else (rotation, compression, retention, checksums) is
//! reported through the optional [`ErrorSink`] together with a short
//! operation tag such as `compress_rename` or `count_cleanup`.

use std::io;
use thiserror::Error;

/// Convenience result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the rotation engine
#[derive(Debug, Error)]
pub enum Error {
    /// The configured filename is empty
    #[error("filename cannot be empty")]
    EmptyFilename,

    /// Two mutually exclusive configuration fields were set
    #[error("conflicting configuration: {what}")]
    ConflictingConfig {
        /// Which pair of fields conflicts
        what: &'static str,
    },

    /// A size string could not be parsed
    #[error("invalid size {input:?}: {reason}")]
    InvalidSize { input: String, reason: String },

    /// A duration string could not be parsed
    #[error("invalid duration {input:?}: {reason}")]
    InvalidDuration { input: String, reason: String },

    /// The log file path exceeds the OS path length limit
    #[error("path too long: {len} characters (limit: {limit})")]
    PathTooLong { len: usize, limit: usize },

    /// The log file path has no usable leaf name
    #[error("invalid log file path {path:?}")]
    InvalidPath { path: std::path::PathBuf },

    /// A filesystem operation kept failing after the whole retry budget
    #[error("{op} failed after {attempts} attempts")]
    RetryExhausted {
        op: &'static str,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// No log file is open yet (nothing has been written)
    #[error("no active log file")]
    NoActiveFile,

    /// The logger has been closed
    #[error("logger is closed")]
    Closed,

    /// Plain I/O error on the write path
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Receiver for non-fatal errors from background operations
///
/// Implementations must not block and must not write through the logger
/// again; the sink is invoked from rotation and worker contexts.
pub trait ErrorSink: Send + Sync {
    /// Called with the failed operation tag and the error
    fn report(&self, operation: &'static str, error: &Error);
}

impl<F> ErrorSink for F
where
    F: Fn(&'static str, &Error) + Send + Sync,
{
    fn report(&self, operation: &'static str, error: &Error) {
        self(operation, error)
    }
}
