//! Tests for the background finalization pipeline

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use crate::background::{
    compress_file, retention_sweep, write_checksum, BackgroundWorkers, Task, TaskContext,
};
use crate::error::Error;
use crate::parse::RetryPolicy;

/// Collects error sink reports for assertions
#[derive(Default)]
struct CapturingSink(Mutex<Vec<(&'static str, String)>>);

impl crate::error::ErrorSink for CapturingSink {
    fn report(&self, operation: &'static str, error: &Error) {
        self.0
            .lock()
            .unwrap()
            .push((operation, error.to_string()));
    }
}

impl CapturingSink {
    fn operations(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().iter().map(|(op, _)| *op).collect()
    }
}

fn context(primary: &Path, sink: Arc<CapturingSink>) -> TaskContext {
    TaskContext {
        primary_path: primary.to_path_buf(),
        max_backups: 0,
        max_file_age: Duration::ZERO,
        retry: RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(1),
        },
        error_sink: Some(sink),
    }
}

fn gunzip(path: &Path) -> Vec<u8> {
    let mut decoder = GzDecoder::new(File::open(path).unwrap());
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).unwrap();
    out
}

// ============================================================================
// compression
// ============================================================================

#[test]
fn test_compress_replaces_source_with_gz() {
    let dir = TempDir::new().unwrap();
    let primary = dir.path().join("app.log");
    let backup = dir.path().join("app.log.2025-06-01-10-00-00");
    let content = b"line one\nline two\nline three\n".repeat(50);
    fs::write(&backup, &content).unwrap();

    let sink = Arc::new(CapturingSink::default());
    compress_file(&context(&primary, Arc::clone(&sink)), &backup);

    let gz = dir.path().join("app.log.2025-06-01-10-00-00.gz");
    assert!(gz.exists(), "compressed file should exist");
    assert!(!backup.exists(), "source should be removed");
    assert!(
        !dir.path().join("app.log.2025-06-01-10-00-00.gz.tmp").exists(),
        "no temp file may survive"
    );
    assert_eq!(gunzip(&gz), content);
    assert!(sink.operations().is_empty());
}

#[test]
fn test_compress_missing_source_reports_and_leaves_nothing() {
    let dir = TempDir::new().unwrap();
    let primary = dir.path().join("app.log");
    let missing = dir.path().join("app.log.2025-06-01-10-00-00");

    let sink = Arc::new(CapturingSink::default());
    compress_file(&context(&primary, Arc::clone(&sink)), &missing);

    assert_eq!(sink.operations(), vec!["compress_open"]);
    assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
}

// ============================================================================
// checksums
// ============================================================================

#[test]
fn test_checksum_sidecar_format() {
    let dir = TempDir::new().unwrap();
    let primary = dir.path().join("app.log");
    let backup = dir.path().join("app.log.2025-06-01-10-00-00");
    let content = b"checksummed payload\n";
    fs::write(&backup, content).unwrap();

    let sink = Arc::new(CapturingSink::default());
    write_checksum(&context(&primary, Arc::clone(&sink)), &backup);

    let sidecar = dir.path().join("app.log.2025-06-01-10-00-00.sha256");
    let written = fs::read_to_string(&sidecar).unwrap();

    let expected_digest = hex::encode(Sha256::digest(content));
    assert_eq!(
        written,
        format!("{expected_digest}  app.log.2025-06-01-10-00-00\n")
    );
    assert!(sink.operations().is_empty());
}

#[test]
fn test_checksum_falls_back_to_gz_when_source_compressed_away() {
    let dir = TempDir::new().unwrap();
    let primary = dir.path().join("app.log");
    let backup = dir.path().join("app.log.2025-06-01-10-00-00");
    fs::write(&backup, b"will be compressed\n").unwrap();

    let sink = Arc::new(CapturingSink::default());
    let ctx = context(&primary, Arc::clone(&sink));

    // Compression already ran and removed the plain backup
    compress_file(&ctx, &backup);
    write_checksum(&ctx, &backup);

    let gz = dir.path().join("app.log.2025-06-01-10-00-00.gz");
    let sidecar = dir.path().join("app.log.2025-06-01-10-00-00.gz.sha256");
    let written = fs::read_to_string(&sidecar).unwrap();

    let expected_digest = hex::encode(Sha256::digest(fs::read(&gz).unwrap()));
    assert_eq!(
        written,
        format!("{expected_digest}  app.log.2025-06-01-10-00-00.gz\n")
    );
}

#[test]
fn test_checksum_missing_file_reports() {
    let dir = TempDir::new().unwrap();
    let primary = dir.path().join("app.log");
    let sink = Arc::new(CapturingSink::default());

    write_checksum(
        &context(&primary, Arc::clone(&sink)),
        &dir.path().join("app.log.gone"),
    );
    assert_eq!(sink.operations(), vec!["checksum_missing"]);
}

// ============================================================================
// retention
// ============================================================================

fn touch_backup(dir: &Path, suffix: &str) -> PathBuf {
    let path = dir.join(format!("app.log.{suffix}"));
    fs::write(&path, b"backup").unwrap();
    path
}

#[test]
fn test_retention_keeps_newest_by_count() {
    let dir = TempDir::new().unwrap();
    let primary = dir.path().join("app.log");
    fs::write(&primary, b"active").unwrap();

    let old = touch_backup(dir.path(), "2025-06-01-10-00-00");
    std::thread::sleep(Duration::from_millis(20));
    let mid = touch_backup(dir.path(), "2025-06-01-11-00-00");
    std::thread::sleep(Duration::from_millis(20));
    let new = touch_backup(dir.path(), "2025-06-01-12-00-00");

    let sink = Arc::new(CapturingSink::default());
    let mut ctx = context(&primary, Arc::clone(&sink));
    ctx.max_backups = 2;
    retention_sweep(&ctx);

    assert!(!old.exists(), "oldest backup should be deleted");
    assert!(mid.exists());
    assert!(new.exists());
    assert!(primary.exists(), "primary file is never a backup");
}

#[test]
fn test_retention_zero_max_backups_keeps_everything() {
    let dir = TempDir::new().unwrap();
    let primary = dir.path().join("app.log");

    let a = touch_backup(dir.path(), "2025-06-01-10-00-00");
    let b = touch_backup(dir.path(), "2025-06-01-11-00-00");

    let sink = Arc::new(CapturingSink::default());
    retention_sweep(&context(&primary, sink));

    assert!(a.exists());
    assert!(b.exists());
}

#[test]
fn test_retention_age_limit_deletes_old_files() {
    let dir = TempDir::new().unwrap();
    let primary = dir.path().join("app.log");

    let stale = touch_backup(dir.path(), "2025-06-01-10-00-00");
    std::thread::sleep(Duration::from_millis(80));
    let fresh = touch_backup(dir.path(), "2025-06-01-11-00-00");

    let sink = Arc::new(CapturingSink::default());
    let mut ctx = context(&primary, sink);
    ctx.max_file_age = Duration::from_millis(50);
    retention_sweep(&ctx);

    assert!(!stale.exists(), "file past the age limit should be deleted");
    assert!(fresh.exists());
}

#[test]
fn test_retention_ignores_unrelated_files() {
    let dir = TempDir::new().unwrap();
    let primary = dir.path().join("app.log");

    let other = dir.path().join("other.log.2025-06-01-10-00-00");
    fs::write(&other, b"not ours").unwrap();
    let a = touch_backup(dir.path(), "2025-06-01-10-00-00");
    let b = touch_backup(dir.path(), "2025-06-01-11-00-00");

    let sink = Arc::new(CapturingSink::default());
    let mut ctx = context(&primary, sink);
    ctx.max_backups = 1;
    retention_sweep(&ctx);

    assert!(other.exists(), "foreign files are untouched");
    assert!(!a.exists() || !b.exists());
}

// ============================================================================
// worker pool
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_worker_pool_processes_tasks_and_quiesces() {
    let dir = TempDir::new().unwrap();
    let primary = dir.path().join("app.log");
    let backup = dir.path().join("app.log.2025-06-01-10-00-00");
    fs::write(&backup, b"to be compressed\n").unwrap();

    let sink = Arc::new(CapturingSink::default());
    let ctx = Arc::new(context(&primary, Arc::clone(&sink)));
    let workers = BackgroundWorkers::spawn(&tokio::runtime::Handle::current(), ctx);

    workers.submit(Task::Compress(backup.clone()));

    while workers.pending() > 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert!(dir
        .path()
        .join("app.log.2025-06-01-10-00-00.gz")
        .exists());
    assert!(!backup.exists());

    workers.stop().await;
    assert_eq!(workers.pending(), 0);
    // Stop twice is a no-op
    workers.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_worker_pool_submit_after_cancel_is_ignored() {
    let dir = TempDir::new().unwrap();
    let primary = dir.path().join("app.log");
    let sink = Arc::new(CapturingSink::default());
    let ctx = Arc::new(context(&primary, sink));
    let workers = BackgroundWorkers::spawn(&tokio::runtime::Handle::current(), ctx);

    workers.stop().await;
    workers.submit(Task::Retention);
    assert_eq!(workers.pending(), 0);
}
