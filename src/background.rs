//! Background finalization pipeline
//!
//! A small pool of workers processes retention sweeps, gzip compression
//! and SHA-256 sidecar generation for rotated files. Tasks arrive over a
//! bounded channel; when it is full the task is skipped rather than
//! blocking rotation. Compression finalizes through an atomic rename of a
//! `.gz.tmp` file, so an interruption leaves either the original backup or
//! the finished `.gz`, never a torn archive.

use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, SystemTime};

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ErrorSink};
use crate::parse::{append_extension, RetryPolicy};

/// Bounded task channel capacity
pub(crate) const TASK_QUEUE_CAPACITY: usize = 100;

/// Worker count; finalization is I/O bound, two is plenty
pub(crate) const WORKER_COUNT: usize = 2;

/// One unit of finalization work against a rotated segment
#[derive(Debug)]
pub(crate) enum Task {
    /// Apply count and age limits to the backup set
    Retention,

    /// Gzip a rotated file in place
    Compress(PathBuf),

    /// Write a SHA-256 sidecar for a rotated file
    Checksum(PathBuf),
}

/// Everything a worker needs to process tasks without holding the logger
pub(crate) struct TaskContext {
    /// Sanitized primary path; backups are its `.`-suffixed siblings
    pub(crate) primary_path: PathBuf,

    /// Keep at most this many backups; 0 keeps all
    pub(crate) max_backups: usize,

    /// Delete backups older than this; zero disables
    pub(crate) max_file_age: Duration,

    pub(crate) retry: RetryPolicy,

    pub(crate) error_sink: Option<Arc<dyn ErrorSink>>,
}

impl TaskContext {
    fn report(&self, operation: &'static str, error: &Error) {
        if let Some(sink) = &self.error_sink {
            sink.report(operation, error);
        }
    }

    fn report_io(&self, operation: &'static str, error: io::Error) {
        self.report(operation, &Error::Io(error));
    }
}

/// Fixed pool of workers draining the task channel
pub(crate) struct BackgroundWorkers {
    sender: mpsc::Sender<Task>,
    cancel: CancellationToken,

    /// Tasks queued or running; drops to zero at quiescence
    pending: AtomicI64,

    handles: StdMutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl BackgroundWorkers {
    /// Start the worker pool on the given runtime
    pub(crate) fn spawn(runtime: &Handle, ctx: Arc<TaskContext>) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(TASK_QUEUE_CAPACITY);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let cancel = CancellationToken::new();

        let workers = Arc::new(Self {
            sender,
            cancel,
            pending: AtomicI64::new(0),
            handles: StdMutex::new(Vec::with_capacity(WORKER_COUNT)),
            stopped: AtomicBool::new(false),
        });

        let mut handles = Vec::with_capacity(WORKER_COUNT);
        for _ in 0..WORKER_COUNT {
            let workers = Arc::clone(&workers);
            let receiver = Arc::clone(&receiver);
            let ctx = Arc::clone(&ctx);
            handles.push(runtime.spawn(worker_loop(workers, receiver, ctx)));
        }
        *workers
            .handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = handles;

        workers
    }

    /// Queue a task without blocking; a full queue drops the task
    pub(crate) fn submit(&self, task: Task) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.sender.try_send(task).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Tasks queued or in flight
    pub(crate) fn pending(&self) -> i64 {
        self.pending.load(Ordering::Acquire)
    }

    /// Signal shutdown without waiting
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// One-shot shutdown: cancel, then wait for the workers to exit
    pub(crate) async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self
                .handles
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }

        // Tasks still queued at cancellation never ran; don't leave waiters
        // counting them
        self.pending.store(0, Ordering::Release);
    }
}

async fn worker_loop(
    workers: Arc<BackgroundWorkers>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Task>>>,
    ctx: Arc<TaskContext>,
) {
    loop {
        let task = tokio::select! {
            _ = workers.cancel.cancelled() => break,
            task = async { receiver.lock().await.recv().await } => match task {
                Some(task) => task,
                None => break,
            },
        };

        run_task(&ctx, task);
        workers.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

fn run_task(ctx: &TaskContext, task: Task) {
    match task {
        Task::Retention => retention_sweep(ctx),
        Task::Compress(path) => compress_file(ctx, &path),
        Task::Checksum(path) => write_checksum(ctx, &path),
    }
}

/// Delete backups past the age limit, then trim the survivors down to the
/// count limit, oldest first
pub(crate) fn retention_sweep(ctx: &TaskContext) {
    let dir = match ctx.primary_path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let Some(leaf) = ctx.primary_path.file_name() else {
        return;
    };
    let prefix = format!("{}.", leaf.to_string_lossy());

    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(err) => {
            ctx.report_io("retention_scan", err);
            return;
        }
    };

    let now = SystemTime::now();
    let mut backups: Vec<(PathBuf, SystemTime)> = Vec::new();

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(&prefix) {
            continue;
        }

        let path = entry.path();
        let Ok(metadata) = fs::metadata(&path) else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(now);

        if !ctx.max_file_age.is_zero() {
            if let Ok(age) = now.duration_since(modified) {
                if age > ctx.max_file_age {
                    if let Err(err) = fs::remove_file(&path) {
                        ctx.report_io("age_cleanup", err);
                    }
                    continue;
                }
            }
        }

        backups.push((path, modified));
    }

    if ctx.max_backups == 0 || backups.len() <= ctx.max_backups {
        return;
    }

    backups.sort_by_key(|(_, modified)| *modified);
    let excess = backups.len() - ctx.max_backups;
    for (path, _) in backups.into_iter().take(excess) {
        if let Err(err) = fs::remove_file(&path) {
            ctx.report_io("count_cleanup", err);
        }
    }
}

/// Gzip `source` into `<source>.gz` via an atomic rename of a `.tmp` file,
/// then remove the original. Failure keeps the source intact.
pub(crate) fn compress_file(ctx: &TaskContext, source: &Path) {
    // The backup may still be settling right after the rename
    let src = match ctx.retry.run(|| File::open(source)) {
        Ok(file) => file,
        Err(err) => {
            ctx.report_io("compress_open", err);
            return;
        }
    };

    let gz_path = append_extension(source, "gz");
    let tmp_path = append_extension(&gz_path, "tmp");

    let tmp = match File::create(&tmp_path) {
        Ok(file) => file,
        Err(err) => {
            ctx.report_io("compress_create", err);
            return;
        }
    };

    let mut encoder = GzEncoder::new(tmp, Compression::default());
    let mut reader = BufReader::new(src);
    if let Err(err) = io::copy(&mut reader, &mut encoder) {
        let _ = fs::remove_file(&tmp_path);
        ctx.report_io("compress_copy", err);
        return;
    }

    let tmp = match encoder.finish() {
        Ok(file) => file,
        Err(err) => {
            let _ = fs::remove_file(&tmp_path);
            ctx.report_io("compress_finalize", err);
            return;
        }
    };
    if let Err(err) = tmp.sync_all() {
        let _ = fs::remove_file(&tmp_path);
        ctx.report_io("compress_finalize", err);
        return;
    }
    drop(tmp);

    if let Err(err) = fs::rename(&tmp_path, &gz_path) {
        let _ = fs::remove_file(&tmp_path);
        ctx.report_io("compress_rename", err);
        return;
    }

    if let Err(err) = fs::remove_file(source) {
        ctx.report_io("compress_cleanup", err);
    }
}

/// Write `<file>.sha256` containing the hex digest and the basename. When
/// the source has already been compressed away, the `.gz` is hashed
/// instead.
pub(crate) fn write_checksum(ctx: &TaskContext, source: &Path) {
    let target: PathBuf = match fs::metadata(source) {
        Ok(_) => source.to_path_buf(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let already_gz = source.extension().is_some_and(|e| e == "gz");
            let gz_path = append_extension(source, "gz");
            if !already_gz && gz_path.exists() {
                gz_path
            } else {
                ctx.report_io("checksum_missing", err);
                return;
            }
        }
        Err(err) => {
            ctx.report_io("checksum_stat", err);
            return;
        }
    };

    let file = match File::open(&target) {
        Ok(file) => file,
        Err(err) => {
            ctx.report_io("checksum_open", err);
            return;
        }
    };

    let mut hasher = Sha256::new();
    if let Err(err) = io::copy(&mut BufReader::new(file), &mut hasher) {
        ctx.report_io("checksum_read", err);
        return;
    }
    let digest = hex::encode(hasher.finalize());

    let basename = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sidecar = append_extension(&target, "sha256");
    let content = format!("{digest}  {basename}\n");

    if let Err(err) = write_sidecar(&sidecar, content.as_bytes()) {
        ctx.report_io("checksum_write", err);
    }
}

fn write_sidecar(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(content)
}

#[cfg(test)]
#[path = "background_test.rs"]
mod tests;
