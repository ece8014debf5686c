//! Single-winner file rotation
//!
//! Any writer that crosses a threshold tries to claim the rotation flag
//! with a CAS. Exactly one claims it and runs the rename-reopen sequence;
//! everyone else keeps writing through the still-valid pre-swap handle.
//! The flag clears on every exit path, so a failed rotation re-arms on the
//! next threshold crossing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Local, Utc};

use crate::active_file::open_append;
use crate::background::Task;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::logger::Core;

/// Timestamp suffix for backup names, second resolution
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Clears the rotation flag when the winner leaves the critical section,
/// whether by success, error or panic
struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[inline]
pub(crate) fn size_exceeded(settings: &Settings, current_size: u64) -> bool {
    settings.max_size_bytes > 0 && current_size >= settings.max_size_bytes
}

/// Whether the active file has outlived the age threshold. Checked before
/// each write so the payload that crosses the line lands in the fresh file.
#[inline]
pub(crate) fn age_exceeded(core: &Core) -> bool {
    !core.settings.max_age.is_zero()
        && core.active.is_open()
        && core.active.age() >= core.settings.max_age
}

/// Claim the flag and rotate; losers return immediately. Errors go to the
/// error sink since the caller is mid-write.
pub(crate) fn trigger_rotation(core: &Core) {
    if core
        .rotating
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return;
    }
    let _clear = FlagGuard(&core.rotating);

    if let Err(err) = perform_rotation(core) {
        core.report("rotation", &err);
    }
}

/// Forced rotation for [`Logger::rotate`](crate::Logger::rotate). Returns
/// Ok without doing anything when a rotation is already in flight.
pub(crate) fn rotate_now(core: &Core) -> Result<()> {
    if core
        .rotating
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Ok(());
    }
    let _clear = FlagGuard(&core.rotating);

    perform_rotation(core)
}

/// The winner's procedure: rename the primary to a timestamped backup,
/// open a fresh primary, swap it in, reset counters and hand the backup to
/// the background pipeline.
fn perform_rotation(core: &Core) -> Result<()> {
    if !core.active.is_open() {
        return Err(Error::NoActiveFile);
    }
    let path = core.active.path().cloned().ok_or(Error::NoActiveFile)?;

    let settings = &core.settings;
    let retry = settings.retry;
    let backup = next_backup_path(&path, settings.local_time);

    // Writers holding the old handle keep a valid descriptor through the
    // rename; their bytes land in the backup file
    retry.run_tagged("file_rename", || fs::rename(&path, &backup))?;

    // Some platforms release renamed handles lazily
    std::thread::sleep(retry.delay);

    let file = retry.run_tagged("file_open", || open_append(&path, settings.file_mode))?;
    core.active.store(file);
    core.active.mark_rotated();

    tracing::debug!(
        backup = %backup.display(),
        seq = core.active.rotation_seq(),
        "rotated log file"
    );

    schedule_background(core, backup);
    Ok(())
}

/// Timestamped backup path; a numeric suffix disambiguates sub-second
/// collisions deterministically
pub(crate) fn next_backup_path(path: &Path, local_time: bool) -> PathBuf {
    let stamp = if local_time {
        Local::now().format(BACKUP_TIMESTAMP_FORMAT).to_string()
    } else {
        Utc::now().format(BACKUP_TIMESTAMP_FORMAT).to_string()
    };

    let mut base = path.as_os_str().to_os_string();
    base.push(".");
    base.push(&stamp);

    let mut candidate = PathBuf::from(base.clone());
    let mut n = 1u32;
    while backup_name_taken(&candidate) {
        let mut suffixed = base.clone();
        suffixed.push(format!(".{n}"));
        candidate = PathBuf::from(suffixed);
        n += 1;
    }
    candidate
}

/// A backup name is taken even when only finalized artifacts remain;
/// compression removes the original, and reusing its name would overwrite
/// the archive of an earlier rotation
fn backup_name_taken(candidate: &Path) -> bool {
    if candidate.exists() {
        return true;
    }
    let gz = crate::parse::append_extension(candidate, "gz");
    gz.exists() || crate::parse::append_extension(&gz, "tmp").exists()
}

/// Queue finalization work for the just-renamed backup. Enqueue order
/// carries no execution-order promise; the worker pool interleaves freely.
fn schedule_background(core: &Core, backup: PathBuf) {
    let settings = &core.settings;
    let wants_retention = settings.max_backups > 0 || !settings.max_file_age.is_zero();
    if !wants_retention && !settings.checksum && !settings.compress {
        return;
    }

    let Some(workers) = core.background_workers() else {
        return;
    };

    if wants_retention {
        workers.submit(Task::Retention);
    }
    if settings.checksum {
        workers.submit(Task::Checksum(backup.clone()));
    }
    if settings.compress {
        workers.submit(Task::Compress(backup));
    }
}

#[cfg(test)]
#[path = "rotation_test.rs"]
mod tests;
