//! Single-flight lock for background index rebuilds.
//!
//! The lock is a file created with `create_new`, so exactly one process can
//! own it at a time. The owner writes its PID and creation time into it and
//! also holds an `fs2` exclusive lock on the open file for as long as it lives.
//!
//! A lock file left behind by a crashed process is reclaimed once its holder is
//! provably gone or the file is older than the configured stale threshold.
//! Reclaiming happens under the same `fs2` lock, and only unlinks the path if
//! it still names the file that was inspected. A reclaimer that lost the race
//! to another one therefore never deletes the winner's fresh lock.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use super::staleness::{age_of, now_unix};

/// Default age after which an abandoned lock file is reclaimed (30 minutes)
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30 * 60);

/// How many times a stale lock is reclaimed before giving up
const MAX_RECLAIMS: u32 = 2;

/// Contents of the lock file.
#[derive(Debug, Serialize, Deserialize)]
struct LockRecord {
    pid: u32,
    created_at: u64,
}

/// What an existing lock file tells us about its owner.
#[derive(Debug)]
enum Holder {
    /// A rebuild is (or may still be) running.
    Live,
    /// The owner is gone. `file` is the inspected lock file, still open and
    /// exclusively locked so no other reclaimer can judge it concurrently.
    Stale { reason: String, file: File },
    /// The file disappeared while we looked at it.
    Vanished,
}

/// A guard that owns the rebuild lock.
/// The lock file is removed when dropped.
#[derive(Debug)]
pub struct RebuildLock {
    file: File,
    path: PathBuf,
}

impl RebuildLock {
    /// Try to acquire the rebuild lock without blocking on a running rebuild.
    ///
    /// Returns `None` if another live rebuild holds it. Creates parent dirs if needed.
    pub fn try_acquire(lock_path: &Path, stale_after: Duration) -> io::Result<Option<Self>> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut reclaims = 0;
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(lock_path)
            {
                Ok(file) => return Self::claim(file, lock_path).map(Some),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            }

            if reclaims >= MAX_RECLAIMS {
                return Ok(None);
            }

            match inspect_holder(lock_path, stale_after) {
                Holder::Live => return Ok(None),
                Holder::Vanished => {}
                Holder::Stale { reason, file } => {
                    if reclaim(lock_path, &file)? {
                        log::warn!(
                            "Reclaimed stale rebuild lock {}: {}",
                            lock_path.display(),
                            reason
                        );
                    } else {
                        log::debug!(
                            "Stale rebuild lock {} was replaced before it could be reclaimed",
                            lock_path.display()
                        );
                    }
                }
            }
            reclaims += 1;
        }
    }

    /// Returns the path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn claim(file: File, lock_path: &Path) -> io::Result<Self> {
        // Built before writing so a failed write still removes the file.
        let mut lock = Self {
            file,
            path: lock_path.to_path_buf(),
        };

        // Observers only hold this briefly while inspecting.
        if let Err(e) = FileExt::lock_exclusive(&lock.file) {
            log::debug!(
                "Could not take advisory lock on {}: {}",
                lock_path.display(),
                e
            );
        }

        let record = LockRecord {
            pid: std::process::id(),
            created_at: now_unix(),
        };
        serde_json::to_writer(&mut lock.file, &record)?;
        lock.file.flush()?;

        Ok(lock)
    }
}

impl Drop for RebuildLock {
    fn drop(&mut self) {
        // Remove before unlocking so nobody can take over a half-released lock.
        match is_same_file(&self.file, &self.path) {
            Ok(true) => match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log::error!(
                    "Failed to remove rebuild lock {}: {}; background rebuilds are blocked until it goes stale",
                    self.path.display(),
                    e
                ),
            },
            Ok(false) => log::warn!(
                "Rebuild lock {} was taken over while held; leaving it in place",
                self.path.display()
            ),
            Err(e) => log::error!(
                "Failed to check rebuild lock {}: {}; background rebuilds are blocked until it goes stale",
                self.path.display(),
                e
            ),
        }

        let _ = FileExt::unlock(&self.file);
    }
}

/// Decide whether an existing lock file still belongs to a running rebuild.
fn inspect_holder(lock_path: &Path, stale_after: Duration) -> Holder {
    let mut file = match File::open(lock_path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Holder::Vanished,
        Err(e) => {
            log::warn!(
                "Cannot inspect rebuild lock {}: {}; remove it if no rebuild is running",
                lock_path.display(),
                e
            );
            return Holder::Live;
        }
    };

    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Holder::Live,
        // No advisory locks on this filesystem: PID and age still apply.
        Err(e) => log::debug!("Cannot lock {}: {}", lock_path.display(), e),
    }

    let mut contents = String::new();
    let record = file
        .read_to_string(&mut contents)
        .ok()
        .and_then(|_| serde_json::from_str::<LockRecord>(&contents).ok());

    let aged_out = file
        .metadata()
        .and_then(|m| m.modified())
        .ok()
        .is_none_or(|modified| age_of(modified) > stale_after);

    let reason = match record {
        Some(record) if !is_process_alive(record.pid) => {
            format!("holder process {} is gone", record.pid)
        }
        _ if aged_out => format!("older than {:?}", stale_after),
        _ => return Holder::Live,
    };
    Holder::Stale { reason, file }
}

/// Unlink `lock_path` if it still names `stale`. Returns whether it did.
fn reclaim(lock_path: &Path, stale: &File) -> io::Result<bool> {
    if !is_same_file(stale, lock_path)? {
        return Ok(false);
    }
    match fs::remove_file(lock_path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Whether `path` still names the file open as `file`.
#[cfg(unix)]
fn is_same_file(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let open = file.metadata()?;
    match fs::symlink_metadata(path) {
        Ok(current) => Ok(open.dev() == current.dev() && open.ino() == current.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn is_same_file(_file: &File, path: &Path) -> io::Result<bool> {
    Ok(path.exists())
}

/// Check if a process with the given PID is still alive.
#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }

    // Signal 0 only checks for existence and permission.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}
