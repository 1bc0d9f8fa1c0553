//! Fire-and-forget launchers for background rebuilds.
//!
//! A spawner starts [`RebuildJob::run_locked`] somewhere that shares no memory
//! with the caller and returns immediately. The caller keeps nothing to wait on:
//! the only trace a background rebuild leaves is the cache file it writes.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;

use super::RebuildJob;

/// Name of the hidden CLI subcommand that runs a locked rebuild.
pub const REBUILD_SUBCOMMAND: &str = "rebuild";

/// Starts a detached background rebuild.
pub trait Spawn: Send + Sync {
    /// Launch a rebuild of `job` without waiting for it.
    fn spawn_rebuild(&self, job: &Arc<RebuildJob>) -> io::Result<()>;
}

/// Re-runs the current executable as a detached child process.
///
/// The child receives the exact base directories and cache root of the
/// caller, so the index it writes is valid for the next invocation. The child
/// outlives its parent; while the parent lives, a detached thread reaps it.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    exe: PathBuf,
}

impl ProcessSpawner {
    /// Spawn children of the executable at `exe`.
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }

    /// Spawn children of the running executable.
    pub fn current_exe() -> io::Result<Self> {
        std::env::current_exe().map(Self::new)
    }

    /// Arguments passed to the child for `job`.
    pub fn child_args(&self, job: &RebuildJob) -> Vec<OsString> {
        let config = job.config();
        let mut args = Vec::with_capacity(config.base_dirs.len() + 2);

        let mut root = OsString::from("--cache-root=");
        root.push(config.paths.root());
        args.push(root);

        for base in &config.base_dirs {
            let mut arg = OsString::from("--base=");
            arg.push(base);
            args.push(arg);
        }

        args.push(OsString::from(REBUILD_SUBCOMMAND));
        args
    }
}

impl ProcessSpawner {
    /// Start the child and a detached thread that reaps it on exit.
    ///
    /// The caller never waits; the reaper only keeps long-lived hosts from
    /// collecting zombie children.
    fn launch(&self, job: &RebuildJob) -> io::Result<thread::JoinHandle<io::Result<ExitStatus>>> {
        let mut cmd = Command::new(&self.exe);
        cmd.args(self.child_args(job));
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        // Keep terminal signals aimed at the caller away from the rebuild.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn()?;
        let pid = child.id();
        log::debug!("Started background rebuild (pid {})", pid);

        thread::Builder::new()
            .name("repodex-reaper".to_string())
            .spawn(move || {
                let status = child.wait();
                log::debug!("Background rebuild {} exited: {:?}", pid, status);
                status
            })
    }
}

impl Spawn for ProcessSpawner {
    fn spawn_rebuild(&self, job: &Arc<RebuildJob>) -> io::Result<()> {
        self.launch(job).map(drop)
    }
}

/// Runs the rebuild on a detached thread of the current process.
///
/// Only useful in long-lived hosts: the rebuild dies with the process. Unlike
/// [`ProcessSpawner`] it starts no extra process per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

impl Spawn for ThreadSpawner {
    fn spawn_rebuild(&self, job: &Arc<RebuildJob>) -> io::Result<()> {
        let job = Arc::clone(job);
        thread::Builder::new()
            .name("repodex-rebuild".to_string())
            .spawn(move || {
                let outcome = job.run_locked();
                log::debug!("Background rebuild finished: {:?}", outcome);
            })?;
        Ok(())
    }
}

/// Lower this process's scheduling priority before a background scan.
pub fn lower_priority() {
    #[cfg(unix)]
    {
        // -1 is also a valid new niceness, so this is only worth a debug line.
        let rc = unsafe { libc::nice(10) };
        if rc == -1 {
            log::debug!("nice(10) returned -1: {}", io::Error::last_os_error());
        }
    }
}
