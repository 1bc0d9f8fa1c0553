//! Fast discovery backed by the system `find` command.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use repodex_types::Repository;

use super::{RepoFinder, ScanError, is_repo_dir, resolve_repo};

/// `find` wrapper.
///
/// Runs two searches per base:
/// - every `.git` entry at any depth (`-prune` keeps it out of `.git` internals)
/// - every symlink directly inside the base, kept when it resolves to a repository
pub struct FindCommand {
    find_path: PathBuf,
}

impl FindCommand {
    /// Use the `find` binary at `find_path`.
    pub fn new(find_path: impl Into<PathBuf>) -> Self {
        Self {
            find_path: find_path.into(),
        }
    }

    /// Locate an executable `find` on `PATH`.
    ///
    /// Only Unix hosts qualify; elsewhere `find` is a different tool entirely.
    pub fn detect() -> Option<Self> {
        if !cfg!(unix) {
            return None;
        }
        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .map(|dir| dir.join("find"))
            .find(|candidate| is_executable(candidate))
            .map(Self::new)
    }

    /// Path of the `find` binary in use
    pub fn path(&self) -> &Path {
        &self.find_path
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.find_path);
        cmd.stdin(Stdio::null());
        cmd.stderr(Stdio::null());
        cmd
    }

    /// Run `find <base> <args..> -print0` and collect the printed paths.
    ///
    /// `find` exits non-zero when part of the tree is unreadable; whatever it
    /// printed is still valid, so the exit status is only logged.
    fn run(&self, base: &Path, args: &[&str]) -> Result<Vec<PathBuf>, ScanError> {
        let output = self
            .command()
            .arg(base)
            .args(args)
            .arg("-print0")
            .output()
            .map_err(|e| ScanError::Command {
                command: self.find_path.display().to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            log::debug!(
                "find exited with {} under {}; using partial results",
                output.status,
                base.display()
            );
        }

        Ok(output
            .stdout
            .split(|b| *b == 0)
            .filter(|chunk| !chunk.is_empty())
            .map(bytes_to_path)
            .collect())
    }
}

impl RepoFinder for FindCommand {
    fn name(&self) -> &'static str {
        "find"
    }

    fn find_repos(&self, base: &Path) -> Result<BTreeSet<Repository>, ScanError> {
        let git_paths = self.run(base, &["-name", ".git", "-prune"])?;
        let symlinks = self.run(base, &["-mindepth", "1", "-maxdepth", "1", "-type", "l"])?;

        let owners = git_paths
            .iter()
            .filter_map(|git_path| git_path.parent().map(Path::to_path_buf));
        let linked = symlinks.into_iter().filter(|link| is_repo_dir(link));

        Ok(owners
            .chain(linked)
            .filter_map(|dir| resolve_repo(&dir))
            .collect())
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

#[cfg(unix)]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}
