//! Configuration: which base directories to index and where the cache lives.
//!
//! Base directories come from, in order:
//! - the `REPODEX_BASE` environment variable
//! - one path per line in `~/.repodexBase`
//!
//! Entries that don't exist are dropped. With nothing left, the home
//! directory is the only base.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{CachePaths, DEFAULT_STALE_AFTER};

/// Environment variable naming a base directory
pub const BASE_ENV_VAR: &str = "REPODEX_BASE";

/// File in the home directory listing base directories, one per line
const BASE_FILE_NAME: &str = ".repodexBase";

/// Version stamped into every index this build writes
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything the indexer needs to know about its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base directories, in scan order
    pub base_dirs: Vec<PathBuf>,
    /// Location of the cache and lock files
    pub paths: CachePaths,
    /// Version compared against cached indexes
    pub version: String,
    /// Age after which an abandoned rebuild lock is reclaimed
    pub stale_lock_after: Duration,
}

impl Config {
    /// Create a config for the given bases and cache location, using this build's version.
    pub fn new(base_dirs: Vec<PathBuf>, paths: CachePaths) -> Self {
        Self {
            base_dirs,
            paths,
            version: VERSION.to_string(),
            stale_lock_after: DEFAULT_STALE_AFTER,
        }
    }

    /// Override the version (tests simulate upgrades with this).
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the age after which an abandoned rebuild lock is reclaimed.
    pub fn with_stale_lock_after(mut self, stale_lock_after: Duration) -> Self {
        self.stale_lock_after = stale_lock_after;
        self
    }

    /// Resolve bases from the environment and `~/.repodexBase`, caching in the home directory.
    pub fn from_env() -> Self {
        let home = home_dir();
        let base_dirs = resolve_base_dirs(std::env::var_os(BASE_ENV_VAR), &home);
        Self::new(base_dirs, CachePaths::new(home))
    }
}

/// The user's home directory, or the current directory if it is unknown.
pub fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Compute the configured base directories.
///
/// `env_base` is the value of [`BASE_ENV_VAR`]; the base file is read from `home`.
pub fn resolve_base_dirs(env_base: Option<OsString>, home: &Path) -> Vec<PathBuf> {
    let mut bases = Vec::new();

    if let Some(base) = env_base.filter(|b| !b.is_empty()) {
        bases.push(expand_path(&base.to_string_lossy(), home));
    }

    let base_file = home.join(BASE_FILE_NAME);
    match fs::read_to_string(&base_file) {
        Ok(contents) => bases.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|line| expand_path(line, home)),
        ),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Cannot read {}: {}", base_file.display(), e),
    }

    bases.retain(|base| {
        let exists = base.exists();
        if !exists {
            log::debug!("Ignoring missing base directory {}", base.display());
        }
        exists
    });

    if bases.is_empty() {
        bases.push(home.to_path_buf());
    }
    bases
}

/// Expand a leading `~` and anchor relative paths at `home`.
fn expand_path(raw: &str, home: &Path) -> PathBuf {
    if raw == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        return home.join(rest);
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        home.join(path)
    }
}
