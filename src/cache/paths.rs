//! Cache file path management
//!
//! The cache and its lock live directly in the cache root, which is the
//! user's home directory unless overridden:
//!
//! ```text
//! ~/
//! ├── .repodexCache              # Serialized index (JSON)
//! ├── .repodexCache.tmp.<pid>.<n> # In-flight atomic write
//! └── .repodexCacheLock          # Present while a background rebuild runs
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const CACHE_FILE_NAME: &str = ".repodexCache";
const LOCK_FILE_NAME: &str = ".repodexCacheLock";

/// Global counter for unique temp file names within a process
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Manages the filesystem locations of the cache and lock files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    root: PathBuf,
}

impl CachePaths {
    /// Creates a new CachePaths with the specified root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory holding the cache files
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the cache file path: `{root}/.repodexCache`
    pub fn cache_file(&self) -> PathBuf {
        self.root.join(CACHE_FILE_NAME)
    }

    /// Returns the rebuild lock path: `{root}/.repodexCacheLock`
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE_NAME)
    }

    /// Returns a fresh temp path next to the cache file: `{root}/.repodexCache.tmp.{pid}.{n}`
    ///
    /// PID + counter keep concurrent writers (threads or processes) apart.
    pub fn temp_cache_file(&self) -> PathBuf {
        let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.root.join(format!(
            "{}.tmp.{}.{}",
            CACHE_FILE_NAME,
            std::process::id(),
            counter
        ))
    }

    /// Returns true if `path` looks like a temp file produced by [`Self::temp_cache_file`]
    pub fn is_temp_cache_file(&self, path: &Path) -> bool {
        path.parent() == Some(self.root.as_path())
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&format!("{}.tmp.", CACHE_FILE_NAME)))
    }
}

impl Default for CachePaths {
    /// Creates a CachePaths rooted at the user's home directory
    ///
    /// Falls back to the current directory when no home directory can be determined.
    fn default() -> Self {
        Self::new(dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }
}
