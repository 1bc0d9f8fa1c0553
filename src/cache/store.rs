//! On-disk persistence of the repository index.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use repodex_types::Index;
use thiserror::Error;

use super::CachePaths;

/// Errors returned when persisting the index.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Writing or renaming the cache file failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The index could not be serialized.
    #[error("failed to serialize index: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Reads and writes the cached index at a fixed location.
#[derive(Debug, Clone)]
pub struct CacheStore {
    paths: CachePaths,
}

impl CacheStore {
    /// Create a store for the cache file described by `paths`.
    pub fn new(paths: CachePaths) -> Self {
        Self { paths }
    }

    /// Return the cache paths used by this store.
    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    /// Load the cached index.
    ///
    /// Returns `None` when the file is missing, unreadable, or not a valid
    /// index (corrupt, truncated, written by an incompatible format). Validity
    /// against the current version and bases is the caller's call.
    pub fn load(&self) -> Option<Index> {
        let path = self.paths.cache_file();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("No cache at {}", path.display());
                return None;
            }
            Err(e) => {
                log::warn!("Cannot read cache {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice::<Index>(&bytes) {
            Ok(index) => Some(index),
            Err(e) => {
                log::warn!("Ignoring unreadable cache {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Persist `index`, replacing any previous cache.
    ///
    /// The index is written to a temp file next to the cache and renamed over
    /// it, so readers see either the old or the new cache, never a partial one.
    pub fn save(&self, index: &Index) -> Result<(), StoreError> {
        fs::create_dir_all(self.paths.root())?;

        let temp_path = self.paths.temp_cache_file();
        if let Err(e) = write_index(&temp_path, index) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        // Rename is atomic on POSIX
        if let Err(e) = fs::rename(&temp_path, self.paths.cache_file()) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        log::debug!(
            "Saved index with {} repositories to {}",
            index.len(),
            self.paths.cache_file().display()
        );
        Ok(())
    }
}

fn write_index(path: &Path, index: &Index) -> Result<(), StoreError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, index)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use repodex_types::Repository;
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};

    fn test_store() -> (TempDir, CacheStore) {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(CachePaths::new(dir.path()));
        (dir, store)
    }

    fn sample_index(version: &str) -> Index {
        let repos: BTreeSet<_> = [
            Repository::new("alpha", "/src/alpha"),
            Repository::new("beta", "/src/beta"),
        ]
        .into_iter()
        .collect();
        Index::new(
            version,
            vec![
                (PathBuf::from("/src"), repos),
                (PathBuf::from("/empty"), BTreeSet::new()),
            ],
        )
    }

    #[test]
    fn test_load_missing_cache() {
        let (_dir, store) = test_store();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let (_dir, store) = test_store();
        let index = sample_index("0.1.0");

        store.save(&index).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.created_with_version(), index.created_with_version());
        assert_eq!(loaded.base_dirs(), index.base_dirs());
        assert_eq!(loaded.repos_by_base(), index.repos_by_base());
    }

    #[test]
    fn test_save_overwrites_previous_cache() {
        let (_dir, store) = test_store();
        store.save(&sample_index("0.1.0")).unwrap();
        store.save(&sample_index("0.2.0")).unwrap();

        assert_eq!(store.load().unwrap().created_with_version(), "0.2.0");
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let (dir, store) = test_store();
        store.save(&sample_index("0.1.0")).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| store.paths().is_temp_cache_file(path))
            .collect();
        assert!(leftovers.is_empty(), "unexpected temp files: {:?}", leftovers);
    }

    #[test]
    fn test_save_creates_missing_root() {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(CachePaths::new(dir.path().join("nested").join("home")));
        store.save(&sample_index("0.1.0")).unwrap();
        assert!(store.load().is_some());
    }

    #[test]
    fn test_garbage_is_a_miss() {
        let (_dir, store) = test_store();
        fs::write(store.paths().cache_file(), b"\x00\xff not json at all").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_truncated_cache_is_a_miss() {
        let (_dir, store) = test_store();
        store.save(&sample_index("0.1.0")).unwrap();

        let bytes = fs::read(store.paths().cache_file()).unwrap();
        fs::write(store.paths().cache_file(), &bytes[..bytes.len() / 2]).unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_foreign_format_is_a_miss() {
        let (_dir, store) = test_store();
        fs::write(
            store.paths().cache_file(),
            br#"{"version": 3, "entries": ["a", "b"]}"#,
        )
        .unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    #[cfg(unix)]
    fn test_cache_path_that_is_a_directory_is_a_miss() {
        let (_dir, store) = test_store();
        fs::create_dir(store.paths().cache_file()).unwrap();
        assert!(store.load().is_none());
    }
}
