//! Serving the index: cache first, rebuild in the background.
//!
//! [`Indexer::index`] returns a cached index when it was built by this version
//! from the same base directories, and kicks off a background rebuild so the
//! next call sees fresh results. Otherwise it scans synchronously. At most one
//! background rebuild runs at a time, enforced by [`RebuildLock`].

mod spawn;

use std::path::PathBuf;
use std::sync::Arc;

use repodex_types::Index;

use crate::cache::{CacheStore, RebuildLock};
use crate::config::Config;
use crate::scan::Scanner;

pub use spawn::{ProcessSpawner, REBUILD_SUBCOMMAND, Spawn, ThreadSpawner, lower_priority};

/// Scan every base in order and assemble an index.
pub fn build_index(scanner: &Scanner, base_dirs: &[PathBuf], version: &str) -> Index {
    Index::new(
        version,
        base_dirs
            .iter()
            .map(|base| (base.clone(), scanner.scan(base))),
    )
}

/// Result of a background rebuild attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// A fresh index was built and saved.
    Rebuilt,
    /// Another rebuild holds the lock; nothing was done.
    Skipped,
    /// The lock could not be taken or the index could not be saved.
    Failed,
}

/// Everything a rebuild needs, shareable with a background thread.
#[derive(Debug)]
pub struct RebuildJob {
    config: Config,
    scanner: Scanner,
    store: CacheStore,
}

impl RebuildJob {
    /// Create a rebuild job for `config`, scanning with `scanner`.
    pub fn new(config: Config, scanner: Scanner) -> Self {
        let store = CacheStore::new(config.paths.clone());
        Self {
            config,
            scanner,
            store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Build and persist a fresh index without taking the lock.
    ///
    /// A failed save is logged; the index is returned either way.
    pub fn run(&self) -> Index {
        let index = build_index(&self.scanner, &self.config.base_dirs, &self.config.version);
        if let Err(e) = self.store.save(&index) {
            log::warn!("Failed to save index cache: {}", e);
        }
        index
    }

    /// Build and persist a fresh index unless another rebuild is running.
    ///
    /// The lock is released on every path out, including panics during the scan.
    pub fn run_locked(&self) -> RebuildOutcome {
        let lock_path = self.config.paths.lock_file();
        let _lock = match RebuildLock::try_acquire(&lock_path, self.config.stale_lock_after) {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                log::debug!("Rebuild already running, skipping");
                return RebuildOutcome::Skipped;
            }
            Err(e) => {
                log::warn!("Cannot take rebuild lock {}: {}", lock_path.display(), e);
                return RebuildOutcome::Failed;
            }
        };

        let index = build_index(&self.scanner, &self.config.base_dirs, &self.config.version);
        match self.store.save(&index) {
            Ok(()) => {
                log::info!("Rebuilt index: {} repositories", index.len());
                RebuildOutcome::Rebuilt
            }
            Err(e) => {
                log::warn!("Failed to save rebuilt index: {}", e);
                RebuildOutcome::Failed
            }
        }
    }
}

/// Entry point for callers that want the repository index.
pub struct Indexer {
    job: Arc<RebuildJob>,
    spawner: Box<dyn Spawn>,
}

impl Indexer {
    /// Create an indexer; `spawner` launches the background rebuilds.
    pub fn new(config: Config, scanner: Scanner, spawner: impl Spawn + 'static) -> Self {
        Self {
            job: Arc::new(RebuildJob::new(config, scanner)),
            spawner: Box::new(spawner),
        }
    }

    /// The rebuild job backing this indexer.
    pub fn job(&self) -> &Arc<RebuildJob> {
        &self.job
    }

    /// Load the cache and return it only if it may be served.
    pub fn cached(&self) -> Option<Index> {
        let config = self.job.config();
        let index = self.job.store().load()?;
        if index.is_valid_for(&config.version, &config.base_dirs) {
            Some(index)
        } else {
            log::info!(
                "Cached index is out of date (built by {})",
                index.created_with_version()
            );
            None
        }
    }

    /// Return the repository index.
    ///
    /// Serves a valid cache immediately and refreshes it in the background;
    /// otherwise scans every base before returning. Never fails.
    pub fn index(&self) -> Index {
        if let Some(index) = self.cached() {
            if let Err(e) = self.spawner.spawn_rebuild(&self.job) {
                log::warn!("Could not start background rebuild: {}", e);
            }
            return index;
        }

        eprintln!("Indexing... This should only happen after updating or changing base directories.");
        self.job.run()
    }

    /// Scan synchronously and replace the cache, ignoring what is cached.
    pub fn reindex(&self) -> Index {
        self.job.run()
    }
}
