//! Index cache: file locations, persistence and the rebuild lock

mod lock;
mod paths;
mod staleness;
mod store;

pub use lock::{DEFAULT_STALE_AFTER, RebuildLock};
pub use paths::CachePaths;
pub use staleness::{file_age, is_stale};
pub use store::{CacheStore, StoreError};
