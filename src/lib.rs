//! Cached index of the git repositories under a set of base directories

pub mod cache;
pub mod config;
pub mod refresh;
pub mod scan;

pub use config::Config;
pub use refresh::{Indexer, RebuildJob, RebuildOutcome};
pub use repodex_types::{BaseRepos, Index, Repository};
pub use scan::Scanner;
