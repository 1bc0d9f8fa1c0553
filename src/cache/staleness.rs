//! Age checks for cache artifacts.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// How long ago `path` was last modified. Symlinks are not followed.
///
/// An mtime in the future counts as zero age.
pub fn file_age(path: &Path) -> Option<Duration> {
    let modified = fs::symlink_metadata(path).and_then(|m| m.modified()).ok()?;
    Some(age_of(modified))
}

/// Time elapsed since `modified`, clamped at zero.
pub fn age_of(modified: SystemTime) -> Duration {
    SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO)
}

/// True when `path` was last modified more than `max_age` ago, or when its
/// age cannot be determined at all.
pub fn is_stale(path: &Path, max_age: Duration) -> bool {
    file_age(path).is_none_or(|age| age > max_age)
}

/// Returns the current Unix timestamp in seconds.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
