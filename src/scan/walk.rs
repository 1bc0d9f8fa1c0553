//! In-process fallback discovery.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Once;

use repodex_types::Repository;
use walkdir::WalkDir;

use super::{RepoFinder, ScanError, is_repo_dir, resolve_repo};

static SLOW_SCAN_WARNING: Once = Once::new();

/// Recursive walk used when `find` is unavailable.
///
/// Symlinks are not followed, except those directly inside the base, which
/// are resolved and tested like a directory. The walk never descends into a
/// repository, so nested repositories are not reported.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalkFinder;

impl WalkFinder {
    pub fn new() -> Self {
        Self
    }
}

impl RepoFinder for WalkFinder {
    fn name(&self) -> &'static str {
        "walk"
    }

    fn find_repos(&self, base: &Path) -> Result<BTreeSet<Repository>, ScanError> {
        SLOW_SCAN_WARNING.call_once(|| {
            eprintln!("WARNING: repodex is indexing slowly, please install the 'find' command.");
        });

        let mut repos = BTreeSet::new();
        let mut walker = WalkDir::new(base).follow_links(false).into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::debug!("Skipping unreadable path: {}", e);
                    continue;
                }
            };

            if entry.path_is_symlink() {
                if entry.depth() == 1 && is_repo_dir(entry.path()) {
                    repos.extend(resolve_repo(entry.path()));
                }
                continue;
            }

            if entry.file_type().is_dir() && is_repo_dir(entry.path()) {
                repos.extend(resolve_repo(entry.path()));
                walker.skip_current_dir();
            }
        }

        Ok(repos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::fixtures;
    use std::fs;

    fn names(repos: &BTreeSet<Repository>) -> Vec<&str> {
        repos.iter().map(|r| r.name()).collect()
    }

    #[test]
    fn test_finds_plain_and_deep_repos() {
        let layout = fixtures::layout();
        let repos = WalkFinder::new().find_repos(&layout.base).unwrap();

        assert!(repos.contains(&Repository::from_dir(layout.path("base/plain"))));
        assert!(repos.contains(&Repository::from_dir(layout.path("base/group/team/inner"))));
    }

    #[test]
    fn test_does_not_descend_into_repos() {
        let layout = fixtures::layout();
        let repos = WalkFinder::new().find_repos(&layout.base).unwrap();

        assert!(repos.iter().all(|r| r.name() != "vendored"));
        assert!(repos.iter().all(|r| !r.path().ends_with(".git")));
    }

    #[test]
    #[cfg(unix)]
    fn test_follows_symlinks_at_depth_one_only() {
        let layout = fixtures::layout();
        let repos = WalkFinder::new().find_repos(&layout.base).unwrap();

        assert_eq!(names(&repos), vec!["inner", "plain", "target"]);
        let linked = repos.iter().find(|r| r.name() == "target").unwrap();
        assert_eq!(linked.path(), layout.path("elsewhere/target"));
        assert!(repos.iter().all(|r| !r.path().starts_with(layout.path("far"))));
    }

    #[test]
    fn test_base_that_is_a_repo() {
        let dir = tempfile::tempdir().unwrap();
        let base = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir(base.join(".git")).unwrap();
        fs::create_dir_all(base.join("child/.git")).unwrap();

        let repos = WalkFinder::new().find_repos(&base).unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos.iter().next().unwrap().path(), base.as_path());
    }

    #[test]
    fn test_missing_base_is_empty() {
        let repos = WalkFinder::new()
            .find_repos(Path::new("/nonexistent/base/dir"))
            .unwrap();
        assert!(repos.is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_unreadable_subdir_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let base = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir_all(base.join("ok/.git")).unwrap();
        fs::create_dir_all(base.join("locked/hidden/.git")).unwrap();
        fs::set_permissions(base.join("locked"), fs::Permissions::from_mode(0o000)).unwrap();

        let repos = WalkFinder::new().find_repos(&base).unwrap();
        fs::set_permissions(base.join("locked"), fs::Permissions::from_mode(0o755)).unwrap();

        assert!(repos.contains(&Repository::from_dir(base.join("ok"))));
    }
}
