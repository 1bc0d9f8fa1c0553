//! Shared types for repodex

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A git repository discovered under a base directory.
///
/// `path` is absolute and symlink-resolved; `name` is its last component.
/// Ordering is by name, then path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Repository {
    name: String,
    path: PathBuf,
}

impl Repository {
    /// Creates a repository record from its name and path
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Creates a record named after the last component of `path`.
    ///
    /// The filesystem root has no last component and is named after the whole path.
    pub fn from_dir(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => path.display().to_string(),
        };
        Self { name, path }
    }

    /// Returns the repository name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the absolute path of the repository's working directory
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.path.display())
    }
}

/// Repositories found under one base directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseRepos {
    pub base: PathBuf,
    pub repos: BTreeSet<Repository>,
}

/// Snapshot of every repository under the configured base directories.
///
/// `repos_by_base` holds exactly one entry per element of `base_dirs`, in the
/// same order. [`Index::new`] derives `base_dirs` from the entries, so an index
/// built in-process always satisfies this; one read back from disk may not, see
/// [`Index::is_consistent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    created_with_version: String,
    base_dirs: Vec<PathBuf>,
    repos_by_base: Vec<BaseRepos>,
}

impl Index {
    /// Creates an index from per-base scan results, in configured base order.
    pub fn new(
        version: impl Into<String>,
        entries: impl IntoIterator<Item = (PathBuf, BTreeSet<Repository>)>,
    ) -> Self {
        let repos_by_base: Vec<BaseRepos> = entries
            .into_iter()
            .map(|(base, repos)| BaseRepos { base, repos })
            .collect();
        let base_dirs = repos_by_base.iter().map(|entry| entry.base.clone()).collect();

        Self {
            created_with_version: version.into(),
            base_dirs,
            repos_by_base,
        }
    }

    /// Version of the tool that produced this index
    pub fn created_with_version(&self) -> &str {
        &self.created_with_version
    }

    /// Base directories this index was built from, in scan order
    pub fn base_dirs(&self) -> &[PathBuf] {
        &self.base_dirs
    }

    /// Per-base scan results, in scan order
    pub fn repos_by_base(&self) -> &[BaseRepos] {
        &self.repos_by_base
    }

    /// Returns the repositories found under `base`, if it was scanned.
    pub fn repos_for(&self, base: &Path) -> Option<&BTreeSet<Repository>> {
        self.repos_by_base
            .iter()
            .find(|entry| entry.base == base)
            .map(|entry| &entry.repos)
    }

    /// Iterates over every repository, base by base.
    ///
    /// A repository reachable from two bases is yielded twice.
    pub fn repos(&self) -> impl Iterator<Item = &Repository> {
        self.repos_by_base.iter().flat_map(|entry| entry.repos.iter())
    }

    /// Total number of repository records across all bases
    pub fn len(&self) -> usize {
        self.repos_by_base.iter().map(|entry| entry.repos.len()).sum()
    }

    /// Returns true if no base contains any repository
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finds the first repository with exactly this name, in base order.
    pub fn find_by_name(&self, name: &str) -> Option<&Repository> {
        self.repos().find(|repo| repo.name() == name)
    }

    /// Checks that the per-base entries line up with `base_dirs`.
    pub fn is_consistent(&self) -> bool {
        self.base_dirs.len() == self.repos_by_base.len()
            && self
                .base_dirs
                .iter()
                .zip(&self.repos_by_base)
                .all(|(base, entry)| *base == entry.base)
    }

    /// Returns true if this index may be served for the given tool version and
    /// configured bases.
    ///
    /// Base comparison is order-sensitive: reordering the configuration
    /// invalidates the index.
    pub fn is_valid_for(&self, version: &str, base_dirs: &[PathBuf]) -> bool {
        self.created_with_version == version && self.base_dirs == base_dirs && self.is_consistent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(name: &str, path: &str) -> Repository {
        Repository::new(name, path)
    }

    fn sample_index() -> Index {
        let a: BTreeSet<_> = [
            repo("repoY", "/elsewhere/repoY"),
            repo("repoX", "/work/a/repoX"),
        ]
        .into_iter()
        .collect();
        Index::new(
            "1.2.3",
            vec![
                (PathBuf::from("/work/a"), a),
                (PathBuf::from("/work/b"), BTreeSet::new()),
            ],
        )
    }

    mod repository_tests {
        use super::*;

        #[test]
        fn from_dir_uses_last_component() {
            let repo = Repository::from_dir("/work/a/repoX");
            assert_eq!(repo.name(), "repoX");
            assert_eq!(repo.path(), Path::new("/work/a/repoX"));
        }

        #[test]
        fn from_dir_root_has_a_name() {
            let repo = Repository::from_dir("/");
            assert_eq!(repo.name(), "/");
        }

        #[test]
        fn ordering_is_by_name_then_path() {
            let mut repos = [
                repo("b", "/1/b"),
                repo("a", "/2/a"),
                repo("a", "/1/a"),
            ];
            repos.sort();
            assert_eq!(repos[0], repo("a", "/1/a"));
            assert_eq!(repos[1], repo("a", "/2/a"));
            assert_eq!(repos[2], repo("b", "/1/b"));
        }

        #[test]
        fn display() {
            assert_eq!(repo("x", "/w/x").to_string(), "x (/w/x)");
        }
    }

    mod index_tests {
        use super::*;

        #[test]
        fn base_dirs_follow_entry_order() {
            let index = sample_index();
            assert_eq!(
                index.base_dirs(),
                &[PathBuf::from("/work/a"), PathBuf::from("/work/b")]
            );
            assert_eq!(index.repos_by_base().len(), 2);
            assert!(index.is_consistent());
        }

        #[test]
        fn repos_for_known_and_unknown_base() {
            let index = sample_index();
            let a = index.repos_for(Path::new("/work/a")).unwrap();
            let names: Vec<_> = a.iter().map(|r| r.name()).collect();
            assert_eq!(names, vec!["repoX", "repoY"]);
            assert!(index.repos_for(Path::new("/work/b")).unwrap().is_empty());
            assert!(index.repos_for(Path::new("/work/c")).is_none());
        }

        #[test]
        fn len_and_find_by_name() {
            let index = sample_index();
            assert_eq!(index.len(), 2);
            assert!(!index.is_empty());
            assert_eq!(
                index.find_by_name("repoY").map(|r| r.path()),
                Some(Path::new("/elsewhere/repoY"))
            );
            assert!(index.find_by_name("repoZ").is_none());
        }

        #[test]
        fn empty_index() {
            let index = Index::new("1.0.0", Vec::new());
            assert!(index.is_empty());
            assert!(index.base_dirs().is_empty());
            assert!(index.is_valid_for("1.0.0", &[]));
        }

        #[test]
        fn valid_for_same_version_and_bases() {
            let index = sample_index();
            let bases = index.base_dirs().to_vec();
            assert!(index.is_valid_for("1.2.3", &bases));
        }

        #[test]
        fn invalid_after_version_bump() {
            let index = sample_index();
            let bases = index.base_dirs().to_vec();
            assert!(!index.is_valid_for("1.2.4", &bases));
        }

        #[test]
        fn invalid_after_base_reorder() {
            let index = sample_index();
            let reordered = vec![PathBuf::from("/work/b"), PathBuf::from("/work/a")];
            assert!(!index.is_valid_for("1.2.3", &reordered));
        }

        #[test]
        fn invalid_after_base_membership_change() {
            let index = sample_index();
            assert!(!index.is_valid_for("1.2.3", &[PathBuf::from("/work/a")]));
            let more = vec![
                PathBuf::from("/work/a"),
                PathBuf::from("/work/b"),
                PathBuf::from("/work/c"),
            ];
            assert!(!index.is_valid_for("1.2.3", &more));
        }

        #[test]
        fn inconsistent_index_from_disk_is_invalid() {
            let json = r#"{
                "created_with_version": "1.2.3",
                "base_dirs": ["/work/a", "/work/b"],
                "repos_by_base": [{"base": "/work/a", "repos": []}]
            }"#;
            let index: Index = serde_json::from_str(json).unwrap();
            assert!(!index.is_consistent());
            assert!(!index.is_valid_for(
                "1.2.3",
                &[PathBuf::from("/work/a"), PathBuf::from("/work/b")]
            ));
        }

        #[test]
        fn serde_preserves_everything() {
            let index = sample_index();
            let json = serde_json::to_string(&index).unwrap();
            let back: Index = serde_json::from_str(&json).unwrap();
            assert_eq!(back, index);
        }
    }
}
