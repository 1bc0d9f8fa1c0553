//! Repository discovery under a base directory.
//!
//! A directory is a repository when it directly contains a `.git` entry.
//! Symlinks sitting directly in a base directory are followed once, so a base
//! can "link in" repositories that live elsewhere; deeper symlinks are ignored.
//!
//! Two interchangeable strategies implement [`RepoFinder`]:
//! - [`FindCommand`] shells out to `find`, which is much faster on big trees
//! - [`WalkFinder`] walks the tree in-process and prunes at each repository
//!
//! [`Scanner::detect`] picks one once; the rest of the crate only sees a [`Scanner`].

mod find;
mod walk;

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use repodex_types::Repository;
use thiserror::Error;

pub use find::FindCommand;
pub use walk::WalkFinder;

/// Errors returned by a discovery strategy.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Underlying IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// The external search tool could not be run.
    #[error("{command} failed: {reason}")]
    Command { command: String, reason: String },
}

/// A way of enumerating the repositories under one base directory.
pub trait RepoFinder: Send + Sync {
    /// Short strategy name for diagnostics.
    fn name(&self) -> &'static str;

    /// Find the repositories under `base`, which is canonical and a directory.
    fn find_repos(&self, base: &Path) -> Result<BTreeSet<Repository>, ScanError>;
}

/// Scans base directories with a fixed discovery strategy.
pub struct Scanner {
    finder: Box<dyn RepoFinder>,
}

impl Scanner {
    /// Create a scanner using the given strategy.
    pub fn new(finder: impl RepoFinder + 'static) -> Self {
        Self {
            finder: Box::new(finder),
        }
    }

    /// Pick the fastest strategy available on this host.
    pub fn detect() -> Self {
        match FindCommand::detect() {
            Some(find) => {
                log::debug!("Using find at {}", find.path().display());
                Self::new(find)
            }
            None => Self::new(WalkFinder::new()),
        }
    }

    /// Name of the strategy in use.
    pub fn strategy(&self) -> &'static str {
        self.finder.name()
    }

    /// Scan one base directory.
    ///
    /// Never fails: a missing or unreadable base, or a strategy error, yields no
    /// repositories and is logged.
    pub fn scan(&self, base: &Path) -> BTreeSet<Repository> {
        let canonical = match fs::canonicalize(base) {
            Ok(path) => path,
            Err(e) => {
                log::warn!("Skipping base directory {}: {}", base.display(), e);
                return BTreeSet::new();
            }
        };
        if !canonical.is_dir() {
            log::warn!("Skipping base {}: not a directory", base.display());
            return BTreeSet::new();
        }

        match self.finder.find_repos(&canonical) {
            Ok(repos) => {
                log::debug!(
                    "Found {} repositories under {} ({})",
                    repos.len(),
                    base.display(),
                    self.finder.name()
                );
                repos
            }
            Err(e) => {
                log::warn!("Scan of {} failed: {}", base.display(), e);
                BTreeSet::new()
            }
        }
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("strategy", &self.finder.name())
            .finish()
    }
}

/// True if `path` is (or links to) a directory directly containing `.git`.
fn is_repo_dir(path: &Path) -> bool {
    path.is_dir() && fs::symlink_metadata(path.join(".git")).is_ok()
}

/// Build the record for a repository directory, resolving symlinks.
fn resolve_repo(dir: &Path) -> Option<Repository> {
    match fs::canonicalize(dir) {
        Ok(path) => Some(Repository::from_dir(path)),
        Err(e) => {
            log::debug!("Cannot resolve {}: {}", dir.display(), e);
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::fs;
    use std::path::{Path, PathBuf};

    use tempfile::TempDir;

    /// On-disk layout shared by the scanner tests.
    ///
    /// ```text
    /// root/
    /// ├── base/
    /// │   ├── plain/.git/                  # repository
    /// │   ├── plain/vendored/.git/         # nested inside a repository
    /// │   ├── plain/src/main.rs
    /// │   ├── group/team/inner/.git        # deep repository, .git is a file
    /// │   ├── group/hop -> root/far        # symlink below depth 1, ignored
    /// │   ├── notes/readme.txt
    /// │   ├── linked -> root/elsewhere/target
    /// │   ├── plain-link -> root/elsewhere/plain-dir
    /// │   └── file-link -> root/elsewhere/file.txt
    /// ├── elsewhere/target/.git/
    /// ├── elsewhere/plain-dir/
    /// ├── elsewhere/file.txt
    /// └── far/sub/deep/.git/
    /// ```
    pub struct Layout {
        _dir: TempDir,
        pub root: PathBuf,
        pub base: PathBuf,
    }

    impl Layout {
        pub fn path(&self, rel: &str) -> PathBuf {
            self.root.join(rel)
        }
    }

    fn mkdirs(root: &Path, rel: &str) {
        fs::create_dir_all(root.join(rel)).unwrap();
    }

    pub fn layout() -> Layout {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();

        mkdirs(&root, "base/plain/.git/objects");
        mkdirs(&root, "base/plain/vendored/.git");
        mkdirs(&root, "base/plain/src");
        fs::write(root.join("base/plain/src/main.rs"), "fn main() {}\n").unwrap();
        mkdirs(&root, "base/group/team/inner");
        fs::write(
            root.join("base/group/team/inner/.git"),
            "gitdir: /somewhere/else\n",
        )
        .unwrap();
        mkdirs(&root, "base/notes");
        fs::write(root.join("base/notes/readme.txt"), "hi\n").unwrap();

        mkdirs(&root, "elsewhere/target/.git");
        mkdirs(&root, "elsewhere/plain-dir");
        fs::write(root.join("elsewhere/file.txt"), "x\n").unwrap();
        mkdirs(&root, "far/sub/deep/.git");

        #[cfg(unix)]
        {
            use std::os::unix::fs::symlink;
            symlink(root.join("elsewhere/target"), root.join("base/linked")).unwrap();
            symlink(root.join("elsewhere/plain-dir"), root.join("base/plain-link")).unwrap();
            symlink(root.join("elsewhere/file.txt"), root.join("base/file-link")).unwrap();
            symlink(root.join("far"), root.join("base/group/hop")).unwrap();
        }

        let base = root.join("base");
        Layout {
            _dir: dir,
            root,
            base,
        }
    }
}
