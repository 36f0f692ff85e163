//! # Repository Fetcher
//!
//! This module provides the `RepositoryManager`, which materializes the
//! upstream libraries and the downstream recipe repository as local working
//! copies checked out at the revisions a run needs.
//!
//! ## Design
//!
//! As with any code that shells out to git, the manager is split from the
//! concrete git and filesystem calls through two traits:
//!
//! - **`GitOperations`**: clone, fetch, checkout and reading `HEAD`.
//! - **`CloneStore`**: where clones live under the temp directory and whether
//!   one already exists.
//!
//! `DefaultGitOperations` and `DefaultCloneStore` wrap the real `git` command
//! and the host filesystem. Tests swap in mocks to check which commands a run
//! would issue without touching the network.
//!
//! ## Reuse
//!
//! Clones are kept between runs. A second run with the same temp directory
//! fetches into the existing clone and checks out the requested revision, so
//! the resulting working copy is the same whether or not the clone existed.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::Library;
use crate::error::{Error, Result};
use crate::git::DEFAULT_BRANCH_REF;

/// Directory name of a fresh downstream clone inside the temp directory.
pub const DOWNSTREAM_DIR: &str = "conan-center-index";

/// Logical name used for the downstream repository in messages.
pub const DOWNSTREAM_NAME: &str = "conan-center-index";

/// A repository checked out on disk for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingCopy {
    /// Library or repository name, e.g. `bgfx`.
    pub name: String,
    /// Remote the working copy was cloned from. Empty for a caller-supplied
    /// downstream path.
    pub url: String,
    /// Root of the working tree.
    pub path: PathBuf,
    /// Full commit id of the checked-out `HEAD`.
    pub revision: String,
}

/// Trait for git operations - allows mocking in tests
pub trait GitOperations {
    fn clone_repo(&self, repository: &str, url: &str, target_dir: &Path, shallow: bool) -> Result<()>;

    fn fetch(&self, repository: &str, dir: &Path, shallow: bool) -> Result<()>;

    /// Check out `revision` as a detached `HEAD`.
    fn checkout(&self, repository: &str, dir: &Path, revision: &str) -> Result<()>;

    /// Drop uncommitted edits and untracked files.
    fn discard_changes(&self, repository: &str, dir: &Path) -> Result<()>;

    fn head_revision(&self, repository: &str, dir: &Path) -> Result<String>;
}

/// Locates clones under the temp directory.
pub trait CloneStore {
    /// Whether `path` already holds a clone.
    fn exists(&self, path: &Path) -> bool;

    /// Clone directory for a repository name.
    fn clone_path(&self, name: &str) -> PathBuf;

    /// Delete a clone.
    fn remove(&self, path: &Path) -> Result<()>;
}

/// The default implementation of `GitOperations`, which runs the system
/// `git` command.
pub struct DefaultGitOperations;

impl GitOperations for DefaultGitOperations {
    fn clone_repo(&self, repository: &str, url: &str, target_dir: &Path, shallow: bool) -> Result<()> {
        crate::git::clone(repository, url, target_dir, shallow)
    }

    fn fetch(&self, repository: &str, dir: &Path, shallow: bool) -> Result<()> {
        crate::git::fetch(repository, dir, shallow)
    }

    fn checkout(&self, repository: &str, dir: &Path, revision: &str) -> Result<()> {
        crate::git::checkout(repository, dir, revision)
    }

    fn discard_changes(&self, repository: &str, dir: &Path) -> Result<()> {
        crate::git::discard_changes(repository, dir)
    }

    fn head_revision(&self, repository: &str, dir: &Path) -> Result<String> {
        crate::git::head_revision(repository, dir)
    }
}

/// The default implementation of `CloneStore`, rooted at the run's temp
/// directory.
pub struct DefaultCloneStore {
    root: PathBuf,
}

impl DefaultCloneStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl CloneStore for DefaultCloneStore {
    fn exists(&self, path: &Path) -> bool {
        path.join(".git").exists()
    }

    fn clone_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn remove(&self, path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_dir_all(path)?;
        }
        Ok(())
    }
}

/// Materializes working copies for a run.
pub struct RepositoryManager {
    git_ops: Box<dyn GitOperations>,
    store: Box<dyn CloneStore>,
}

impl RepositoryManager {
    /// Creates a manager that clones into `temp_dir` with the system git.
    pub fn new(temp_dir: PathBuf) -> Self {
        Self {
            git_ops: Box::new(DefaultGitOperations),
            store: Box::new(DefaultCloneStore::new(temp_dir)),
        }
    }

    /// Creates a manager with custom `GitOperations` and `CloneStore`
    /// implementations.
    pub fn with_operations(git_ops: Box<dyn GitOperations>, store: Box<dyn CloneStore>) -> Self {
        Self { git_ops, store }
    }

    /// Clone directory of an upstream library.
    pub fn clone_path(&self, library: &Library) -> PathBuf {
        self.store.clone_path(&library.name)
    }

    /// Make sure a full clone of `library` exists and is up to date with its
    /// remote, without changing what is checked out.
    pub fn prepare(&self, library: &Library) -> Result<PathBuf> {
        let path = self.clone_path(library);

        if self.store.exists(&path) {
            debug!("Fetching {} into {}", library.name, path.display());
            self.git_ops.fetch(&library.name, &path, false)?;
        } else {
            info!("Cloning {} from {}", library.name, library.url);
            self.git_ops.clone_repo(&library.name, &library.url, &path, false)?;
        }

        Ok(path)
    }

    /// Clone or update `library` and check out `revision`.
    pub fn materialize(&self, library: &Library, revision: &str) -> Result<WorkingCopy> {
        let path = self.prepare(library)?;
        self.checkout_at(library, path, revision)
    }

    /// Check out `revision` in an already prepared clone.
    pub fn checkout_at(
        &self,
        library: &Library,
        path: PathBuf,
        revision: &str,
    ) -> Result<WorkingCopy> {
        self.git_ops.checkout(&library.name, &path, revision)?;
        let head = self.git_ops.head_revision(&library.name, &path)?;
        info!("{} checked out at {}", library.name, head);

        Ok(WorkingCopy {
            name: library.name.clone(),
            url: library.url.clone(),
            path,
            revision: head,
        })
    }

    /// The downstream recipe repository.
    ///
    /// An `existing` path is used in place with no remote validation.
    /// Otherwise the canonical repository at `url` is shallow-cloned into the
    /// temp directory, or reset to its default branch head if a previous run
    /// already cloned it. Edits left in that clone by earlier runs are
    /// discarded.
    pub fn downstream(&self, existing: Option<&Path>, url: &str) -> Result<WorkingCopy> {
        if let Some(path) = existing {
            if !path.is_dir() {
                return Err(Error::Fetch {
                    repository: DOWNSTREAM_NAME.to_string(),
                    command: format!("open {}", path.display()),
                    stderr: "directory does not exist".to_string(),
                });
            }
            let revision = self.git_ops.head_revision(DOWNSTREAM_NAME, path)?;
            info!("Using {} at {}", DOWNSTREAM_NAME, path.display());
            return Ok(WorkingCopy {
                name: DOWNSTREAM_NAME.to_string(),
                url: String::new(),
                path: path.to_path_buf(),
                revision,
            });
        }

        let path = self.store.clone_path(DOWNSTREAM_DIR);
        if self.store.exists(&path) {
            debug!("Refreshing {} in {}", DOWNSTREAM_NAME, path.display());
            self.git_ops.fetch(DOWNSTREAM_NAME, &path, true)?;
            self.git_ops.discard_changes(DOWNSTREAM_NAME, &path)?;
            self.git_ops
                .checkout(DOWNSTREAM_NAME, &path, DEFAULT_BRANCH_REF)?;
        } else {
            info!("Cloning {} from {}", DOWNSTREAM_NAME, url);
            self.git_ops.clone_repo(DOWNSTREAM_NAME, url, &path, true)?;
        }

        let revision = self.git_ops.head_revision(DOWNSTREAM_NAME, &path)?;
        Ok(WorkingCopy {
            name: DOWNSTREAM_NAME.to_string(),
            url: url.to_string(),
            path,
            revision,
        })
    }

    /// Remove upstream clones once a run no longer needs them.
    pub fn clean(&self, copies: &[WorkingCopy]) -> Result<()> {
        for copy in copies {
            debug!("Removing {}", copy.path.display());
            self.store.remove(&copy.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};
    use std::rc::Rc;

    /// Records every git call and simulates clones in memory.
    #[derive(Clone, Default)]
    pub(crate) struct MockGit {
        pub calls: Rc<RefCell<Vec<String>>>,
        /// Clone directories that exist, shared with `MockStore`.
        pub cloned: Rc<RefCell<HashSet<PathBuf>>>,
        /// Current HEAD per clone directory.
        pub heads: Rc<RefCell<HashMap<PathBuf, String>>>,
        /// Revisions checkout refuses, with the stderr to report.
        pub bad_revisions: Rc<RefCell<HashMap<String, String>>>,
    }

    impl MockGit {
        pub fn fail_checkout_of(&self, revision: &str, stderr: &str) {
            self.bad_revisions
                .borrow_mut()
                .insert(revision.to_string(), stderr.to_string());
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl GitOperations for MockGit {
        fn clone_repo(&self, repository: &str, url: &str, target_dir: &Path, shallow: bool) -> Result<()> {
            self.calls
                .borrow_mut()
                .push(format!("clone {} {} shallow={}", repository, url, shallow));
            self.cloned.borrow_mut().insert(target_dir.to_path_buf());
            self.heads
                .borrow_mut()
                .insert(target_dir.to_path_buf(), format!("{}-default-head", repository));
            Ok(())
        }

        fn fetch(&self, repository: &str, _dir: &Path, shallow: bool) -> Result<()> {
            self.calls
                .borrow_mut()
                .push(format!("fetch {} shallow={}", repository, shallow));
            Ok(())
        }

        fn checkout(&self, repository: &str, dir: &Path, revision: &str) -> Result<()> {
            self.calls
                .borrow_mut()
                .push(format!("checkout {} {}", repository, revision));
            if let Some(stderr) = self.bad_revisions.borrow().get(revision) {
                return Err(Error::Fetch {
                    repository: repository.to_string(),
                    command: format!("checkout --detach {}", revision),
                    stderr: stderr.clone(),
                });
            }
            self.heads
                .borrow_mut()
                .insert(dir.to_path_buf(), revision.to_string());
            Ok(())
        }

        fn discard_changes(&self, repository: &str, _dir: &Path) -> Result<()> {
            self.calls
                .borrow_mut()
                .push(format!("discard {}", repository));
            Ok(())
        }

        fn head_revision(&self, repository: &str, dir: &Path) -> Result<String> {
            self.heads
                .borrow()
                .get(dir)
                .cloned()
                .ok_or_else(|| Error::Fetch {
                    repository: repository.to_string(),
                    command: "rev-parse HEAD".to_string(),
                    stderr: "fatal: not a git repository".to_string(),
                })
        }
    }

    pub(crate) struct MockStore {
        root: PathBuf,
        cloned: Rc<RefCell<HashSet<PathBuf>>>,
    }

    impl MockStore {
        pub fn new(git: &MockGit) -> Self {
            Self {
                root: PathBuf::from("/mock/tmp"),
                cloned: git.cloned.clone(),
            }
        }
    }

    impl CloneStore for MockStore {
        fn exists(&self, path: &Path) -> bool {
            self.cloned.borrow().contains(path)
        }

        fn clone_path(&self, name: &str) -> PathBuf {
            self.root.join(name)
        }

        fn remove(&self, path: &Path) -> Result<()> {
            self.cloned.borrow_mut().remove(path);
            Ok(())
        }
    }

    pub(crate) fn mock_manager() -> (RepositoryManager, MockGit) {
        let git = MockGit::default();
        let store = MockStore::new(&git);
        (
            RepositoryManager::with_operations(Box::new(git.clone()), Box::new(store)),
            git,
        )
    }

    fn bx() -> Library {
        Library::new("bx", "https://github.com/bkaradzic/bx.git")
    }

    #[test]
    fn test_materialize_clones_when_missing() {
        let (manager, git) = mock_manager();

        let copy = manager.materialize(&bx(), "abc123").unwrap();

        assert_eq!(copy.name, "bx");
        assert_eq!(copy.path, PathBuf::from("/mock/tmp/bx"));
        assert_eq!(copy.revision, "abc123");
        assert_eq!(
            git.calls(),
            vec![
                "clone bx https://github.com/bkaradzic/bx.git shallow=false",
                "checkout bx abc123",
            ]
        );
    }

    #[test]
    fn test_materialize_fetches_existing_clone() {
        let (manager, git) = mock_manager();
        git.cloned
            .borrow_mut()
            .insert(PathBuf::from("/mock/tmp/bx"));

        manager.materialize(&bx(), "abc123").unwrap();

        assert_eq!(
            git.calls(),
            vec!["fetch bx shallow=false", "checkout bx abc123"]
        );
    }

    #[test]
    fn test_materialize_twice_is_idempotent() {
        let (manager, _git) = mock_manager();

        let first = manager.materialize(&bx(), "abc123").unwrap();
        let second = manager.materialize(&bx(), "abc123").unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_checkout_failure_is_fetch_error() {
        let (manager, git) = mock_manager();
        git.fail_checkout_of("nope", "fatal: reference is not a tree: nope");

        let err = manager.materialize(&bx(), "nope").unwrap_err();

        assert!(matches!(err, Error::Fetch { .. }));
        assert!(err.to_string().contains("reference is not a tree"));
        assert!(err.to_string().contains("bx"));
    }

    #[test]
    fn test_downstream_fresh_clone_is_shallow() {
        let (manager, git) = mock_manager();

        let copy = manager
            .downstream(None, "https://github.com/conan-io/conan-center-index.git")
            .unwrap();

        assert_eq!(copy.path, PathBuf::from("/mock/tmp/conan-center-index"));
        assert_eq!(
            git.calls(),
            vec!["clone conan-center-index https://github.com/conan-io/conan-center-index.git shallow=true"]
        );
    }

    #[test]
    fn test_downstream_existing_clone_is_refreshed() {
        let (manager, git) = mock_manager();
        git.cloned
            .borrow_mut()
            .insert(PathBuf::from("/mock/tmp/conan-center-index"));

        manager
            .downstream(None, "https://github.com/conan-io/conan-center-index.git")
            .unwrap();

        assert_eq!(
            git.calls(),
            vec![
                "fetch conan-center-index shallow=true",
                "discard conan-center-index",
                format!("checkout conan-center-index {}", DEFAULT_BRANCH_REF).as_str(),
            ]
        );
    }

    #[test]
    fn test_downstream_missing_path_fails() {
        let (manager, git) = mock_manager();

        let err = manager
            .downstream(Some(Path::new("/definitely/not/here")), "unused")
            .unwrap_err();

        assert!(matches!(err, Error::Fetch { .. }));
        assert!(git.calls().is_empty());
    }

    #[test]
    fn test_clean_removes_clones() {
        let (manager, git) = mock_manager();
        let copy = manager.materialize(&bx(), "abc123").unwrap();

        manager.clean(&[copy]).unwrap();

        assert!(git.cloned.borrow().is_empty());
    }
}
