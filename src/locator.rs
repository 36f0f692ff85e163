//! # Source Locator
//!
//! Decides which revision of each upstream library a run packages.
//!
//! - Without a pinned primary revision, every library is taken at the head of
//!   its default branch, each resolved independently with `git ls-remote`.
//! - With a pinned primary revision, the dependency revisions come from the
//!   compatibility manifest recorded inside the primary tree at that revision.
//!   A missing or incomplete manifest is an error: picking unrelated
//!   dependency revisions would produce a recipe that does not build.
//! - `--pair-by-timestamp` instead takes, for each dependency, the last commit
//!   on its default branch made no later than the pinned primary commit.
//!
//! Reads go through the [`RevisionSource`] trait so the locator can be tested
//! without git or network access. [`revisions_from_manifest`] is the pure
//! part: manifest text in, revision set out.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

use log::{debug, info};
use serde_yaml::Value as YamlValue;

use crate::config::{Library, PackageFamily};
use crate::error::{Error, Result};
use crate::git;
use crate::repository::RepositoryManager;

/// How a [`RevisionSet`] was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Default-branch heads of all three repositories.
    Latest,
    /// Pinned primary plus the pairing from its compatibility manifest.
    Manifest,
    /// Pinned primary plus dependency commits made no later than it.
    Timestamp,
}

/// The revisions of the three upstream libraries packaged together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionSet {
    pub primary: String,
    /// Revision of the first configured dependency (bx).
    pub dependency_a: String,
    /// Revision of the second configured dependency (bimg).
    pub dependency_b: String,
    pub resolution: Resolution,
}

impl RevisionSet {
    /// Dependency revisions in configuration order.
    pub fn dependencies(&self) -> [&str; 2] {
        [self.dependency_a.as_str(), self.dependency_b.as_str()]
    }
}

/// Read access to upstream repositories.
pub trait RevisionSource {
    /// Head revision of the library's default branch.
    fn latest(&self, library: &Library) -> Result<String>;

    /// Contents of `path` at `revision`, or `None` if the snapshot has no
    /// such file.
    fn read_file(&self, library: &Library, revision: &str, path: &str) -> Result<Option<String>>;

    /// Commit time of `revision`, in seconds since the epoch.
    fn commit_time(&self, library: &Library, revision: &str) -> Result<i64>;

    /// Last default-branch commit made at or before `timestamp`.
    fn last_commit_before(&self, library: &Library, timestamp: i64) -> Result<Option<String>>;
}

/// `RevisionSource` backed by `git` and the run's clones.
pub struct GitRevisionSource<'a> {
    manager: &'a RepositoryManager,
    prepared: RefCell<HashMap<String, PathBuf>>,
}

impl<'a> GitRevisionSource<'a> {
    pub fn new(manager: &'a RepositoryManager) -> Self {
        Self {
            manager,
            prepared: RefCell::new(HashMap::new()),
        }
    }

    /// Clone or fetch `library` once per run.
    fn clone_of(&self, library: &Library) -> Result<PathBuf> {
        if let Some(path) = self.prepared.borrow().get(&library.name) {
            return Ok(path.clone());
        }
        let path = self.manager.prepare(library)?;
        self.prepared
            .borrow_mut()
            .insert(library.name.clone(), path.clone());
        Ok(path)
    }
}

impl RevisionSource for GitRevisionSource<'_> {
    fn latest(&self, library: &Library) -> Result<String> {
        git::remote_head(&library.name, &library.url)
    }

    fn read_file(&self, library: &Library, revision: &str, path: &str) -> Result<Option<String>> {
        let dir = self.clone_of(library)?;
        // An unknown revision is a fetch problem, not a missing manifest.
        let commit = git::resolve_revision(&library.name, &dir, revision)?;
        git::show_file(&library.name, &dir, &commit, path)
    }

    fn commit_time(&self, library: &Library, revision: &str) -> Result<i64> {
        let dir = self.clone_of(library)?;
        git::commit_timestamp(&library.name, &dir, revision)
    }

    fn last_commit_before(&self, library: &Library, timestamp: i64) -> Result<Option<String>> {
        let dir = self.clone_of(library)?;
        git::last_commit_before(&library.name, &dir, git::DEFAULT_BRANCH_REF, timestamp)
    }
}

/// Resolves the [`RevisionSet`] for a run.
pub struct SourceLocator<'a> {
    family: &'a PackageFamily,
    source: &'a dyn RevisionSource,
}

impl<'a> SourceLocator<'a> {
    pub fn new(family: &'a PackageFamily, source: &'a dyn RevisionSource) -> Self {
        Self { family, source }
    }

    /// Resolve revisions for an optional pinned primary revision.
    pub fn locate(&self, pinned: Option<&str>, pair_by_timestamp: bool) -> Result<RevisionSet> {
        match pinned {
            None => self.latest(),
            Some(revision) if pair_by_timestamp => self.by_timestamp(revision),
            Some(revision) => self.from_manifest(revision),
        }
    }

    fn latest(&self) -> Result<RevisionSet> {
        let primary = self.source.latest(&self.family.primary)?;
        let dependency_a = self.source.latest(&self.family.dependencies[0])?;
        let dependency_b = self.source.latest(&self.family.dependencies[1])?;
        info!(
            "Using latest revisions: {}={} {}={} {}={}",
            self.family.primary.name,
            primary,
            self.family.dependencies[0].name,
            dependency_a,
            self.family.dependencies[1].name,
            dependency_b
        );

        Ok(RevisionSet {
            primary,
            dependency_a,
            dependency_b,
            resolution: Resolution::Latest,
        })
    }

    fn from_manifest(&self, revision: &str) -> Result<RevisionSet> {
        let manifest_path = &self.family.manifest_path;
        debug!(
            "Reading {} from {}@{}",
            manifest_path, self.family.primary.name, revision
        );

        let manifest = self
            .source
            .read_file(&self.family.primary, revision, manifest_path)?
            .ok_or_else(|| Error::IncompatibleRevision {
                revision: revision.to_string(),
                message: format!(
                    "{} has no compatibility manifest at {}",
                    self.family.primary.name, manifest_path
                ),
            })?;

        let set = revisions_from_manifest(revision, &manifest, self.family.dependency_names())?;
        info!(
            "Compatibility manifest pairs {}@{} with {}",
            self.family.primary.name,
            revision,
            describe_pairing(self.family, &set)
        );
        Ok(set)
    }

    fn by_timestamp(&self, revision: &str) -> Result<RevisionSet> {
        let timestamp = self.source.commit_time(&self.family.primary, revision)?;
        let mut paired = Vec::with_capacity(2);

        for dependency in &self.family.dependencies {
            let commit = self
                .source
                .last_commit_before(dependency, timestamp)?
                .ok_or_else(|| Error::IncompatibleRevision {
                    revision: revision.to_string(),
                    message: format!(
                        "{} has no commit on its default branch at or before {}",
                        dependency.name, timestamp
                    ),
                })?;
            paired.push(commit);
        }

        let dependency_b = paired.pop().unwrap_or_default();
        let dependency_a = paired.pop().unwrap_or_default();
        let set = RevisionSet {
            primary: revision.to_string(),
            dependency_a,
            dependency_b,
            resolution: Resolution::Timestamp,
        };
        info!(
            "Paired {}@{} by commit time with {}",
            self.family.primary.name,
            revision,
            describe_pairing(self.family, &set)
        );
        Ok(set)
    }
}

fn describe_pairing(family: &PackageFamily, set: &RevisionSet) -> String {
    family
        .dependency_names()
        .iter()
        .zip(set.dependencies())
        .map(|(name, revision)| format!("{}@{}", name, revision))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build a revision set from compatibility manifest text.
///
/// The manifest is a YAML mapping from dependency name to revision, either at
/// the top level or under a `dependencies:` key. A value may be a revision
/// string, a number, or a mapping with a `revision` field:
///
/// ```yaml
/// dependencies:
///   bx: 1a2b3c4d
///   bimg:
///     revision: 5e6f7a8b
/// ```
pub fn revisions_from_manifest(
    pinned: &str,
    manifest: &str,
    dependency_names: [&str; 2],
) -> Result<RevisionSet> {
    let incompatible = |message: String| Error::IncompatibleRevision {
        revision: pinned.to_string(),
        message,
    };

    let document: YamlValue = serde_yaml::from_str(manifest)
        .map_err(|e| incompatible(format!("invalid compatibility manifest: {}", e)))?;

    let entries = match document.get("dependencies") {
        Some(nested) if nested.is_mapping() => nested,
        _ => &document,
    };
    if !entries.is_mapping() {
        return Err(incompatible(
            "compatibility manifest is not a mapping of dependency revisions".to_string(),
        ));
    }

    let revision_of = |name: &str| -> Result<String> {
        let value = entries.get(name).map(|v| match v.get("revision") {
            Some(inner) => inner,
            None => v,
        });
        match value.and_then(scalar_to_string) {
            Some(revision) if !revision.is_empty() => Ok(revision),
            _ => Err(incompatible(format!(
                "compatibility manifest does not name a revision for {}",
                name
            ))),
        }
    };

    Ok(RevisionSet {
        primary: pinned.to_string(),
        dependency_a: revision_of(dependency_names[0])?,
        dependency_b: revision_of(dependency_names[1])?,
        resolution: Resolution::Manifest,
    })
}

fn scalar_to_string(value: &YamlValue) -> Option<String> {
    match value {
        YamlValue::String(s) => Some(s.trim().to_string()),
        YamlValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
