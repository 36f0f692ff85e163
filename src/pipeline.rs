//! # Update Pipeline
//!
//! Runs the four stages of an update in order:
//!
//! 1. **Locate**: resolve the primary and dependency revisions.
//! 2. **Fetch**: materialize upstream working copies at those revisions, and
//!    the downstream recipe repository.
//! 3. **Describe**: compute versions, archive URLs and checksums.
//! 4. **Edit**: plan the recipe edits and, unless this is a dry run, write
//!    them.
//!
//! Each stage consumes the previous stage's output. Any error aborts the run
//! before the editor writes, so the downstream working copy is either fully
//! updated or untouched.

use std::path::PathBuf;

use log::info;

use crate::config::RunConfig;
use crate::descriptor::{
    self, ArchiveProvider, DescriptorBuilder, GitSnapshotReader, ReleaseDescriptor,
    SnapshotReader,
};
use crate::error::Result;
use crate::locator::{GitRevisionSource, RevisionSet, RevisionSource, SourceLocator};
use crate::recipe::{EditSummary, RecipeEditor};
use crate::repository::{RepositoryManager, WorkingCopy};

/// Directory under the temp dir that holds source archives
pub const ARCHIVE_DIR: &str = "archives";

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub revisions: RevisionSet,
    pub descriptor: ReleaseDescriptor,
    pub downstream: WorkingCopy,
    pub summary: EditSummary,
    /// Whether the edits were written to disk.
    pub written: bool,
}

/// One update run over injectable stage implementations.
pub struct Pipeline<'a> {
    config: &'a RunConfig,
    manager: &'a RepositoryManager,
    source: &'a dyn RevisionSource,
    snapshots: &'a dyn SnapshotReader,
    archives: &'a dyn ArchiveProvider,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a RunConfig,
        manager: &'a RepositoryManager,
        source: &'a dyn RevisionSource,
        snapshots: &'a dyn SnapshotReader,
        archives: &'a dyn ArchiveProvider,
    ) -> Self {
        Self {
            config,
            manager,
            source,
            snapshots,
            archives,
        }
    }

    pub fn run(&self) -> Result<RunReport> {
        let family = &self.config.family;

        info!("Locating {} revisions", family.primary.name);
        let revisions = SourceLocator::new(family, self.source).locate(
            self.config.pinned_revision.as_deref(),
            self.config.pair_by_timestamp,
        )?;

        info!("Fetching working copies");
        let primary = self.manager.materialize(&family.primary, &revisions.primary)?;
        let dependencies = family
            .dependencies
            .iter()
            .zip(revisions.dependencies())
            .map(|(library, revision)| self.manager.materialize(library, revision))
            .collect::<Result<Vec<_>>>()?;
        let downstream = self.manager.downstream(
            self.config.downstream_path.as_deref(),
            &family.downstream_url,
        )?;

        info!("Describing release");
        let descriptor =
            DescriptorBuilder::new(family, self.snapshots, self.archives).build(&primary, &dependencies)?;
        info!(
            "{} {} at {}",
            descriptor.primary.name,
            descriptor.version_string(),
            descriptor.source_revision()
        );

        let editor = RecipeEditor::new(family);
        let written = !self.config.dry_run;
        let summary = if written {
            editor.apply(&downstream, &descriptor)?
        } else {
            let summary = editor.plan(&downstream.path, &descriptor)?;
            info!("Dry run, no files written");
            summary
        };

        if self.config.clean {
            let mut upstream = vec![primary];
            upstream.extend(dependencies);
            self.manager.clean(&upstream)?;
        }

        Ok(RunReport {
            revisions,
            descriptor,
            downstream,
            summary,
            written,
        })
    }
}

/// Run an update with git, the system clones and the configured archive mode.
pub fn run(config: &RunConfig) -> Result<RunReport> {
    let manager = RepositoryManager::new(config.temp_dir.clone());
    let source = GitRevisionSource::new(&manager);
    let archives = descriptor::archive_provider(config.archive_mode, archive_dir(config))?;

    Pipeline::new(
        config,
        &manager,
        &source,
        &GitSnapshotReader,
        archives.as_ref(),
    )
    .run()
}

/// Where source archives are stored for `config`.
pub fn archive_dir(config: &RunConfig) -> PathBuf {
    config.temp_dir.join(ARCHIVE_DIR)
}
