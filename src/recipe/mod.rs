//! # Recipe Editor
//!
//! Adds a release of the package family to a conan-center-index working copy.
//!
//! For every library `<lib>` of the family the editor touches:
//!
//! - `recipes/<lib>/config.yml`: a `versions:` entry pointing at the recipe
//!   folder.
//! - `recipes/<lib>/<folder>/conandata.yml`: a `sources:` entry with the
//!   archive URL and SHA-256.
//!
//! and for the primary library only, the dependency version tables of
//! `recipes/<lib>/<folder>/conanfile.py` (see [`conanfile`]).
//!
//! Edits are computed in memory by [`RecipeEditor::plan`] and only written by
//! [`EditSummary::write`] once every file has been planned and validated, so a
//! failing run leaves the working copy as it found it.

pub mod conanfile;
pub mod yaml_map;

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::config::PackageFamily;
use crate::descriptor::{LibraryRelease, ReleaseDescriptor};
use crate::error::{Error, Result};
use crate::repository::WorkingCopy;

use self::conanfile::TableEdit;
use self::yaml_map::MappingSection;

/// Top-level mapping of `config.yml`
const VERSIONS_SECTION: &str = "versions";

/// Top-level mapping of `conandata.yml`
const SOURCES_SECTION: &str = "sources";

/// Planned new content of one recipe file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEdit {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Path relative to the downstream root, as shown to the operator.
    pub relative: String,
    original: String,
    pub updated: String,
    /// One line per change, e.g. `sources: + "8980"`.
    pub changes: Vec<String>,
}

impl FileEdit {
    pub fn is_changed(&self) -> bool {
        self.original != self.updated
    }

    pub fn original(&self) -> &str {
        &self.original
    }
}

/// Result of planning a release: the file edits plus what was left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditSummary {
    pub edits: Vec<FileEdit>,
    /// Dependency entries that were already present with the same checksum.
    pub skipped: Vec<String>,
    /// Non-fatal problems, such as a recipe without a version table.
    pub warnings: Vec<String>,
}

impl EditSummary {
    /// Files whose content differs from what is on disk.
    pub fn changed_files(&self) -> impl Iterator<Item = &FileEdit> {
        self.edits.iter().filter(|e| e.is_changed())
    }

    pub fn is_empty(&self) -> bool {
        self.changed_files().next().is_none()
    }

    /// Write every changed file.
    ///
    /// Each file is written to a sibling temporary file and renamed over the
    /// original.
    pub fn write(&self) -> Result<()> {
        for edit in self.changed_files() {
            let file_name = edit
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let staging = edit.path.with_file_name(format!(".{}.tmp", file_name));
            fs::write(&staging, &edit.updated)?;
            fs::rename(&staging, &edit.path)?;
            debug!("Wrote {}", edit.path.display());
        }
        Ok(())
    }

    /// Index of the edit for `relative`, loading the file on first use.
    fn load(&mut self, root: &Path, relative: &str) -> Result<usize> {
        if let Some(index) = self.edits.iter().position(|e| e.relative == relative) {
            return Ok(index);
        }
        let path = root.join(relative);
        let original = fs::read_to_string(&path).map_err(|e| Error::Recipe {
            path: relative.to_string(),
            message: format!("cannot read file: {}", e),
        })?;
        self.edits.push(FileEdit {
            path,
            relative: relative.to_string(),
            updated: original.clone(),
            original,
            changes: Vec::new(),
        });
        Ok(self.edits.len() - 1)
    }
}

fn recipe_error(relative: &str, message: String) -> Error {
    Error::Recipe {
        path: relative.to_string(),
        message,
    }
}

fn section_of(edit: &FileEdit, section: &str) -> Result<MappingSection> {
    MappingSection::parse(&edit.updated, section).map_err(|m| recipe_error(&edit.relative, m))
}

/// Splice a new entry into `section` and check the result.
fn insert_entry(
    edit: &mut FileEdit,
    section: &str,
    key: &str,
    fields: &[(&str, String)],
) -> Result<()> {
    let mapping = section_of(edit, section)?;
    let insertion = mapping.insert(&edit.updated, key, fields);
    yaml_map::verify_single_insertion(&edit.updated, &insertion.updated, section, key)
        .map_err(|m| recipe_error(&edit.relative, m))?;

    debug!(
        "{}: inserting {} entry {} at byte {}",
        edit.relative, section, key, insertion.offset
    );
    edit.updated = insertion.updated;
    edit.changes.push(format!("{}: + \"{}\"", section, key));
    Ok(())
}

/// Recorded sha256 of `version` in a conandata edit, if the version is listed.
fn recorded_sha256(edit: &FileEdit, version: &str) -> Result<Option<Option<String>>> {
    if !section_of(edit, SOURCES_SECTION)?.contains(version) {
        return Ok(None);
    }
    let sha = yaml_map::field_value(&edit.updated, SOURCES_SECTION, version, "sha256")
        .map_err(|m| recipe_error(&edit.relative, m))?;
    Ok(Some(sha))
}

/// Plans and applies recipe edits for one release of a package family.
pub struct RecipeEditor<'a> {
    family: &'a PackageFamily,
}

impl<'a> RecipeEditor<'a> {
    pub fn new(family: &'a PackageFamily) -> Self {
        Self { family }
    }

    fn config_path(&self, library: &str) -> String {
        format!("recipes/{}/config.yml", library)
    }

    fn conandata_path(&self, library: &str) -> String {
        format!(
            "recipes/{}/{}/conandata.yml",
            library, self.family.recipe_folder
        )
    }

    fn conanfile_path(&self, library: &str) -> String {
        format!(
            "recipes/{}/{}/conanfile.py",
            library, self.family.recipe_folder
        )
    }

    /// Plan and write the edits for `descriptor`.
    pub fn apply(
        &self,
        downstream: &WorkingCopy,
        descriptor: &ReleaseDescriptor,
    ) -> Result<EditSummary> {
        let summary = self.plan(&downstream.path, descriptor)?;
        summary.write()?;
        info!(
            "Updated {} recipe file(s) in {}",
            summary.changed_files().count(),
            downstream.path.display()
        );
        Ok(summary)
    }

    /// Compute every edit for `descriptor` without touching the disk.
    pub fn plan(&self, root: &Path, descriptor: &ReleaseDescriptor) -> Result<EditSummary> {
        let mut summary = EditSummary::default();

        self.plan_primary(&mut summary, root, &descriptor.primary)?;
        self.plan_dependency_tables(&mut summary, root, descriptor)?;
        for release in &descriptor.dependencies {
            self.plan_dependency(&mut summary, root, release)?;
        }

        Ok(summary)
    }

    fn version_fields(&self) -> Vec<(&'static str, String)> {
        vec![("folder", self.family.recipe_folder.clone())]
    }

    fn source_fields(release: &LibraryRelease) -> Vec<(&'static str, String)> {
        vec![
            ("url", yaml_map::quoted(&release.url)),
            ("sha256", yaml_map::quoted(&release.sha256)),
        ]
    }

    fn plan_primary(
        &self,
        summary: &mut EditSummary,
        root: &Path,
        release: &LibraryRelease,
    ) -> Result<()> {
        let config = summary.load(root, &self.config_path(&release.name))?;
        let data = summary.load(root, &self.conandata_path(&release.name))?;

        if let Some(existing) = recorded_sha256(&summary.edits[data], &release.version)? {
            let path = summary.edits[data].relative.clone();
            return Err(match existing {
                Some(existing) if existing != release.sha256 => Error::ChecksumMismatch {
                    version: release.version.clone(),
                    path,
                    existing,
                    computed: release.sha256.clone(),
                },
                _ => Error::DuplicateVersion {
                    version: release.version.clone(),
                    path,
                },
            });
        }
        if section_of(&summary.edits[config], VERSIONS_SECTION)?.contains(&release.version) {
            return Err(Error::DuplicateVersion {
                version: release.version.clone(),
                path: summary.edits[config].relative.clone(),
            });
        }

        info!("Adding {} {}", release.name, release.version);
        insert_entry(
            &mut summary.edits[config],
            VERSIONS_SECTION,
            &release.version,
            &self.version_fields(),
        )?;
        insert_entry(
            &mut summary.edits[data],
            SOURCES_SECTION,
            &release.version,
            &Self::source_fields(release),
        )
    }

    fn plan_dependency_tables(
        &self,
        summary: &mut EditSummary,
        root: &Path,
        descriptor: &ReleaseDescriptor,
    ) -> Result<()> {
        let primary = &descriptor.primary;
        let index = summary.load(root, &self.conanfile_path(&primary.name))?;
        let edit = &mut summary.edits[index];

        for dependency in &descriptor.dependencies {
            match conanfile::set_dependency_version(
                &edit.relative,
                &edit.updated,
                &dependency.name,
                &primary.version,
                &dependency.version,
            )? {
                Some((updated, outcome)) => {
                    let marker = match outcome {
                        TableEdit::Inserted => "+",
                        TableEdit::Updated => "~",
                        TableEdit::Unchanged => continue,
                    };
                    edit.updated = updated;
                    edit.changes.push(format!(
                        "_{}_version: {} \"{}\": \"{}\"",
                        dependency.name, marker, primary.version, dependency.version
                    ));
                }
                None => {
                    let message = format!(
                        "{} has no _{}_version table, {} {} not recorded",
                        edit.relative, dependency.name, dependency.name, dependency.version
                    );
                    warn!("{}", message);
                    summary.warnings.push(message);
                }
            }
        }
        Ok(())
    }

    fn plan_dependency(
        &self,
        summary: &mut EditSummary,
        root: &Path,
        release: &LibraryRelease,
    ) -> Result<()> {
        let data = summary.load(root, &self.conandata_path(&release.name))?;
        match recorded_sha256(&summary.edits[data], &release.version)? {
            Some(Some(existing)) if existing != release.sha256 => {
                return Err(Error::ChecksumMismatch {
                    version: release.version.clone(),
                    path: summary.edits[data].relative.clone(),
                    existing,
                    computed: release.sha256.clone(),
                });
            }
            Some(_) => {
                let note = format!(
                    "{} {} already in {}",
                    release.name, release.version, summary.edits[data].relative
                );
                info!("Skipping {}", note);
                summary.skipped.push(note);
            }
            None => insert_entry(
                &mut summary.edits[data],
                SOURCES_SECTION,
                &release.version,
                &Self::source_fields(release),
            )?,
        }

        let config = summary.load(root, &self.config_path(&release.name))?;
        if section_of(&summary.edits[config], VERSIONS_SECTION)?.contains(&release.version) {
            debug!(
                "{} {} already listed in {}",
                release.name, release.version, summary.edits[config].relative
            );
            return Ok(());
        }
        insert_entry(
            &mut summary.edits[config],
            VERSIONS_SECTION,
            &release.version,
            &self.version_fields(),
        )
    }
}
