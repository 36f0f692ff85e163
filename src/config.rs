//! # Package Family Configuration
//!
//! Describes which upstream repositories make up the package family, where
//! the downstream recipe repository lives, and where the primary library
//! records its dependency pairing. The built-in defaults describe bgfx, bx and
//! bimg on GitHub and the canonical conan-center-index; a YAML file can
//! override any field:
//!
//! ```yaml
//! primary:
//!   name: bgfx
//!   url: https://github.com/bkaradzic/bgfx.git
//! dependencies:
//!   - name: bx
//!     url: https://github.com/bkaradzic/bx.git
//!   - name: bimg
//!     url: https://github.com/bkaradzic/bimg.git
//! downstream_url: https://github.com/conan-io/conan-center-index.git
//! manifest_path: .conan/dependencies.yml
//! recipe_folder: all
//! api_version_header: include/bgfx/defines.h
//! api_version_define: BGFX_API_VERSION
//! ```
//!
//! [`RunConfig`] holds the per-invocation values resolved from the command
//! line. It is passed explicitly through the pipeline so two runs with
//! different temp directories never share state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// One upstream library of the family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    /// Recipe name in the downstream repository, also used as clone dir name.
    pub name: String,
    /// Clone URL of the upstream repository.
    pub url: String,
}

impl Library {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    /// URL of the GitHub-style source tarball for `revision`.
    ///
    /// `https://github.com/o/r.git` becomes
    /// `https://github.com/o/r/archive/<revision>.tar.gz`.
    pub fn archive_url(&self, revision: &str) -> String {
        let base = self.url.trim_end_matches('/');
        let base = base.strip_suffix(".git").unwrap_or(base);
        format!("{}/archive/{}.tar.gz", base, revision)
    }
}

/// The primary library, its two dependencies and the downstream repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageFamily {
    pub primary: Library,
    pub dependencies: Vec<Library>,
    /// Canonical (non-fork) recipe repository, cloned when no local path is
    /// supplied.
    pub downstream_url: String,
    /// Path, inside the primary tree, of the dependency compatibility manifest.
    pub manifest_path: String,
    /// Recipe folder holding `conandata.yml` and `conanfile.py`.
    pub recipe_folder: String,
    /// Header in the primary tree that defines its API version. When unset,
    /// untagged primary revisions are versioned by revision number alone.
    pub api_version_header: Option<String>,
    /// Macro in `api_version_header` holding the API version number.
    pub api_version_define: String,
}

impl Default for PackageFamily {
    fn default() -> Self {
        Self {
            primary: Library::new("bgfx", "https://github.com/bkaradzic/bgfx.git"),
            dependencies: vec![
                Library::new("bx", "https://github.com/bkaradzic/bx.git"),
                Library::new("bimg", "https://github.com/bkaradzic/bimg.git"),
            ],
            downstream_url: "https://github.com/conan-io/conan-center-index.git".to_string(),
            manifest_path: ".conan/dependencies.yml".to_string(),
            recipe_folder: "all".to_string(),
            api_version_header: Some("include/bgfx/defines.h".to_string()),
            api_version_define: "BGFX_API_VERSION".to_string(),
        }
    }
}

impl PackageFamily {
    /// All three upstream libraries, primary first.
    pub fn libraries(&self) -> impl Iterator<Item = &Library> {
        std::iter::once(&self.primary).chain(self.dependencies.iter())
    }

    /// Names of the two dependency libraries.
    pub fn dependency_names(&self) -> [&str; 2] {
        [
            self.dependencies[0].name.as_str(),
            self.dependencies[1].name.as_str(),
        ]
    }

    fn validate(&self) -> Result<()> {
        if self.dependencies.len() != 2 {
            return Err(Error::ConfigParse {
                message: format!(
                    "expected exactly 2 dependencies, found {}",
                    self.dependencies.len()
                ),
                hint: Some("list both dependency libraries under 'dependencies'".to_string()),
            });
        }

        let mut names: Vec<&str> = self.libraries().map(|l| l.name.as_str()).collect();
        if names.iter().any(|n| n.is_empty()) {
            return Err(Error::ConfigParse {
                message: "library names must not be empty".to_string(),
                hint: None,
            });
        }
        names.sort_unstable();
        names.dedup();
        if names.len() != 3 {
            return Err(Error::ConfigParse {
                message: "library names must be unique".to_string(),
                hint: None,
            });
        }

        for url in self
            .libraries()
            .map(|l| l.url.as_str())
            .chain(std::iter::once(self.downstream_url.as_str()))
        {
            validate_url(url)?;
        }

        if self.manifest_path.trim().is_empty() {
            return Err(Error::ConfigParse {
                message: "manifest_path must not be empty".to_string(),
                hint: None,
            });
        }

        Ok(())
    }
}

/// Accept anything git can clone: URLs with a scheme, or local paths.
fn validate_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(Error::ConfigParse {
            message: "repository URL must not be empty".to_string(),
            hint: None,
        });
    }
    if url.contains("://") {
        Url::parse(url).map_err(|e| Error::ConfigParse {
            message: format!("invalid repository URL '{}': {}", url, e),
            hint: Some("use an https://, ssh:// or file:// URL".to_string()),
        })?;
    }
    Ok(())
}

/// Parse a package family from YAML, filling omitted fields with defaults.
pub fn parse(yaml_content: &str) -> Result<PackageFamily> {
    let family: PackageFamily = if yaml_content.trim().is_empty() {
        PackageFamily::default()
    } else {
        serde_yaml::from_str(yaml_content).map_err(|e| Error::ConfigParse {
            message: e.to_string(),
            hint: None,
        })?
    };
    family.validate()?;
    Ok(family)
}

/// Load a package family from a YAML file.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<PackageFamily> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

/// How archive checksums are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveMode {
    /// Download the tarball the recipe will point at.
    #[default]
    Download,
    /// Build the tarball locally with `git archive`.
    Git,
}

/// Values for a single run, resolved from the command line.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub family: PackageFamily,
    /// Root for upstream clones, downloaded archives and a fresh downstream
    /// clone.
    pub temp_dir: PathBuf,
    /// Existing downstream working copy to edit in place.
    pub downstream_path: Option<PathBuf>,
    /// Pinned primary revision.
    pub pinned_revision: Option<String>,
    /// Pair dependencies by commit time instead of the compatibility manifest.
    pub pair_by_timestamp: bool,
    pub archive_mode: ArchiveMode,
    pub dry_run: bool,
    /// Remove upstream clones after the run.
    pub clean: bool,
}

impl RunConfig {
    pub fn new(temp_dir: PathBuf) -> Self {
        Self {
            family: PackageFamily::default(),
            temp_dir,
            downstream_path: None,
            pinned_revision: None,
            pair_by_timestamp: false,
            archive_mode: ArchiveMode::default(),
            dry_run: false,
            clean: false,
        }
    }
}
