//! # Release Descriptor Builder
//!
//! Turns the checked-out working copies into the values a recipe records for
//! each library: version string, commit, source archive URL and the archive's
//! SHA-256.
//!
//! ## Version strings
//!
//! A revision with a tag on it is versioned by the tag (minus a leading `v`).
//! Otherwise:
//!
//! - bx and bimg use their revision number, the commit count reachable from
//!   the revision.
//! - bgfx uses `1.<API>.<revision number>`, with the API version read from
//!   `include/bgfx/defines.h`. This is the same string bgfx's build scripts
//!   print for `genie version`.
//!
//! ## Checksums
//!
//! The recipe points at GitHub's tarball for the commit, so by default that
//! tarball is downloaded and hashed. `ArchiveMode::Git` builds the archive
//! locally with `git archive` instead, which needs no network but only
//! matches GitHub's bytes when both use the same archiver.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use crate::checksum;
use crate::config::{ArchiveMode, Library, PackageFamily};
use crate::error::{Error, Result};
use crate::git;
use crate::repository::WorkingCopy;
use crate::version;

/// Timeout for archive downloads
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Buffer size for streaming downloads to disk
const STREAM_BUFFER_SIZE: usize = 8192;

/// Release metadata of one library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRelease {
    pub name: String,
    pub version: String,
    /// Full commit id the archive was produced from.
    pub revision: String,
    /// Source archive URL recorded in `conandata.yml`.
    pub url: String,
    /// Hex-encoded SHA-256 of the archive.
    pub sha256: String,
}

/// Everything the recipe editor needs to add a release of the family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseDescriptor {
    pub primary: LibraryRelease,
    pub dependencies: Vec<LibraryRelease>,
}

impl ReleaseDescriptor {
    /// Version being added for the primary library.
    pub fn version_string(&self) -> &str {
        &self.primary.version
    }

    /// Commit the primary release is built from.
    pub fn source_revision(&self) -> &str {
        &self.primary.revision
    }

    /// All three releases, primary first.
    pub fn releases(&self) -> impl Iterator<Item = &LibraryRelease> {
        std::iter::once(&self.primary).chain(self.dependencies.iter())
    }

    /// Archive name (`<library>-<commit>.tar.gz`) to SHA-256.
    pub fn archive_checksums(&self) -> BTreeMap<String, String> {
        self.releases()
            .map(|r| (format!("{}-{}.tar.gz", r.name, r.revision), r.sha256.clone()))
            .collect()
    }

    /// Dependency name to the version the primary release requires.
    pub fn dependency_constraints(&self) -> BTreeMap<String, String> {
        self.dependencies
            .iter()
            .map(|r| (r.name.clone(), r.version.clone()))
            .collect()
    }
}

/// How an untagged revision is turned into a version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionScheme {
    /// Commit count reachable from the revision.
    RevisionNumber,
    /// `1.<API>.<revision number>`, reading API from `define` in `header`.
    ApiRevision { header: String, define: String },
}

impl VersionScheme {
    /// Scheme configured for the primary library.
    pub fn for_primary(family: &PackageFamily) -> Self {
        match &family.api_version_header {
            Some(header) => VersionScheme::ApiRevision {
                header: header.clone(),
                define: family.api_version_define.clone(),
            },
            None => VersionScheme::RevisionNumber,
        }
    }
}

/// Reads version information out of a working copy.
pub trait SnapshotReader {
    /// Tag pointing exactly at the checked-out revision.
    fn exact_tag(&self, copy: &WorkingCopy) -> Result<Option<String>>;

    fn revision_count(&self, copy: &WorkingCopy) -> Result<u64>;

    /// Contents of a file in the working tree, `None` if absent.
    fn read_file(&self, copy: &WorkingCopy, path: &str) -> Result<Option<String>>;
}

/// `SnapshotReader` backed by `git` and the working tree.
pub struct GitSnapshotReader;

impl SnapshotReader for GitSnapshotReader {
    fn exact_tag(&self, copy: &WorkingCopy) -> Result<Option<String>> {
        git::exact_tag(&copy.name, &copy.path)
    }

    fn revision_count(&self, copy: &WorkingCopy) -> Result<u64> {
        git::revision_count(&copy.name, &copy.path)
    }

    fn read_file(&self, copy: &WorkingCopy, path: &str) -> Result<Option<String>> {
        let full_path = copy.path.join(path);
        match fs::read_to_string(&full_path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Produces the source archive of a working copy's revision.
pub trait ArchiveProvider {
    /// Path of an archive file whose bytes are the ones `url` serves.
    fn archive(&self, copy: &WorkingCopy, url: &str) -> Result<PathBuf>;
}

/// Downloads archives into a directory, reusing earlier downloads.
pub struct DownloadArchives {
    dir: PathBuf,
    client: reqwest::blocking::Client,
}

impl DownloadArchives {
    pub fn new(dir: PathBuf) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| io::Error::other(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { dir, client })
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| io::Error::other(format!("GET {url}: {e}")))?;

        let progress = ProgressBar::new(response.content_length().unwrap_or(0));
        progress.set_style(
            ProgressStyle::with_template("{msg} [{bar:30}] {bytes}/{total_bytes}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        progress.set_message(
            dest.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        );

        // Write to a side file so an interrupted download is never reused.
        let partial = dest.with_extension("part");
        let mut file = File::create(&partial)?;
        let mut buffer = [0u8; STREAM_BUFFER_SIZE];
        loop {
            let read = response.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            file.write_all(&buffer[..read])?;
            progress.inc(read as u64);
        }
        file.flush()?;
        progress.finish_and_clear();

        fs::rename(&partial, dest)?;
        Ok(())
    }
}

impl ArchiveProvider for DownloadArchives {
    fn archive(&self, copy: &WorkingCopy, url: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let dest = self
            .dir
            .join(format!("{}.{}.tar.gz", copy.name, copy.revision));

        if dest.exists() {
            debug!("Reusing downloaded archive {}", dest.display());
        } else {
            info!("Downloading {}", url);
            self.download(url, &dest)?;
        }
        Ok(dest)
    }
}

/// Builds archives locally with `git archive`.
pub struct GitArchives {
    dir: PathBuf,
}

impl GitArchives {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl ArchiveProvider for GitArchives {
    fn archive(&self, copy: &WorkingCopy, _url: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let dest = self
            .dir
            .join(format!("{}.{}.git.tar.gz", copy.name, copy.revision));
        // GitHub tarballs unpack into <repo>-<commit>/.
        let prefix = format!("{}-{}", copy.name, copy.revision);
        git::archive(&copy.name, &copy.path, &copy.revision, &prefix, &dest)?;
        Ok(dest)
    }
}

/// The archive provider for an `ArchiveMode`, storing archives under `dir`.
pub fn archive_provider(mode: ArchiveMode, dir: PathBuf) -> Result<Box<dyn ArchiveProvider>> {
    Ok(match mode {
        ArchiveMode::Download => Box::new(DownloadArchives::new(dir)?),
        ArchiveMode::Git => Box::new(GitArchives::new(dir)),
    })
}

/// Builds a [`ReleaseDescriptor`] from checked-out working copies.
pub struct DescriptorBuilder<'a> {
    family: &'a PackageFamily,
    snapshots: &'a dyn SnapshotReader,
    archives: &'a dyn ArchiveProvider,
}

impl<'a> DescriptorBuilder<'a> {
    pub fn new(
        family: &'a PackageFamily,
        snapshots: &'a dyn SnapshotReader,
        archives: &'a dyn ArchiveProvider,
    ) -> Self {
        Self {
            family,
            snapshots,
            archives,
        }
    }

    /// Describe the primary library and its dependencies.
    pub fn build(
        &self,
        primary: &WorkingCopy,
        dependencies: &[WorkingCopy],
    ) -> Result<ReleaseDescriptor> {
        if dependencies.len() != self.family.dependencies.len() {
            return Err(Error::Descriptor {
                repository: primary.name.clone(),
                revision: primary.revision.clone(),
                message: format!(
                    "expected {} dependency working copies, got {}",
                    self.family.dependencies.len(),
                    dependencies.len()
                ),
            });
        }

        let primary_release = self.describe(primary, &VersionScheme::for_primary(self.family))?;
        let dependency_releases = dependencies
            .iter()
            .map(|copy| self.describe(copy, &VersionScheme::RevisionNumber))
            .collect::<Result<Vec<_>>>()?;

        Ok(ReleaseDescriptor {
            primary: primary_release,
            dependencies: dependency_releases,
        })
    }

    /// Release metadata of a single working copy.
    pub fn describe(&self, copy: &WorkingCopy, scheme: &VersionScheme) -> Result<LibraryRelease> {
        let fail = |message: String| Error::Descriptor {
            repository: copy.name.clone(),
            revision: copy.revision.clone(),
            message,
        };

        let version = self
            .version_of(copy, scheme)
            .map_err(|e| match e {
                Error::Descriptor { .. } => e,
                other => fail(other.to_string()),
            })?;

        let url = Library::new(&copy.name, &copy.url).archive_url(&copy.revision);
        let archive = self
            .archives
            .archive(copy, &url)
            .map_err(|e| fail(format!("cannot obtain source archive {}: {}", url, e)))?;
        let sha256 = checksum::sha256_file(&archive)
            .map_err(|e| fail(format!("cannot hash {}: {}", archive.display(), e)))?;

        info!("{} {} ({}) sha256 {}", copy.name, version, copy.revision, sha256);

        Ok(LibraryRelease {
            name: copy.name.clone(),
            version,
            revision: copy.revision.clone(),
            url,
            sha256,
        })
    }

    fn version_of(&self, copy: &WorkingCopy, scheme: &VersionScheme) -> Result<String> {
        if let Some(tag) = self.snapshots.exact_tag(copy)? {
            debug!("{} is tagged {}", copy.name, tag);
            return Ok(version::version_from_tag(&tag));
        }

        let count = self.snapshots.revision_count(copy)?;
        match scheme {
            VersionScheme::RevisionNumber => Ok(count.to_string()),
            VersionScheme::ApiRevision { header, define } => {
                let content =
                    self.snapshots
                        .read_file(copy, header)?
                        .ok_or_else(|| Error::Descriptor {
                            repository: copy.name.clone(),
                            revision: copy.revision.clone(),
                            message: format!("{} not found", header),
                        })?;
                let api = version::parse_api_version(&content, define).ok_or_else(|| {
                    Error::Descriptor {
                        repository: copy.name.clone(),
                        revision: copy.revision.clone(),
                        message: format!("{} does not define {}", header, define),
                    }
                })?;
                Ok(version::api_revision_version(api, count))
            }
        }
    }
}
