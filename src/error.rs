//! # Error Handling
//!
//! This module defines the error type shared by every stage of the update
//! pipeline. It uses `thiserror` to build a single `Error` enum whose variants
//! map onto the ways a run can fail:
//!
//! - **`IncompatibleRevision`**: a pinned bgfx revision has no discoverable
//!   pairing for its dependencies.
//! - **`Fetch`**: a `git` clone, fetch or checkout exited non-zero.
//! - **`Descriptor`**: a version string or archive checksum could not be
//!   computed.
//! - **`DuplicateVersion`** and **`ChecksumMismatch`**: the downstream recipe
//!   already knows the version being added.
//! - **`Recipe`**: a recipe file does not have the structure the editor needs.
//!
//! Every variant carries the repository, revision or file path involved so the
//! operator can act on the message without re-running with more logging.
//!
//! All errors are fatal. The pipeline never retries and never writes a partial
//! result.

use thiserror::Error;

/// Main error type for conan-updater-bgfx operations
#[derive(Error, Debug)]
pub enum Error {
    /// The pinned primary revision does not declare which dependency revisions
    /// it pairs with.
    #[error("Incompatible revision {revision}: {message}")]
    IncompatibleRevision { revision: String, message: String },

    /// A `git` command failed while cloning, fetching or checking out.
    ///
    /// `stderr` is git's own diagnostic output, passed through verbatim.
    #[error("Fetch failed for {repository}: git {command}\n{stderr}")]
    Fetch {
        repository: String,
        command: String,
        stderr: String,
    },

    /// A release descriptor field could not be derived for a repository.
    #[error("Cannot describe {repository}@{revision}: {message}")]
    Descriptor {
        repository: String,
        revision: String,
        message: String,
    },

    /// The version being added is already listed in a recipe file.
    #[error("Version {version} already exists in {path}")]
    DuplicateVersion { version: String, path: String },

    /// The version being added is already listed with a different checksum.
    #[error(
        "Version {version} in {path} has sha256 {existing}, but the source archive hashes to {computed}"
    )]
    ChecksumMismatch {
        version: String,
        path: String,
        existing: String,
        computed: String,
    },

    /// A recipe file could not be edited.
    #[error("Recipe error in {path}: {message}")]
    Recipe { path: String, message: String },

    /// The package family configuration is invalid.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
