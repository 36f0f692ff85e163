//! # conan-updater-bgfx
//!
//! Adds a new release of bgfx and its companion libraries bx and bimg to the
//! conan-center-index recipe repository.
//!
//! A run resolves which upstream commits belong together, checks them out,
//! derives a version string and source archive checksum for each, and edits
//! the three recipes so they list the new release. It is used by the
//! `conan-updater-bgfx` command-line tool but the stages are independent and
//! can be driven directly.
//!
//! ## Quick Example
//!
//! ```
//! use conan_updater_bgfx::config;
//! use conan_updater_bgfx::version::{insertion_index, parse_api_version};
//!
//! // An empty family file selects the bgfx defaults
//! let family = config::parse("").unwrap();
//! assert_eq!(family.dependency_names(), ["bx", "bimg"]);
//!
//! // bgfx versions embed the API version from include/bgfx/defines.h
//! let header = "#define BGFX_API_VERSION UINT32_C(128)";
//! assert_eq!(parse_api_version(header, "BGFX_API_VERSION"), Some(128));
//!
//! // conan-center-index lists versions newest first
//! let versions = ["1.128.8786", "1.127.8725"];
//! assert_eq!(insertion_index(&versions, "1.129.8800"), 0);
//! ```
//!
//! ## Stages
//!
//! - **Source Locator (`locator`)**: picks the bgfx, bx and bimg revisions,
//!   either the latest heads or a pinned bgfx commit paired through its
//!   compatibility manifest.
//! - **Repository Fetcher (`repository`, `git`)**: clones or updates the
//!   upstream repositories and checks out the chosen revisions; provides the
//!   downstream working copy.
//! - **Release Descriptor Builder (`descriptor`, `checksum`, `version`)**:
//!   computes version strings, archive URLs and SHA-256 checksums.
//! - **Recipe Editor (`recipe`)**: inserts the new versions into
//!   `config.yml`, `conandata.yml` and `conanfile.py` without disturbing the
//!   rest of each file.
//!
//! `pipeline` runs the stages in order; `config` holds the package family and
//! per-run settings; `error` defines the shared error type.

pub mod checksum;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod git;
pub mod locator;
pub mod output;
pub mod pipeline;
pub mod recipe;
pub mod repository;
pub mod version;
