//! Shared test utilities for integration and E2E tests.
//!
//! End-to-end runs never touch the network: upstream libraries and the
//! downstream recipe repository are local git repositories in a temporary
//! directory, referenced through `file://` URLs in a package family file.
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! #[cfg_attr(not(feature = "integration-tests"), ignore)]
//! fn test_example() {
//!     let fixture = UpdaterFixture::new().with_upstreams().with_downstream();
//!     fixture.command().assert().success();
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::{git, recipes, UpdaterFixture};
}

/// Seed content for the downstream recipe repository.
#[allow(dead_code)]
pub mod recipes {
    pub const BGFX_CONANFILE: &str = r#"from conan import ConanFile


class bgfxConan(ConanFile):
    name = "bgfx"

    @property
    def _bx_version(self):
        return {
            "1.118.8384": "cci.20221116",
        }

    @property
    def _bimg_version(self):
        return {
            "1.118.8384": "cci.20221115",
        }
"#;

    /// Libraries with their already-packaged version.
    pub const EXISTING: [(&str, &str); 3] = [
        ("bgfx", "1.118.8384"),
        ("bx", "cci.20221116"),
        ("bimg", "cci.20221115"),
    ];

    pub fn config_yml(version: &str) -> String {
        format!("versions:\n  \"{}\":\n    folder: all\n", version)
    }

    pub fn conandata_yml(name: &str, version: &str) -> String {
        format!(
            "sources:\n  \"{}\":\n    url: \"https://github.com/bkaradzic/{}/archive/0000.tar.gz\"\n    sha256: \"{}\"\n",
            version,
            name,
            "0".repeat(64)
        )
    }

    pub const BGFX_DEFINES_H: &str = "#ifndef BGFX_DEFINES_H_HEADER_GUARD\n\
        #define BGFX_DEFINES_H_HEADER_GUARD\n\
        #define BGFX_API_VERSION UINT32_C(128)\n\
        #endif\n";
}

/// Run git in `dir` with a fixed identity, returning trimmed stdout.
#[allow(dead_code)]
pub fn git(dir: &Path, args: &[&str], timestamp: Option<i64>) -> String {
    let mut command = Command::new("git");
    command
        .current_dir(dir)
        .args([
            "-c",
            "user.name=Recipe Bot",
            "-c",
            "user.email=recipes@example.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "tag.gpgsign=false",
        ])
        .args(args);
    if let Some(ts) = timestamp {
        let date = format!("@{} +0000", ts);
        command
            .env("GIT_AUTHOR_DATE", &date)
            .env("GIT_COMMITTER_DATE", &date);
    }

    let output = command.output().expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A temporary workspace with upstream repositories, a downstream recipe
/// repository, a temp dir and a package family file pointing at them.
pub struct UpdaterFixture {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl UpdaterFixture {
    /// Create a new fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Working directory of an upstream library.
    pub fn upstream(&self, name: &str) -> PathBuf {
        self.path().join("upstream").join(name)
    }

    /// The downstream recipe repository.
    pub fn downstream(&self) -> PathBuf {
        self.path().join("cci")
    }

    /// Clone root passed as `--temp-dir`.
    pub fn clone_root(&self) -> PathBuf {
        self.path().join("tmp")
    }

    /// Commit `files` to an upstream library at `timestamp`, creating the
    /// repository on first use. Returns the new commit id.
    pub fn commit(&self, name: &str, files: &[(&str, &str)], timestamp: i64) -> String {
        let dir = self.upstream(name);
        commit_files(&dir, files, timestamp)
    }

    /// Tag the head of an upstream library.
    pub fn tag(&self, name: &str, tag: &str) {
        git(&self.upstream(name), &["tag", tag], None);
    }

    /// bx with two commits, bimg with one, and bgfx with one commit carrying
    /// API version 128, committed in that time order.
    pub fn with_upstreams(self) -> Self {
        self.commit("bx", &[("include/bx/bx.h", "// bx 1\n")], 1_000);
        self.commit("bimg", &[("include/bimg/bimg.h", "// bimg 1\n")], 1_000);
        self.commit(
            "bgfx",
            &[("include/bgfx/defines.h", recipes::BGFX_DEFINES_H)],
            2_000,
        );
        self.commit("bx", &[("include/bx/bx.h", "// bx 2\n")], 3_000);
        self
    }

    /// A conan-center-index working copy with one release of each library.
    pub fn with_downstream(self) -> Self {
        let root = self.downstream();
        let mut files = vec![(
            "recipes/bgfx/all/conanfile.py".to_string(),
            recipes::BGFX_CONANFILE.to_string(),
        )];
        for (name, version) in recipes::EXISTING {
            files.push((
                format!("recipes/{}/config.yml", name),
                recipes::config_yml(version),
            ));
            files.push((
                format!("recipes/{}/all/conandata.yml", name),
                recipes::conandata_yml(name, version),
            ));
        }
        let borrowed: Vec<(&str, &str)> = files
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_str()))
            .collect();
        commit_files(&root, &borrowed, 1_000);
        self
    }

    /// Write the package family file with `file://` URLs to the upstreams
    /// and to the downstream repository.
    pub fn family_config(&self) -> PathBuf {
        let url = |name: &str| format!("file://{}", self.upstream(name).display());
        let content = format!(
            "primary:\n  name: bgfx\n  url: {}\ndependencies:\n  - name: bx\n    url: {}\n  - name: bimg\n    url: {}\ndownstream_url: file://{}\n",
            url("bgfx"),
            url("bx"),
            url("bimg"),
            self.downstream().display()
        );
        let child = self.temp_dir.child("family.yml");
        child.write_str(&content).expect("Failed to write family file");
        child.path().to_path_buf()
    }

    /// A command for a local, offline run that edits the downstream
    /// repository in place.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = self.command_with_clone();
        cmd.arg("--conan-center-index-path").arg(self.downstream());
        cmd
    }

    /// A command for a local, offline run that clones the downstream
    /// repository into the temp dir.
    pub fn command_with_clone(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("conan-updater-bgfx");
        cmd.current_dir(self.path())
            .env_remove("RUST_LOG")
            .arg("--temp-dir")
            .arg(self.clone_root())
            .arg("--config")
            .arg(self.family_config())
            .arg("--archive")
            .arg("git")
            .arg("--color")
            .arg("never");
        cmd
    }

    /// Contents of a file in the downstream clone under the temp dir.
    pub fn read_downstream_clone(&self, relative: &str) -> String {
        std::fs::read_to_string(self.clone_root().join("conan-center-index").join(relative))
            .expect("Failed to read downstream clone file")
    }

    /// Contents of a file in the downstream repository.
    pub fn read_downstream(&self, relative: &str) -> String {
        std::fs::read_to_string(self.downstream().join(relative))
            .expect("Failed to read downstream file")
    }
}

impl Default for UpdaterFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
fn commit_files(dir: &Path, files: &[(&str, &str)], timestamp: i64) -> String {
    if !dir.join(".git").exists() {
        std::fs::create_dir_all(dir).expect("Failed to create repository directory");
        git(dir, &["init", "--initial-branch=main"], None);
    }
    for (path, content) in files {
        let file = dir.join(path);
        std::fs::create_dir_all(file.parent().expect("file has a parent"))
            .expect("Failed to create directory");
        std::fs::write(&file, content).expect("Failed to write file");
    }
    git(dir, &["add", "--all"], None);
    git(
        dir,
        &["commit", "--quiet", "--message", "update"],
        Some(timestamp),
    );
    git(dir, &["rev-parse", "HEAD"], None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = UpdaterFixture::new();
        assert!(fixture.path().exists());
    }

    #[test]
    fn test_seed_recipes_are_valid_yaml() {
        for (name, version) in recipes::EXISTING {
            serde_yaml::from_str::<serde_yaml::Value>(&recipes::config_yml(version))
                .expect("config.yml should be valid YAML");
            serde_yaml::from_str::<serde_yaml::Value>(&recipes::conandata_yml(name, version))
                .expect("conandata.yml should be valid YAML");
        }
    }
}
