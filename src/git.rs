//! Thin wrappers around the system `git` executable.
//!
//! Using the system git means SSH keys, credential helpers and anything else
//! configured in `~/.gitconfig` apply to clones and fetches. Every helper
//! takes the logical repository name (e.g. `bx`) so failures can say which
//! repository they belong to.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use log::{debug, warn};

use crate::error::{Error, Result};

/// The remote-tracking ref git sets up for the default branch on clone.
pub const DEFAULT_BRANCH_REF: &str = "refs/remotes/origin/HEAD";

fn spawn(repository: &str, cwd: Option<&Path>, args: &[&str]) -> Result<Output> {
    debug!("{}: git {}", repository, args.join(" "));

    let mut command = Command::new("git");
    command.args(args);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    command.output().map_err(|e| Error::Fetch {
        repository: repository.to_string(),
        command: args.join(" "),
        stderr: e.to_string(),
    })
}

/// Run git and return its trimmed stdout, failing on a non-zero exit.
pub fn run(repository: &str, cwd: Option<&Path>, args: &[&str]) -> Result<String> {
    let output = spawn(repository, cwd, args)?;

    if !output.status.success() {
        return Err(Error::Fetch {
            repository: repository.to_string(),
            command: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run git and report only whether it succeeded, returning stdout on success.
fn probe(repository: &str, cwd: Option<&Path>, args: &[&str]) -> Result<Option<String>> {
    let output = spawn(repository, cwd, args)?;
    if output.status.success() {
        Ok(Some(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    } else {
        Ok(None)
    }
}

/// Clone `url` into `target_dir`.
///
/// A shallow clone (`--depth 1`) is enough for repositories that are only
/// edited, but upstream clones need full history for revision numbers.
pub fn clone(repository: &str, url: &str, target_dir: &Path, shallow: bool) -> Result<()> {
    if let Some(parent) = target_dir.parent() {
        fs::create_dir_all(parent)?;
    }

    let target = target_dir.to_string_lossy().to_string();
    let mut args: Vec<&str> = vec!["clone"];
    if shallow {
        args.push("--depth=1");
    }
    args.push(url);
    args.push(target.as_str());

    run(repository, None, &args).map(|_| ())
}

/// Fetch new commits and tags from `origin`.
pub fn fetch(repository: &str, dir: &Path, shallow: bool) -> Result<()> {
    let args: &[&str] = if shallow {
        &["fetch", "--depth=1", "origin"]
    } else {
        &["fetch", "--tags", "--force", "origin"]
    };
    run(repository, Some(dir), args)?;

    // Keep origin/HEAD pointing at the remote's current default branch.
    run(repository, Some(dir), &["remote", "set-head", "origin", "--auto"]).map(|_| ())
}

/// Check out `revision` as a detached HEAD.
pub fn checkout(repository: &str, dir: &Path, revision: &str) -> Result<()> {
    run(repository, Some(dir), &["checkout", "--detach", revision]).map(|_| ())
}

/// Throw away uncommitted edits and untracked files in a working tree.
pub fn discard_changes(repository: &str, dir: &Path) -> Result<()> {
    let status = run(repository, Some(dir), &["status", "--porcelain"])?;
    if !status.is_empty() {
        warn!(
            "{}: discarding {} local change(s) in {}",
            repository,
            status.lines().count(),
            dir.display()
        );
    }
    run(repository, Some(dir), &["reset", "--hard", "--quiet"])?;
    run(repository, Some(dir), &["clean", "-fd", "--quiet"]).map(|_| ())
}

/// Full commit id of `HEAD`.
pub fn head_revision(repository: &str, dir: &Path) -> Result<String> {
    run(repository, Some(dir), &["rev-parse", "HEAD"])
}

/// Full commit id a local ref or abbreviated revision points to.
pub fn resolve_revision(repository: &str, dir: &Path, revision: &str) -> Result<String> {
    let commitish = format!("{}^{{commit}}", revision);
    run(repository, Some(dir), &["rev-parse", "--verify", &commitish])
}

/// Commit id of the remote's default branch head, without cloning.
pub fn remote_head(repository: &str, url: &str) -> Result<String> {
    let stdout = run(repository, None, &["ls-remote", url, "HEAD"])?;
    parse_ls_remote_head(&stdout).ok_or_else(|| Error::Fetch {
        repository: repository.to_string(),
        command: format!("ls-remote {} HEAD", url),
        stderr: "remote did not advertise a HEAD revision".to_string(),
    })
}

/// Extract the commit id from `git ls-remote <url> HEAD` output.
pub fn parse_ls_remote_head(stdout: &str) -> Option<String> {
    // Output format: <hash>\t<ref>
    stdout.lines().find_map(|line| {
        let mut parts = line.split('\t');
        match (parts.next(), parts.next()) {
            (Some(hash), Some("HEAD")) if !hash.is_empty() => Some(hash.to_string()),
            _ => None,
        }
    })
}

/// Contents of `path` as recorded at `revision`, or `None` if the file is not
/// part of that snapshot.
pub fn show_file(
    repository: &str,
    dir: &Path,
    revision: &str,
    path: &str,
) -> Result<Option<String>> {
    let object = format!("{}:{}", revision, path);
    if probe(repository, Some(dir), &["cat-file", "-e", &object])?.is_none() {
        return Ok(None);
    }
    run(repository, Some(dir), &["show", &object]).map(Some)
}

/// Number of commits reachable from `HEAD`.
pub fn revision_count(repository: &str, dir: &Path) -> Result<u64> {
    let stdout = run(repository, Some(dir), &["rev-list", "--count", "HEAD"])?;
    stdout.parse().map_err(|_| Error::Fetch {
        repository: repository.to_string(),
        command: "rev-list --count HEAD".to_string(),
        stderr: format!("unexpected output: {}", stdout),
    })
}

/// Tag pointing exactly at `HEAD`, if any.
pub fn exact_tag(repository: &str, dir: &Path) -> Result<Option<String>> {
    Ok(probe(
        repository,
        Some(dir),
        &["describe", "--tags", "--exact-match", "HEAD"],
    )?
    .filter(|tag| !tag.is_empty()))
}

/// Committer timestamp (seconds since the epoch) of `revision`.
pub fn commit_timestamp(repository: &str, dir: &Path, revision: &str) -> Result<i64> {
    let stdout = run(repository, Some(dir), &["log", "-1", "--format=%ct", revision])?;
    stdout.parse().map_err(|_| Error::Fetch {
        repository: repository.to_string(),
        command: format!("log -1 --format=%ct {}", revision),
        stderr: format!("unexpected output: {}", stdout),
    })
}

/// Last commit on `branch_ref` committed at or before `timestamp`.
pub fn last_commit_before(
    repository: &str,
    dir: &Path,
    branch_ref: &str,
    timestamp: i64,
) -> Result<Option<String>> {
    // Without the zone git reads small values such as `@2000` as a year.
    let before = format!("--before=@{} +0000", timestamp);
    let stdout = run(repository, Some(dir), &["rev-list", "-1", &before, branch_ref])?;
    Ok(Some(stdout).filter(|s| !s.is_empty()))
}

/// Write a gzip-compressed tarball of `revision` to `output`, with every
/// entry placed under `prefix`.
pub fn archive(
    repository: &str,
    dir: &Path,
    revision: &str,
    prefix: &str,
    output: &Path,
) -> Result<()> {
    let prefix = format!("--prefix={}/", prefix.trim_end_matches('/'));
    let output = format!("--output={}", output.to_string_lossy());
    run(
        repository,
        Some(dir),
        &["archive", "--format=tar.gz", &prefix, &output, revision],
    )
    .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ls_remote_head() {
        let stdout = "4b4d1e7c2e5bd3a1c0ffee0000000000000000aa\tHEAD\n";
        assert_eq!(
            parse_ls_remote_head(stdout),
            Some("4b4d1e7c2e5bd3a1c0ffee0000000000000000aa".to_string())
        );
    }

    #[test]
    fn test_parse_ls_remote_head_ignores_other_refs() {
        let stdout = "1111111111111111111111111111111111111111\trefs/heads/master\n\
                      2222222222222222222222222222222222222222\tHEAD\n";
        assert_eq!(
            parse_ls_remote_head(stdout),
            Some("2222222222222222222222222222222222222222".to_string())
        );
    }

    #[test]
    fn test_parse_ls_remote_head_empty() {
        assert_eq!(parse_ls_remote_head(""), None);
        assert_eq!(parse_ls_remote_head("garbage"), None);
    }

    fn commit_at(dir: &Path, message: &str, timestamp: i64) -> String {
        let date = format!("@{} +0000", timestamp);
        let status = Command::new("git")
            .current_dir(dir)
            .args([
                "-c",
                "user.name=Recipe Bot",
                "-c",
                "user.email=recipes@example.com",
                "-c",
                "commit.gpgsign=false",
                "commit",
                "--quiet",
                "--allow-empty",
                "--message",
                message,
            ])
            .env("GIT_AUTHOR_DATE", &date)
            .env("GIT_COMMITTER_DATE", &date)
            .status()
            .unwrap();
        assert!(status.success());
        head_revision("bx", dir).unwrap()
    }

    #[test]
    fn test_last_commit_before_small_timestamps() {
        let temp = tempfile::TempDir::new().unwrap();
        run("bx", Some(temp.path()), &["init", "--quiet"]).unwrap();
        let first = commit_at(temp.path(), "first", 1_000);
        let second = commit_at(temp.path(), "second", 3_000);

        assert_eq!(
            last_commit_before("bx", temp.path(), "HEAD", 2_000).unwrap(),
            Some(first.clone())
        );
        assert_eq!(
            last_commit_before("bx", temp.path(), "HEAD", 1_000).unwrap(),
            Some(first)
        );
        assert_eq!(
            last_commit_before("bx", temp.path(), "HEAD", 3_000).unwrap(),
            Some(second)
        );
        assert_eq!(last_commit_before("bx", temp.path(), "HEAD", 999).unwrap(), None);
    }

    #[test]
    fn test_last_commit_before_realistic_timestamp() {
        let temp = tempfile::TempDir::new().unwrap();
        run("bx", Some(temp.path()), &["init", "--quiet"]).unwrap();
        let first = commit_at(temp.path(), "first", 1_700_000_000);
        commit_at(temp.path(), "second", 1_700_086_400);

        assert_eq!(
            last_commit_before("bx", temp.path(), "HEAD", 1_700_000_100).unwrap(),
            Some(first)
        );
        assert_eq!(
            commit_timestamp("bx", temp.path(), "HEAD").unwrap(),
            1_700_086_400
        );
    }

    #[test]
    fn test_discard_changes_restores_head() {
        let temp = tempfile::TempDir::new().unwrap();
        run("cci", Some(temp.path()), &["init", "--quiet"]).unwrap();
        fs::write(temp.path().join("config.yml"), "versions: {}\n").unwrap();
        run("cci", Some(temp.path()), &["add", "config.yml"]).unwrap();
        commit_at(temp.path(), "seed", 1_000);

        fs::write(temp.path().join("config.yml"), "edited\n").unwrap();
        fs::create_dir_all(temp.path().join("recipes/new")).unwrap();
        fs::write(temp.path().join("recipes/new/conandata.yml"), "sources: {}\n").unwrap();

        discard_changes("cci", temp.path()).unwrap();

        assert_eq!(
            fs::read_to_string(temp.path().join("config.yml")).unwrap(),
            "versions: {}\n"
        );
        assert!(!temp.path().join("recipes/new").exists());
        assert_eq!(run("cci", Some(temp.path()), &["status", "--porcelain"]).unwrap(), "");
    }

    #[test]
    fn test_run_reports_command_and_stderr() {
        let temp = tempfile::TempDir::new().unwrap();
        // Not a repository, so git exits non-zero.
        let result = run("bx", Some(temp.path()), &["rev-parse", "HEAD"]);
        match result {
            Err(Error::Fetch {
                repository,
                command,
                stderr,
            }) => {
                assert_eq!(repository, "bx");
                assert_eq!(command, "rev-parse HEAD");
                assert!(!stderr.is_empty());
            }
            other => panic!("expected fetch error, got {:?}", other),
        }
    }
}
