//! Version-control access.
//!
//! The engine only ever talks to the repository through the [`Vcs`] trait so
//! tests can inject an in-memory fake. [`GitCli`] is the production
//! implementation and shells out to the `git` binary.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// A commit as seen by the engine.
#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    /// Author time as seconds since the Unix epoch.
    pub author_time: i64,
}

/// What happened to a path in a tree diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Other,
}

/// One entry of a tree diff.
#[derive(Debug, Clone, Serialize)]
pub struct DiffEntry {
    pub path: String,
    pub kind: ChangeKind,
}

/// A tag as listed by the repository, before any version parsing.
#[derive(Debug, Clone)]
pub struct TagEntry {
    /// Friendly name, e.g. `v1.2.3` or `core-v1.2.3`.
    pub name: String,
    /// The commit the tag ultimately points at (peeled for annotated tags).
    pub target: String,
    /// Committer time of the target, seconds since the Unix epoch.
    pub committer_time: i64,
}

/// Read/write access to a version-control repository.
///
/// All operations are synchronous; implementations are not required to be
/// thread-safe and the engine never shares one across threads.
pub trait Vcs {
    fn current_branch_name(&self) -> EngineResult<String>;

    fn head_commit(&self) -> EngineResult<String>;

    /// Resolve any commit-ish reference to a full SHA.
    fn lookup_commit(&self, reference: &str) -> EngineResult<String>;

    /// All tags in repository iteration order.
    fn list_tags(&self) -> EngineResult<Vec<TagEntry>>;

    /// Tree diff between two commits.
    fn diff(&self, from: &str, to: &str) -> EngineResult<Vec<DiffEntry>>;

    /// Number of commits reachable from `to` but not from `from`.
    fn commit_height(&self, from: &str, to: &str) -> EngineResult<u64>;

    /// Commits in `(from, to]`, newest first. `from = None` means from the
    /// beginning of history.
    fn commits_between(&self, from: Option<&str>, to: &str) -> EngineResult<Vec<CommitInfo>>;

    /// Create an annotated tag at the current head.
    ///
    /// Returns `Ok(false)` when the tag already exists; creation is
    /// idempotent and a duplicate is not an error.
    fn create_annotated_tag(&self, name: &str, message: &str) -> EngineResult<bool>;

    fn tag_exists(&self, name: &str) -> EngineResult<bool>;

    fn is_shallow(&self) -> bool;
}

/// [`Vcs`] implementation that drives the `git` command-line tool.
pub struct GitCli {
    root: PathBuf,
}

impl GitCli {
    pub fn new(root: impl Into<PathBuf>) -> GitCli {
        GitCli { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run git with the given args and return trimmed stdout.
    fn git(&self, args: &[&str]) -> EngineResult<String> {
        debug!(?args, "running git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| EngineError::vcs(format!("failed to run git: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(EngineError::vcs(format!(
                "git {} failed: {}",
                args.first().unwrap_or(&""),
                stderr
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Vcs for GitCli {
    fn current_branch_name(&self) -> EngineResult<String> {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    fn head_commit(&self) -> EngineResult<String> {
        self.git(&["rev-parse", "HEAD"])
    }

    fn lookup_commit(&self, reference: &str) -> EngineResult<String> {
        let spec = format!("{}^{{commit}}", reference);
        self.git(&["rev-parse", "--verify", "--quiet", &spec])
            .map_err(|_| EngineError::CommitNotFound {
                reference: reference.to_string(),
            })
    }

    fn list_tags(&self) -> EngineResult<Vec<TagEntry>> {
        let raw = self.git(&[
            "for-each-ref",
            "refs/tags",
            "--format=%(refname:short)%09%(objectname)%09%(*objectname)%09%(creatordate:unix)",
        ])?;

        let mut tags = Vec::new();
        for line in raw.lines() {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 4 {
                continue;
            }
            let peeled = fields[2];
            let target = if peeled.is_empty() { fields[1] } else { peeled };
            let committer_time = fields[3].parse::<i64>().unwrap_or(0);
            tags.push(TagEntry {
                name: fields[0].to_string(),
                target: target.to_string(),
                committer_time,
            });
        }
        Ok(tags)
    }

    fn diff(&self, from: &str, to: &str) -> EngineResult<Vec<DiffEntry>> {
        let raw = self.git(&["diff", "--name-status", from, to])?;

        let mut entries = Vec::new();
        for line in raw.lines() {
            let mut fields = line.split('\t');
            let Some(status) = fields.next() else {
                continue;
            };
            // Renames/copies carry two paths; the new path is the last field.
            let Some(path) = fields.next_back() else {
                continue;
            };
            let kind = match status.chars().next() {
                Some('A') => ChangeKind::Added,
                Some('M') => ChangeKind::Modified,
                Some('D') => ChangeKind::Deleted,
                Some('R') | Some('C') => ChangeKind::Renamed,
                _ => ChangeKind::Other,
            };
            entries.push(DiffEntry {
                path: path.to_string(),
                kind,
            });
        }
        Ok(entries)
    }

    fn commit_height(&self, from: &str, to: &str) -> EngineResult<u64> {
        let range = format!("{}..{}", from, to);
        let raw = self.git(&["rev-list", "--count", &range])?;
        raw.parse::<u64>()
            .map_err(|_| EngineError::vcs(format!("unexpected rev-list output '{}'", raw)))
    }

    fn commits_between(&self, from: Option<&str>, to: &str) -> EngineResult<Vec<CommitInfo>> {
        let range = match from {
            Some(from) => format!("{}..{}", from, to),
            None => to.to_string(),
        };
        let raw = self.git(&[
            "log",
            &range,
            "--format=%H%x1f%an%x1f%ae%x1f%at%x1f%B%x1e",
        ])?;

        let mut commits = Vec::new();
        for record in raw.split('\u{1e}') {
            let record = record.trim_matches(|c| c == '\n' || c == '\r');
            if record.is_empty() {
                continue;
            }
            let fields: Vec<&str> = record.splitn(5, '\u{1f}').collect();
            if fields.len() < 5 {
                continue;
            }
            commits.push(CommitInfo {
                sha: fields[0].trim().to_string(),
                author_name: fields[1].to_string(),
                author_email: fields[2].to_string(),
                author_time: fields[3].parse::<i64>().unwrap_or(0),
                message: fields[4].trim().to_string(),
            });
        }
        Ok(commits)
    }

    fn create_annotated_tag(&self, name: &str, message: &str) -> EngineResult<bool> {
        if self.tag_exists(name)? {
            debug!(tag = %name, "tag already exists, skipping creation");
            return Ok(false);
        }
        self.git(&["tag", "-a", name, "-m", message])?;
        Ok(true)
    }

    fn tag_exists(&self, name: &str) -> EngineResult<bool> {
        let out = self.git(&["tag", "-l", name])?;
        Ok(!out.is_empty())
    }

    fn is_shallow(&self) -> bool {
        self.git(&["rev-parse", "--is-shallow-repository"])
            .map(|s| s == "true")
            .unwrap_or(false)
    }
}
