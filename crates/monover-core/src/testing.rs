//! In-memory fakes for the engine's collaborators.
//!
//! Unit tests across the crate (and downstream consumers) drive the engine
//! against these instead of a real repository. Builders mirror the setup
//! vocabulary of the real adapters: branches, tags, diffs, commits.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};
use crate::project::{ProjectGraph, ProjectManifest};
use crate::vcs::{ChangeKind, CommitInfo, DiffEntry, TagEntry, Vcs};

/// Build a [`CommitInfo`] with filler author data.
pub fn commit(sha: &str, message: &str) -> CommitInfo {
    CommitInfo {
        sha: sha.to_string(),
        message: message.to_string(),
        author_name: "Dev One".to_string(),
        author_email: "dev@example.com".to_string(),
        author_time: 1_700_000_000,
    }
}

/// In-memory [`Vcs`] for tests.
#[derive(Default)]
pub struct FakeVcs {
    branch: String,
    head: String,
    shallow: bool,
    tags: Vec<TagEntry>,
    diffs: HashMap<(String, String), Vec<DiffEntry>>,
    default_diff: Vec<DiffEntry>,
    commits: Vec<CommitInfo>,
    heights: HashMap<(String, String), u64>,
    default_height: u64,
    missing_refs: HashSet<String>,
    /// Tags created through the trait, observable by assertions.
    pub created_tags: RefCell<Vec<(String, String)>>,
}

impl FakeVcs {
    pub fn new() -> FakeVcs {
        FakeVcs {
            branch: "main".to_string(),
            head: "headsha".to_string(),
            default_height: 1,
            ..Default::default()
        }
    }

    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branch = branch.to_string();
        self
    }

    pub fn with_head(mut self, head: &str) -> Self {
        self.head = head.to_string();
        self
    }

    pub fn with_shallow(mut self, shallow: bool) -> Self {
        self.shallow = shallow;
        self
    }

    pub fn with_tag(mut self, name: &str, target: &str, committer_time: i64) -> Self {
        self.tags.push(TagEntry {
            name: name.to_string(),
            target: target.to_string(),
            committer_time,
        });
        self
    }

    /// Register the diff returned for a specific `(from, to)` pair.
    pub fn with_diff(mut self, from: &str, to: &str, paths: &[&str]) -> Self {
        self.diffs.insert(
            (from.to_string(), to.to_string()),
            paths
                .iter()
                .map(|p| DiffEntry {
                    path: p.to_string(),
                    kind: ChangeKind::Modified,
                })
                .collect(),
        );
        self
    }

    /// Diff returned when no exact `(from, to)` pair was registered.
    pub fn with_default_diff(mut self, paths: &[&str]) -> Self {
        self.default_diff = paths
            .iter()
            .map(|p| DiffEntry {
                path: p.to_string(),
                kind: ChangeKind::Modified,
            })
            .collect();
        self
    }

    pub fn with_commit(mut self, sha: &str, message: &str) -> Self {
        self.commits.push(commit(sha, message));
        self
    }

    pub fn with_height(mut self, from: &str, to: &str, height: u64) -> Self {
        self.heights
            .insert((from.to_string(), to.to_string()), height);
        self
    }

    pub fn with_default_height(mut self, height: u64) -> Self {
        self.default_height = height;
        self
    }

    /// Make a reference unresolvable, as if history were pruned.
    pub fn with_missing_ref(mut self, reference: &str) -> Self {
        self.missing_refs.insert(reference.to_string());
        self
    }
}

impl Vcs for FakeVcs {
    fn current_branch_name(&self) -> EngineResult<String> {
        Ok(self.branch.clone())
    }

    fn head_commit(&self) -> EngineResult<String> {
        Ok(self.head.clone())
    }

    fn lookup_commit(&self, reference: &str) -> EngineResult<String> {
        if self.missing_refs.contains(reference) {
            return Err(EngineError::CommitNotFound {
                reference: reference.to_string(),
            });
        }
        Ok(reference.to_string())
    }

    fn list_tags(&self) -> EngineResult<Vec<TagEntry>> {
        Ok(self.tags.clone())
    }

    fn diff(&self, from: &str, to: &str) -> EngineResult<Vec<DiffEntry>> {
        if self.missing_refs.contains(from) {
            return Err(EngineError::CommitNotFound {
                reference: from.to_string(),
            });
        }
        Ok(self
            .diffs
            .get(&(from.to_string(), to.to_string()))
            .cloned()
            .unwrap_or_else(|| self.default_diff.clone()))
    }

    fn commit_height(&self, from: &str, to: &str) -> EngineResult<u64> {
        Ok(self
            .heights
            .get(&(from.to_string(), to.to_string()))
            .copied()
            .unwrap_or(self.default_height))
    }

    fn commits_between(&self, _from: Option<&str>, _to: &str) -> EngineResult<Vec<CommitInfo>> {
        Ok(self.commits.clone())
    }

    fn create_annotated_tag(&self, name: &str, message: &str) -> EngineResult<bool> {
        if self.tag_exists(name)? {
            return Ok(false);
        }
        self.created_tags
            .borrow_mut()
            .push((name.to_string(), message.to_string()));
        Ok(true)
    }

    fn tag_exists(&self, name: &str) -> EngineResult<bool> {
        Ok(self.tags.iter().any(|t| t.name == name)
            || self.created_tags.borrow().iter().any(|(n, _)| n == name))
    }

    fn is_shallow(&self) -> bool {
        self.shallow
    }
}

/// In-memory [`ProjectGraph`] for tests.
#[derive(Default)]
pub struct FakeGraph {
    manifests: Vec<PathBuf>,
    parsed: HashMap<PathBuf, ProjectManifest>,
}

impl FakeGraph {
    pub fn new() -> FakeGraph {
        FakeGraph::default()
    }

    /// Register a project. `manifest` and `deps` are repo-root-relative
    /// manifest paths; dependency edges are stored relative to the manifest
    /// directory, the way real manifests express them.
    pub fn with_project(mut self, name: &str, manifest: &str, deps: &[&str]) -> Self {
        let manifest_path = PathBuf::from(manifest);
        let base = manifest_path.parent().unwrap_or(Path::new(""));
        let direct_deps = deps
            .iter()
            .map(|dep| {
                pathdiff::diff_paths(Path::new(dep), base)
                    .unwrap_or_else(|| PathBuf::from(dep))
            })
            .collect();

        self.manifests.push(manifest_path.clone());
        self.parsed.insert(
            manifest_path,
            ProjectManifest {
                name: name.to_string(),
                is_test: false,
                is_packable: true,
                direct_deps,
            },
        );
        self
    }

    /// Mark the most recently added project as a test project.
    pub fn test_project(mut self) -> Self {
        if let Some(path) = self.manifests.last()
            && let Some(manifest) = self.parsed.get_mut(path)
        {
            manifest.is_test = true;
        }
        self
    }

    /// Mark the most recently added project as non-packable.
    pub fn non_packable(mut self) -> Self {
        if let Some(path) = self.manifests.last()
            && let Some(manifest) = self.parsed.get_mut(path)
        {
            manifest.is_packable = false;
        }
        self
    }
}

impl ProjectGraph for FakeGraph {
    fn enumerate_manifests(
        &self,
        _repo_root: &Path,
        subdir: Option<&Path>,
    ) -> EngineResult<Vec<PathBuf>> {
        let mut manifests: Vec<PathBuf> = match subdir {
            Some(sub) => self
                .manifests
                .iter()
                .filter(|m| m.starts_with(sub))
                .cloned()
                .collect(),
            None => self.manifests.clone(),
        };
        manifests.sort();
        Ok(manifests)
    }

    fn parse_manifest(&self, manifest: &Path) -> EngineResult<ProjectManifest> {
        self.parsed
            .get(manifest)
            .cloned()
            .ok_or_else(|| EngineError::Config {
                message: format!("no manifest at {}", manifest.display()),
            })
    }
}
