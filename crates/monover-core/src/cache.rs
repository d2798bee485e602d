//! Per-run memoization.
//!
//! Everything is keyed under the head commit the run started from; if the
//! head moves between queries the whole cache is dropped. Nothing survives
//! the run. Interior mutability keeps the engine's borrow story simple in
//! single-threaded use.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::branch::VersionTag;
use crate::project::ProjectInfo;

#[derive(Default)]
pub struct RunCache {
    head: RefCell<Option<String>>,
    projects: RefCell<Option<Vec<ProjectInfo>>>,
    direct_deps: RefCell<HashMap<PathBuf, Vec<PathBuf>>>,
    tags: RefCell<HashMap<String, Option<VersionTag>>>,
    heights: RefCell<HashMap<String, u64>>,
    has_changes: RefCell<HashMap<String, bool>>,
}

impl RunCache {
    pub fn new() -> RunCache {
        RunCache::default()
    }

    /// Drop everything if `head` differs from the head the cache was filled
    /// under, then adopt `head`.
    pub fn validate_and_invalidate(&self, head: &str) {
        let mut current = self.head.borrow_mut();
        if current.as_deref() != Some(head) {
            drop(current);
            self.clear_all();
            *self.head.borrow_mut() = Some(head.to_string());
        }
    }

    pub fn clear_all(&self) {
        *self.head.borrow_mut() = None;
        *self.projects.borrow_mut() = None;
        self.direct_deps.borrow_mut().clear();
        self.tags.borrow_mut().clear();
        self.heights.borrow_mut().clear();
        self.has_changes.borrow_mut().clear();
    }

    pub fn projects(&self) -> Option<Vec<ProjectInfo>> {
        self.projects.borrow().clone()
    }

    pub fn store_projects(&self, projects: Vec<ProjectInfo>) {
        *self.projects.borrow_mut() = Some(projects);
    }

    pub fn direct_deps(&self, manifest: &PathBuf) -> Option<Vec<PathBuf>> {
        self.direct_deps.borrow().get(manifest).cloned()
    }

    pub fn store_direct_deps(&self, manifest: PathBuf, deps: Vec<PathBuf>) {
        self.direct_deps.borrow_mut().insert(manifest, deps);
    }

    /// Cache key for a project's resolved tag: `{project}_{branch-kind}_{prefix}`.
    pub fn tag_key(project: &str, branch_kind: &str, prefix: &str) -> String {
        format!("{}_{}_{}", project, branch_kind, prefix)
    }

    /// Returns `None` when the key was never computed; `Some(None)` records a
    /// lookup that found no tag.
    pub fn tag(&self, key: &str) -> Option<Option<VersionTag>> {
        self.tags.borrow().get(key).cloned()
    }

    pub fn store_tag(&self, key: String, tag: Option<VersionTag>) {
        self.tags.borrow_mut().insert(key, tag);
    }

    pub fn height_key(from: &str, to: &str) -> String {
        format!("{}_{}", from, to)
    }

    pub fn height(&self, key: &str) -> Option<u64> {
        self.heights.borrow().get(key).copied()
    }

    pub fn store_height(&self, key: String, height: u64) {
        self.heights.borrow_mut().insert(key, height);
    }

    pub fn has_changes(&self, key: &str) -> Option<bool> {
        self.has_changes.borrow().get(key).copied()
    }

    pub fn store_has_changes(&self, key: String, changed: bool) {
        self.has_changes.borrow_mut().insert(key, changed);
    }
}
