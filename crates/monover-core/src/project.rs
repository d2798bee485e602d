//! Project discovery and the dependency graph.
//!
//! The engine sees projects through the [`ProjectGraph`] trait: enumerate
//! manifest files, parse one manifest. Everything else (name resolution,
//! transitive closure) is built on top here. [`YamlManifestGraph`] is the
//! production implementation reading `project.yaml` manifests.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use rayon::prelude::*;
use serde::Deserialize;
use tracing::warn;

use crate::error::{EngineError, EngineResult};

/// Manifest file name recognized by the production graph implementation.
pub const MANIFEST_FILE: &str = "project.yaml";

/// Directories never scanned for manifests.
const EXCLUDED_DIRS: &[&str] = &[".git", "target", "node_modules", "bin", "obj", ".idea", ".vscode"];

/// A parsed project manifest, before graph resolution.
#[derive(Debug, Clone)]
pub struct ProjectManifest {
    pub name: String,
    pub is_test: bool,
    pub is_packable: bool,
    /// Paths to the manifests of direct dependencies.
    pub direct_deps: Vec<PathBuf>,
}

/// A project with its resolved dependency sets.
#[derive(Debug, Clone)]
pub struct ProjectInfo {
    pub name: String,
    pub manifest_path: PathBuf,
    pub is_test: bool,
    pub is_packable: bool,
    /// Names of direct dependencies.
    pub direct_deps: BTreeSet<String>,
    /// Names of all transitively reachable dependencies.
    pub all_deps: BTreeSet<String>,
}

impl ProjectInfo {
    /// The project's source directory: where its manifest lives.
    pub fn source_dir(&self) -> &Path {
        self.manifest_path.parent().unwrap_or(Path::new(""))
    }
}

/// Access to project manifests and their dependency edges.
pub trait ProjectGraph {
    /// All manifest paths under `repo_root` (optionally restricted to a
    /// subdirectory), in a stable order.
    fn enumerate_manifests(
        &self,
        repo_root: &Path,
        subdir: Option<&Path>,
    ) -> EngineResult<Vec<PathBuf>>;

    /// Parse a single manifest.
    fn parse_manifest(&self, manifest: &Path) -> EngineResult<ProjectManifest>;
}

/// Lexically normalize a path: resolve `.` and `..` without touching the
/// filesystem, so fakes can use paths that do not exist on disk.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Load every project and resolve direct and transitive dependency sets.
///
/// Dependency edges pointing at manifests outside the enumerated set are
/// dropped with a warning. Cycles terminate through the visited set; every
/// reachable project appears in `all_deps` exactly once.
pub fn load_projects<G: ProjectGraph + Sync>(
    graph: &G,
    repo_root: &Path,
    subdir: Option<&Path>,
) -> EngineResult<Vec<ProjectInfo>> {
    let manifests = graph.enumerate_manifests(repo_root, subdir)?;

    // Parse in parallel; manifest parsing dominates discovery time in large
    // monorepos.
    let parsed: Vec<(PathBuf, EngineResult<ProjectManifest>)> = manifests
        .par_iter()
        .map(|path| (normalize_path(path), graph.parse_manifest(path)))
        .collect();

    let mut by_path: BTreeMap<PathBuf, ProjectManifest> = BTreeMap::new();
    let mut seen_names: HashSet<String> = HashSet::new();
    for (path, result) in parsed {
        match result {
            Ok(manifest) => {
                if !seen_names.insert(manifest.name.clone()) {
                    warn!(
                        project = %manifest.name,
                        manifest = %path.display(),
                        "duplicate project name, keeping the first occurrence"
                    );
                    continue;
                }
                by_path.insert(path, manifest);
            }
            Err(e) => {
                warn!(manifest = %path.display(), error = %e, "skipping unreadable manifest");
            }
        }
    }

    // Resolve dependency manifest paths to project names.
    let name_of: HashMap<PathBuf, String> = by_path
        .iter()
        .map(|(path, m)| (path.clone(), m.name.clone()))
        .collect();

    let mut direct: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (path, manifest) in &by_path {
        let base = path.parent().unwrap_or(Path::new(""));
        let mut deps = BTreeSet::new();
        for dep in &manifest.direct_deps {
            let resolved = if dep.is_absolute() {
                normalize_path(dep)
            } else {
                normalize_path(&base.join(dep))
            };
            match name_of.get(&resolved) {
                Some(name) if name != &manifest.name => {
                    deps.insert(name.clone());
                }
                Some(_) => {}
                None => {
                    warn!(
                        project = %manifest.name,
                        dependency = %resolved.display(),
                        "dependency manifest not found in workspace, edge dropped"
                    );
                }
            }
        }
        direct.insert(manifest.name.clone(), deps);
    }

    // Transitive closure per project, bounded by a visited set.
    let mut projects = Vec::new();
    for (path, manifest) in &by_path {
        let direct_deps = direct.get(&manifest.name).cloned().unwrap_or_default();
        let mut all_deps = BTreeSet::new();
        let mut stack: Vec<String> = direct_deps.iter().cloned().collect();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(manifest.name.clone());
        while let Some(dep) = stack.pop() {
            if !visited.insert(dep.clone()) {
                continue;
            }
            if let Some(next) = direct.get(&dep) {
                stack.extend(next.iter().cloned());
            }
            all_deps.insert(dep);
        }

        projects.push(ProjectInfo {
            name: manifest.name.clone(),
            manifest_path: path.clone(),
            is_test: manifest.is_test,
            is_packable: manifest.is_packable,
            direct_deps,
            all_deps,
        });
    }

    projects.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(projects)
}

/// Order projects so dependencies come before their dependents, names
/// breaking ties. Cycles fall back to name order for the remainder.
pub fn topological_order(projects: &[ProjectInfo]) -> Vec<String> {
    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let known: HashSet<&str> = projects.iter().map(|p| p.name.as_str()).collect();

    for project in projects {
        let deps_in_repo = project
            .direct_deps
            .iter()
            .filter(|d| known.contains(d.as_str()))
            .count();
        indegree.insert(&project.name, deps_in_repo);
        for dep in &project.direct_deps {
            if known.contains(dep.as_str()) {
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(&project.name);
            }
        }
    }

    let mut ready: Vec<&str> = indegree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::new();

    while let Some(name) = ready.first().copied() {
        ready.remove(0);
        order.push(name.to_string());
        if let Some(deps) = dependents.get(name) {
            for dependent in deps {
                if let Some(deg) = indegree.get_mut(dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        let pos = ready.partition_point(|r| *r < *dependent);
                        ready.insert(pos, *dependent);
                    }
                }
            }
        }
    }

    // Cyclic remainder, in name order.
    for project in projects {
        if !order.contains(&project.name) {
            order.push(project.name.clone());
        }
    }
    order
}

// ---------------------------------------------------------------------------
// YAML manifest implementation
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

/// On-disk shape of a `project.yaml` manifest.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestYaml {
    name: String,

    #[serde(default)]
    is_test: bool,

    #[serde(default = "default_true")]
    is_packable: bool,

    /// Dependency entries: a manifest path or a project directory.
    #[serde(default)]
    dependencies: Vec<String>,

    /// Dependencies applying only under a named target/configuration.
    #[serde(default)]
    conditional_dependencies: BTreeMap<String, Vec<String>>,
}

/// [`ProjectGraph`] reading `project.yaml` manifests discovered by glob.
pub struct YamlManifestGraph {
    /// Glob patterns (relative to the repo root) locating project
    /// directories or manifests.
    pub manifest_patterns: Vec<String>,

    /// Union conditional dependency lists into the direct set. When false
    /// only the unconditional list contributes edges.
    pub union_conditional_deps: bool,
}

impl YamlManifestGraph {
    pub fn new(manifest_patterns: Vec<String>) -> YamlManifestGraph {
        YamlManifestGraph {
            manifest_patterns,
            union_conditional_deps: true,
        }
    }

    fn is_excluded(path: &Path, root: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        relative
            .components()
            .any(|c| matches!(c, Component::Normal(s) if EXCLUDED_DIRS.contains(&s.to_str().unwrap_or(""))))
    }
}

impl ProjectGraph for YamlManifestGraph {
    fn enumerate_manifests(
        &self,
        repo_root: &Path,
        subdir: Option<&Path>,
    ) -> EngineResult<Vec<PathBuf>> {
        let scan_root = match subdir {
            Some(sub) => repo_root.join(sub),
            None => repo_root.to_path_buf(),
        };

        let mut found: BTreeSet<PathBuf> = BTreeSet::new();
        for pattern in &self.manifest_patterns {
            let full_pattern = scan_root.join(pattern).display().to_string();
            let entries = glob::glob(&full_pattern).map_err(|e| EngineError::Config {
                message: format!("invalid manifest pattern '{}': {}", pattern, e),
            })?;

            for entry in entries {
                let path = match entry {
                    Ok(path) => path,
                    Err(e) => {
                        warn!(error = %e, "failed to read glob entry");
                        continue;
                    }
                };
                if Self::is_excluded(&path, repo_root) {
                    continue;
                }
                if path.is_dir() {
                    let manifest = path.join(MANIFEST_FILE);
                    if manifest.is_file() {
                        found.insert(normalize_path(&manifest));
                    }
                } else if path.file_name().and_then(|n| n.to_str()) == Some(MANIFEST_FILE) {
                    found.insert(normalize_path(&path));
                }
            }
        }

        Ok(found.into_iter().collect())
    }

    fn parse_manifest(&self, manifest: &Path) -> EngineResult<ProjectManifest> {
        let content = std::fs::read_to_string(manifest)?;
        let parsed: ManifestYaml =
            yaml_serde::from_str(&content).map_err(|e| EngineError::Config {
                message: format!("failed to parse {}: {}", manifest.display(), e),
            })?;

        let mut deps: Vec<String> = parsed.dependencies;
        if self.union_conditional_deps {
            for list in parsed.conditional_dependencies.values() {
                deps.extend(list.iter().cloned());
            }
        }

        let direct_deps = deps
            .into_iter()
            .map(|entry| {
                let path = PathBuf::from(entry.replace('\\', "/"));
                // A directory entry points at the manifest inside it.
                if path.file_name().and_then(|n| n.to_str()) == Some(MANIFEST_FILE) {
                    path
                } else {
                    path.join(MANIFEST_FILE)
                }
            })
            .collect();

        Ok(ProjectManifest {
            name: parsed.name,
            is_test: parsed.is_test,
            is_packable: parsed.is_packable,
            direct_deps,
        })
    }
}
