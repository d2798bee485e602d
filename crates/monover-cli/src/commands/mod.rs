pub mod changelog;
pub mod graph;
pub mod init;
pub mod tag;
pub mod version;

use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use monover_core::config::MonoverConfig;
use monover_core::engine::RunRequest;
use monover_core::project::{ProjectInfo, YamlManifestGraph, load_projects};
use monover_core::vcs::GitCli;

/// Load the configuration and build the concrete adapters for a repository.
pub fn load_parts(repo: &Path) -> Result<(GitCli, YamlManifestGraph, MonoverConfig)> {
    if !repo.is_dir() {
        bail!("repository path '{}' is not a directory", repo.display());
    }
    let config = MonoverConfig::load_or_default(repo)
        .with_context(|| format!("failed to load configuration from {}", repo.display()))?;

    let mut graph = YamlManifestGraph::new(config.manifest_patterns());
    if let Some(union) = config.union_conditional_dependencies {
        graph.union_conditional_deps = union;
    }

    Ok((GitCli::new(repo), graph, config))
}

/// A run request stamped with today's UTC date.
pub fn request_for(repo: &Path) -> RunRequest {
    RunRequest::new(repo, Utc::now().date_naive())
}

/// Resolve a `--project` argument given either a project name or its
/// directory path relative to the repository root.
pub fn resolve_project(
    repo: &Path,
    graph: &YamlManifestGraph,
    selector: &str,
) -> Result<String> {
    let projects: Vec<ProjectInfo> = load_projects(graph, repo, None)?;

    if let Some(found) = projects.iter().find(|p| p.name == selector) {
        return Ok(found.name.clone());
    }

    let wanted = Path::new(selector);
    if let Some(found) = projects.iter().find(|p| {
        let dir = p.source_dir();
        dir == wanted || dir.strip_prefix(repo).map(|d| d == wanted).unwrap_or(false)
    }) {
        return Ok(found.name.clone());
    }

    bail!(
        "no project named or located at '{}' (discovered {} project(s))",
        selector,
        projects.len()
    );
}
