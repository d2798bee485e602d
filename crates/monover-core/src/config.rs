//! `monover.yaml` configuration.
//!
//! Global settings plus per-project overrides; overrides always win. Unknown
//! keys are tolerated and reported as warnings by [`MonoverConfig::validate`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::calculator::{
    GitIntegrationConfig, PrereleaseType, VersionOptions, VersionScheme,
};
use crate::calver::CalVerConfig;
use crate::constraints::VersionConstraints;
use crate::conventional::ConventionalCommitConfig;
use crate::error::{EngineError, EngineResult};
use crate::patterns::ChangeDetectionConfig;
use crate::policy::VersionPolicyConfig;
use crate::project::ProjectInfo;
use crate::version::{BumpType, parse_version};

/// Configuration file name looked up at the repository root.
pub const CONFIG_FILE: &str = "monover.yaml";

/// Per-project override block under `projects.{name}`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectOverrides {
    pub prerelease_type: Option<PrereleaseType>,
    pub force_version: Option<String>,
    pub base_version: Option<String>,
    pub additional_monitor_paths: Vec<String>,
    pub constraints: Option<VersionConstraints>,
    /// Approve a Major bump for this project when the majorApproval
    /// constraint is enabled.
    pub major_approved: Option<bool>,
}

/// Top-level `monover.yaml`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonoverConfig {
    /// Glob patterns locating project manifests, relative to the repo root.
    pub manifest_patterns: Vec<String>,

    pub prerelease_type: Option<PrereleaseType>,
    pub tag_prefix: Option<String>,
    pub base_version: Option<String>,
    pub skip_test_projects: Option<bool>,
    pub skip_non_packable_projects: Option<bool>,
    pub default_increment: Option<BumpType>,
    pub scheme: Option<VersionScheme>,

    /// Approve Major bumps for this run when `constraints.requireMajorApproval`
    /// is set. Usually supplied per run via `--major-approved` rather than
    /// committed to the config file.
    pub major_approved: Option<bool>,

    /// Union conditional dependency lists during graph resolution.
    pub union_conditional_dependencies: Option<bool>,

    /// Per-project overrides keyed by project name.
    pub projects: HashMap<String, ProjectOverrides>,

    pub change_detection: ChangeDetectionConfig,
    pub conventional_commits: ConventionalCommitConfig,
    pub cal_ver: CalVerConfig,
    pub version_policy: VersionPolicyConfig,
    pub constraints: VersionConstraints,
    pub git_integration: GitIntegrationConfig,

    /// Anything we did not recognize, kept for the validation warning.
    #[serde(flatten)]
    pub(crate) unknown: HashMap<String, yaml_serde::Value>,
}

impl MonoverConfig {
    /// Parse a config file.
    pub fn load(path: &Path) -> EngineResult<MonoverConfig> {
        let content = std::fs::read_to_string(path)?;
        yaml_serde::from_str(&content).map_err(|e| EngineError::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
        })
    }

    /// Load `monover.yaml` from the repository root, falling back to the
    /// built-in defaults when the file does not exist.
    pub fn load_or_default(repo_root: &Path) -> EngineResult<MonoverConfig> {
        let path = repo_root.join(CONFIG_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(MonoverConfig::default())
        }
    }

    /// Manifest discovery patterns, defaulting to a full scan.
    pub fn manifest_patterns(&self) -> Vec<String> {
        if self.manifest_patterns.is_empty() {
            vec!["**".to_string()]
        } else {
            self.manifest_patterns.clone()
        }
    }

    pub fn tag_prefix(&self) -> &str {
        self.tag_prefix.as_deref().unwrap_or("v")
    }

    /// Non-fatal configuration problems.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for key in self.unknown.keys() {
            warnings.push(format!("unknown configuration key '{}' ignored", key));
        }

        if let Some(base) = &self.base_version
            && parse_version(base, self.tag_prefix()).is_err()
        {
            warnings.push(format!("baseVersion '{}' is not valid SemVer, ignored", base));
        }

        for (name, overrides) in &self.projects {
            if let Some(base) = &overrides.base_version
                && parse_version(base, self.tag_prefix()).is_err()
            {
                warnings.push(format!(
                    "projects.{}.baseVersion '{}' is not valid SemVer, ignored",
                    name, base
                ));
            }
        }

        warnings
    }

    /// Assemble the calculator options for one project, merging per-project
    /// overrides over the global settings.
    pub fn effective_options(
        &self,
        project: &ProjectInfo,
        all: &[ProjectInfo],
        repo_root: &Path,
    ) -> VersionOptions {
        let overrides = self.projects.get(&project.name);

        let base_version = overrides
            .and_then(|o| o.base_version.as_ref())
            .or(self.base_version.as_ref())
            .and_then(|raw| match parse_version(raw, self.tag_prefix()) {
                Ok(version) => Some(version),
                Err(_) => {
                    warn!(project = %project.name, value = %raw, "ignoring malformed base version");
                    None
                }
            });

        let mut monitor_paths = self.change_detection.additional_monitor_paths.clone();
        if let Some(extra) = overrides.map(|o| &o.additional_monitor_paths) {
            monitor_paths.extend(extra.iter().cloned());
        }

        let dependencies = project
            .all_deps
            .iter()
            .filter_map(|dep| all.iter().find(|p| &p.name == dep))
            .map(|dep| rel_dir(dep.source_dir(), repo_root))
            .collect();

        VersionOptions {
            repo_root: repo_root.to_path_buf(),
            project_path: rel_dir(project.source_dir(), repo_root),
            project_name: project.name.clone(),
            tag_prefix: self.tag_prefix().to_string(),
            prerelease_type: overrides
                .and_then(|o| o.prerelease_type.clone())
                .or_else(|| self.prerelease_type.clone())
                .unwrap_or_default(),
            base_version,
            force_version: overrides.and_then(|o| o.force_version.clone()),
            dependencies,
            additional_monitor_paths: monitor_paths,
            skip_test_projects: self.skip_test_projects.unwrap_or(false),
            skip_non_packable: self.skip_non_packable_projects.unwrap_or(false),
            default_increment: self.default_increment,
            scheme: self.scheme.unwrap_or_default(),
            calver: self.cal_ver.clone(),
            git: self.git_integration,
            change_detection: self.change_detection.clone(),
            constraints: overrides
                .and_then(|o| o.constraints.clone())
                .unwrap_or_else(|| self.constraints.clone()),
            conventional: self.conventional_commits.clone(),
            is_test: project.is_test,
            is_packable: project.is_packable,
            major_approved: overrides
                .and_then(|o| o.major_approved)
                .or(self.major_approved)
                .unwrap_or(false),
        }
    }
}

/// A directory relative to the repository root, tolerating inputs that are
/// already relative.
fn rel_dir(dir: &Path, repo_root: &Path) -> PathBuf {
    if let Ok(stripped) = dir.strip_prefix(repo_root) {
        return stripped.to_path_buf();
    }
    pathdiff::diff_paths(dir, repo_root).unwrap_or_else(|| dir.to_path_buf())
}
