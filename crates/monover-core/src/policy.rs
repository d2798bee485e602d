//! Cross-project version coordination.
//!
//! Three policies: lock-step (everything shares one version), independent
//! (each project on its own), grouped (named groups, each with a strategy).
//! Coordination is a pure post-pass over the per-project results.

use std::collections::BTreeMap;

use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calculator::VersionResult;
use crate::version::{full_string, parse_version};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    LockStep,
    #[default]
    Independent,
    Grouped,
}

/// A named coordination group.
///
/// Membership entries are literal project names or a trailing-wildcard
/// pattern like `Contoso.*`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyGroup {
    pub projects: Vec<String>,
    pub strategy: PolicyKind,
    pub base_version: Option<String>,
}

impl Default for PolicyGroup {
    fn default() -> Self {
        PolicyGroup {
            projects: Vec::new(),
            strategy: PolicyKind::LockStep,
            base_version: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct VersionPolicyConfig {
    pub policy: PolicyKind,
    pub groups: BTreeMap<String, PolicyGroup>,
}

/// Literal or trailing-wildcard membership test.
fn member_matches(pattern: &str, project: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        project.starts_with(prefix)
    } else {
        pattern == project
    }
}

impl PolicyGroup {
    pub fn contains(&self, project: &str) -> bool {
        self.projects.iter().any(|p| member_matches(p, project))
    }

    /// Expand membership against the full project list.
    pub fn members<'a>(&self, all: &'a [String]) -> Vec<&'a String> {
        all.iter().filter(|p| self.contains(p)).collect()
    }
}

impl VersionPolicyConfig {
    /// The group a project belongs to, if any.
    pub fn group_of(&self, project: &str) -> Option<(&String, &PolicyGroup)> {
        self.groups.iter().find(|(_, g)| g.contains(project))
    }

    /// Problems that make the policy configuration unusable. The engine
    /// refuses to run while any exist.
    pub fn validate_configuration(&self, all_projects: &[String]) -> Vec<String> {
        let mut problems = Vec::new();

        if self.policy == PolicyKind::Grouped && self.groups.is_empty() {
            problems.push("grouped policy configured without any groups".to_string());
        }

        for (name, group) in &self.groups {
            if group.projects.is_empty() {
                problems.push(format!("group '{}' has no projects", name));
            }
            if let Some(base) = &group.base_version
                && parse_version(base, "").is_err()
            {
                problems.push(format!(
                    "group '{}' base version '{}' is malformed",
                    name, base
                ));
            }
        }

        for project in all_projects {
            let owning: Vec<&String> = self
                .groups
                .iter()
                .filter(|(_, g)| g.contains(project))
                .map(|(name, _)| name)
                .collect();
            if owning.len() > 1 {
                problems.push(format!(
                    "project '{}' belongs to multiple groups: {}",
                    project,
                    owning
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
        }

        problems
    }

    /// Projects whose versions move together with `project`.
    pub fn linked_projects(&self, project: &str, all: &[String]) -> Vec<String> {
        match self.policy {
            PolicyKind::LockStep => all.to_vec(),
            PolicyKind::Independent => vec![project.to_string()],
            PolicyKind::Grouped => match self.group_of(project) {
                Some((_, group)) => group.members(all).into_iter().cloned().collect(),
                None => vec![project.to_string()],
            },
        }
    }
}

/// The version a group settles on: its configured base version if present,
/// else the highest computed version among its members, else `0.1.0`.
pub fn coordinate_group_version(
    results: &BTreeMap<String, VersionResult>,
    group: &PolicyGroup,
) -> Version {
    if let Some(base) = &group.base_version
        && let Ok(version) = parse_version(base, "")
    {
        return version;
    }

    results
        .iter()
        .filter(|(name, _)| group.contains(name))
        .map(|(_, result)| result.semver.clone())
        .max_by(|a, b| a.cmp_precedence(b))
        .unwrap_or_else(|| Version::new(0, 1, 0))
}

fn align(results: &mut BTreeMap<String, VersionResult>, members: &[String], version: &Version) {
    let any_changed = members
        .iter()
        .filter_map(|m| results.get(m.as_str()))
        .any(|r| r.changed);

    for member in members {
        if let Some(result) = results.get_mut(member.as_str()) {
            if result.semver.cmp_precedence(version).is_ne() {
                result.semver = version.clone();
                result.version = full_string(version);
            }
            if any_changed {
                result.changed = true;
            }
        }
    }
}

/// Rewrite results so coordinated projects share their group version.
pub fn apply_policy(results: &mut BTreeMap<String, VersionResult>, config: &VersionPolicyConfig) {
    let all: Vec<String> = results.keys().cloned().collect();

    match config.policy {
        PolicyKind::Independent => {}
        PolicyKind::LockStep => {
            let everything = PolicyGroup {
                projects: vec!["*".to_string()],
                strategy: PolicyKind::LockStep,
                base_version: None,
            };
            let version = coordinate_group_version(results, &everything);
            debug!(version = %version, "lock-step version selected");
            align(results, &all, &version);
        }
        PolicyKind::Grouped => {
            let groups: Vec<PolicyGroup> = config.groups.values().cloned().collect();
            for group in groups {
                if group.strategy == PolicyKind::Independent {
                    continue;
                }
                let members: Vec<String> = group
                    .members(&all)
                    .into_iter()
                    .cloned()
                    .collect();
                if members.is_empty() {
                    continue;
                }
                let version = coordinate_group_version(results, &group);
                align(results, &members, &version);
            }
        }
    }
}
