//! Branch classification and version-tag resolution.

use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use tracing::warn;

use crate::error::EngineResult;
use crate::vcs::Vcs;
use crate::version::{parse_version, version_string};

/// Maximum length of a sanitized branch name used in prerelease identifiers.
const MAX_SANITIZED_LEN: usize = 50;

/// What kind of branch the engine is versioning on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchKind {
    Main,
    Dev,
    /// A release branch carrying the version parsed from its name.
    Release(Version),
    /// Anything else; carries the sanitized branch name.
    Feature(String),
}

impl BranchKind {
    /// Short label used in cache keys and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            BranchKind::Main => "main",
            BranchKind::Dev => "dev",
            BranchKind::Release(_) => "release",
            BranchKind::Feature(_) => "feature",
        }
    }
}

static VERSION_BRANCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v\d+\.\d+(\.\d+)?$").expect("version branch regex is valid"));

/// Map a branch name to its kind, case-insensitive.
pub fn classify_branch(name: &str, tag_prefix: &str) -> BranchKind {
    let lower = name.to_ascii_lowercase();
    match lower.as_str() {
        "main" | "master" => return BranchKind::Main,
        "dev" | "develop" | "development" => return BranchKind::Dev,
        _ => {}
    }

    let release_rest = lower
        .strip_prefix("release/")
        .or_else(|| lower.strip_prefix("release-"));
    if let Some(rest) = release_rest {
        return match parse_version(rest, tag_prefix) {
            Ok(version) => BranchKind::Release(version),
            Err(_) => BranchKind::Feature(sanitize_branch(name)),
        };
    }

    if VERSION_BRANCH.is_match(&lower)
        && let Ok(version) = parse_version(&lower, "v")
    {
        return BranchKind::Release(version);
    }

    BranchKind::Feature(sanitize_branch(name))
}

/// Sanitize a branch name for use as a prerelease identifier.
///
/// Strips a `feature/`, `bugfix/` or `hotfix/` prefix, maps every character
/// outside `[A-Za-z0-9-]` to `-`, collapses runs of `-`, and truncates to
/// 50 characters.
pub fn sanitize_branch(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("feature/")
        .or_else(|| lower.strip_prefix("bugfix/"))
        .or_else(|| lower.strip_prefix("hotfix/"))
        .unwrap_or(&lower);

    let mut out = String::with_capacity(rest.len());
    let mut last_dash = false;
    for c in rest.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_dash = false;
        } else if !last_dash && !out.is_empty() {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out.truncate(MAX_SANITIZED_LEN);
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// A resolved baseline tag.
///
/// `commit: None` marks a config-derived baseline that exists in no
/// repository history (a configured base version, or the initial default).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionTag {
    pub version: Version,
    pub is_global: bool,
    pub project: Option<String>,
    pub commit: Option<String>,
}

impl VersionTag {
    pub fn global(version: Version, commit: Option<String>) -> VersionTag {
        VersionTag {
            version,
            is_global: true,
            project: None,
            commit,
        }
    }

    pub fn for_project(version: Version, project: &str, commit: Option<String>) -> VersionTag {
        VersionTag {
            version,
            is_global: false,
            project: Some(project.to_string()),
            commit,
        }
    }
}

/// Tag name for a project-scoped release: `{project-lower}-{prefix}{version}`.
pub fn project_tag_name(project: &str, prefix: &str, version: &Version) -> String {
    format!(
        "{}-{}{}",
        project.to_ascii_lowercase(),
        prefix,
        version_string(version)
    )
}

/// Tag name for a repo-wide release: `{prefix}{version}`.
pub fn global_tag_name(prefix: &str, version: &Version) -> String {
    format!("{}{}", prefix, version_string(version))
}

struct Candidate {
    version: Version,
    target: String,
    committer_time: i64,
}

fn best(candidates: Vec<Candidate>) -> Option<Candidate> {
    candidates.into_iter().max_by(|a, b| {
        a.version
            .cmp_precedence(&b.version)
            .then(a.committer_time.cmp(&b.committer_time))
    })
}

/// Latest tag scoped to `project`.
///
/// Accepts `{project}-{prefix}{v}` and `{project}/{prefix}{v}` forms,
/// case-insensitive. Equal versions tie-break on committer time. Tags whose
/// version part fails to parse are skipped with a warning.
pub fn find_project_tag(
    vcs: &dyn Vcs,
    project: &str,
    prefix: &str,
) -> EngineResult<Option<VersionTag>> {
    let project_lower = project.to_ascii_lowercase();
    let prefix_lower = prefix.to_ascii_lowercase();

    let mut candidates = Vec::new();
    for tag in vcs.list_tags()? {
        let name_lower = tag.name.to_ascii_lowercase();
        let remainder = ['-', '/'].iter().find_map(|sep| {
            name_lower.strip_prefix(&format!("{}{}{}", project_lower, sep, prefix_lower))
        });
        let Some(remainder) = remainder else {
            continue;
        };
        match parse_version(remainder, "") {
            Ok(version) => candidates.push(Candidate {
                version,
                target: tag.target.clone(),
                committer_time: tag.committer_time,
            }),
            Err(_) => {
                warn!(tag = %tag.name, "skipping tag with malformed version");
            }
        }
    }

    Ok(best(candidates)
        .map(|c| VersionTag::for_project(c.version, project, Some(c.target))))
}

/// Latest repo-wide tag: `{prefix}{version}` with no project scoping.
pub fn find_global_tag(vcs: &dyn Vcs, prefix: &str) -> EngineResult<Option<VersionTag>> {
    let prefix_lower = prefix.to_ascii_lowercase();

    let mut candidates = Vec::new();
    for tag in vcs.list_tags()? {
        let name_lower = tag.name.to_ascii_lowercase();
        let Some(remainder) = name_lower.strip_prefix(&prefix_lower) else {
            continue;
        };
        match parse_version(remainder, "") {
            Ok(version) => candidates.push(Candidate {
                version,
                target: tag.target.clone(),
                committer_time: tag.committer_time,
            }),
            Err(_) => {
                // Not a global version tag; project tags and unrelated tags
                // land here too, so stay quiet.
            }
        }
    }

    Ok(best(candidates).map(|c| VersionTag::global(c.version, Some(c.target))))
}
