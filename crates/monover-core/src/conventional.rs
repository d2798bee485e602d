//! Conventional-commit parsing and bump analysis.
//!
//! Header grammar: `TYPE[(SCOPE)][!]: DESCRIPTION`, case-insensitive, with
//! tolerant whitespace around the colon. A `BREAKING CHANGE:` (or
//! `BREAKING-CHANGE:`) paragraph in the body marks the commit breaking and
//! its text is captured as the breaking-change description.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::vcs::CommitInfo;
use crate::version::BumpType;

/// Commit-message driven bump configuration.
///
/// Each pattern is a case-insensitive prefix test against the commit header,
/// so `feat` matches both `feat: x` and `feat(ui): x`, and `chore(release)`
/// matches only scoped release chores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ConventionalCommitConfig {
    pub enabled: bool,
    pub major_patterns: Vec<String>,
    pub minor_patterns: Vec<String>,
    pub patch_patterns: Vec<String>,
    pub ignore_patterns: Vec<String>,
}

impl Default for ConventionalCommitConfig {
    fn default() -> Self {
        ConventionalCommitConfig {
            enabled: true,
            major_patterns: Vec::new(),
            minor_patterns: vec!["feat".to_string()],
            patch_patterns: vec!["fix".to_string(), "perf".to_string()],
            ignore_patterns: Vec::new(),
        }
    }
}

/// One commit, classified.
#[derive(Debug, Clone, Serialize)]
pub struct CommitClassification {
    /// Parsed type, or `"unknown"` when the header is not conventional.
    pub commit_type: String,
    pub scope: Option<String>,
    pub description: String,
    pub breaking: bool,
    pub breaking_description: Option<String>,
    pub bump: BumpType,
    pub should_ignore: bool,
    /// All `#N` references found in the description.
    pub issue_refs: Vec<u64>,
    /// A trailing `(#N)` in the description, the GitHub squash-merge style.
    pub pull_request: Option<u64>,
}

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?P<type>[a-z]+)\s*(?:\((?P<scope>[^)]*)\))?\s*(?P<breaking>!)?\s*:\s*(?P<desc>.+)$",
    )
    .expect("header regex is valid")
});

static BREAKING_FOOTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^breaking[ -]change:\s*(?P<text>.*)$").expect("footer regex is valid")
});

static ISSUE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(\d+)").expect("issue regex is valid"));

static TRAILING_PR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(#(\d+)\)\s*$").expect("pr regex is valid"));

/// Case-insensitive prefix test of the commit header against a pattern list.
fn matches_any(header: &str, patterns: &[String]) -> bool {
    let header = header.to_ascii_lowercase();
    patterns
        .iter()
        .any(|p| header.starts_with(&p.to_ascii_lowercase()))
}

/// Extract the breaking-change paragraph from a commit body.
///
/// The description runs from the footer marker to the next blank line.
fn breaking_description(message: &str) -> Option<String> {
    let caps = BREAKING_FOOTER.captures(message)?;
    let whole = caps.get(0)?;
    let mut text = caps.name("text")?.as_str().trim().to_string();

    let mut rest = &message[whole.end()..];
    rest = rest.strip_prefix('\r').unwrap_or(rest);
    rest = rest.strip_prefix('\n').unwrap_or(rest);
    for line in rest.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(line);
    }

    Some(text)
}

/// Classify one commit message.
pub fn classify(message: &str, config: &ConventionalCommitConfig) -> CommitClassification {
    let first_line = message.lines().next().unwrap_or("").trim();
    let breaking_text = breaking_description(message);

    let Some(caps) = HEADER.captures(first_line) else {
        // Not a conventional header. A breaking footer still forces major.
        let breaking = breaking_text.is_some();
        return CommitClassification {
            commit_type: "unknown".to_string(),
            scope: None,
            description: first_line.to_string(),
            breaking,
            breaking_description: breaking_text,
            bump: if breaking {
                BumpType::Major
            } else {
                BumpType::Patch
            },
            should_ignore: false,
            issue_refs: issue_refs(first_line),
            pull_request: pull_request(first_line),
        };
    };

    let commit_type = caps["type"].to_ascii_lowercase();
    let scope = caps
        .name("scope")
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());
    let description = caps["desc"].trim().to_string();
    let bang = caps.name("breaking").is_some();
    let breaking = bang || breaking_text.is_some();

    let (bump, should_ignore) = if breaking {
        (BumpType::Major, false)
    } else if matches_any(first_line, &config.major_patterns) {
        (BumpType::Major, false)
    } else if matches_any(first_line, &config.minor_patterns) {
        (BumpType::Minor, false)
    } else if matches_any(first_line, &config.patch_patterns) {
        (BumpType::Patch, false)
    } else if matches_any(first_line, &config.ignore_patterns) {
        (BumpType::None, true)
    } else {
        (BumpType::Patch, false)
    };

    CommitClassification {
        commit_type,
        scope,
        description: description.clone(),
        breaking,
        breaking_description: breaking_text,
        bump,
        should_ignore,
        issue_refs: issue_refs(&description),
        pull_request: pull_request(&description),
    }
}

fn issue_refs(text: &str) -> Vec<u64> {
    ISSUE_REF
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<u64>().ok())
        .collect()
}

fn pull_request(text: &str) -> Option<u64> {
    TRAILING_PR
        .captures(text)
        .and_then(|c| c[1].parse::<u64>().ok())
}

/// Reduce a commit list to the bump it requires.
///
/// Empty list means no bump. With the analyzer disabled every non-empty list
/// degrades to a plain patch. Otherwise the maximum per-commit bump wins,
/// skipping commits whose classification says to ignore them; `None` comes
/// back only when every non-ignored commit carries no bump.
pub fn analyze_bump_type(commits: &[CommitInfo], config: &ConventionalCommitConfig) -> BumpType {
    if commits.is_empty() {
        return BumpType::None;
    }
    if !config.enabled {
        return BumpType::Patch;
    }

    commits
        .iter()
        .map(|c| classify(&c.message, config))
        .filter(|c| !c.should_ignore)
        .map(|c| c.bump)
        .max()
        .unwrap_or(BumpType::None)
}
