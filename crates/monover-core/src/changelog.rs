//! Structured changelog assembly from a commit range.
//!
//! Commits are classified with the conventional-commit analyzer and grouped
//! into fixed-order sections. Rendering to markdown lives beside the model
//! so the CLI can print or write the same structure it serializes.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::conventional::{ConventionalCommitConfig, analyze_bump_type, classify};
use crate::vcs::CommitInfo;
use crate::version::BumpType;

/// Fixed section order with display emoji.
const SECTIONS: &[(&str, &str)] = &[
    ("Breaking Changes", "💥"),
    ("Features", "✨"),
    ("Bug Fixes", "🐛"),
    ("Performance", "⚡"),
    ("Refactoring", "♻️"),
    ("Other", "🔧"),
];

#[derive(Debug, Clone, Serialize)]
pub struct ChangelogEntry {
    pub commit_type: String,
    pub scope: Option<String>,
    pub description: String,
    pub breaking: bool,
    pub breaking_description: Option<String>,
    pub issue_refs: Vec<u64>,
    pub pull_request: Option<u64>,
    pub sha: String,
    pub author: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangelogSection {
    pub title: String,
    pub emoji: String,
    pub entries: Vec<ChangelogEntry>,
}

/// One release's changelog.
#[derive(Debug, Clone, Serialize)]
pub struct Changelog {
    pub project: String,
    pub version: String,
    pub previous_version: Option<String>,
    pub date: NaiveDate,
    pub bump: BumpType,
    pub sections: Vec<ChangelogSection>,
    /// Every commit considered, ignored ones included.
    pub total_commits: usize,
    pub contributors: BTreeSet<String>,
}

fn section_title(entry: &ChangelogEntry) -> &'static str {
    if entry.breaking {
        return "Breaking Changes";
    }
    match entry.commit_type.as_str() {
        "feat" => "Features",
        "fix" => "Bug Fixes",
        "perf" => "Performance",
        "refactor" => "Refactoring",
        _ => "Other",
    }
}

/// Group a commit range into a structured changelog.
///
/// Commits whose classification says to ignore them count toward the totals
/// but produce no entry.
pub fn assemble(
    project: &str,
    version: &str,
    previous_version: Option<&str>,
    commits: &[CommitInfo],
    config: &ConventionalCommitConfig,
    date: NaiveDate,
) -> Changelog {
    let bump = analyze_bump_type(commits, config);

    let mut contributors = BTreeSet::new();
    let mut entries: Vec<ChangelogEntry> = Vec::new();
    for commit in commits {
        contributors.insert(commit.author_name.clone());
        let classification = classify(&commit.message, config);
        if classification.should_ignore {
            continue;
        }
        entries.push(ChangelogEntry {
            commit_type: classification.commit_type,
            scope: classification.scope,
            description: classification.description,
            breaking: classification.breaking,
            breaking_description: classification.breaking_description,
            issue_refs: classification.issue_refs,
            pull_request: classification.pull_request,
            sha: commit.sha.clone(),
            author: commit.author_name.clone(),
        });
    }

    let sections = SECTIONS
        .iter()
        .filter_map(|(title, emoji)| {
            let matching: Vec<ChangelogEntry> = entries
                .iter()
                .filter(|e| section_title(e) == *title)
                .cloned()
                .collect();
            if matching.is_empty() {
                None
            } else {
                Some(ChangelogSection {
                    title: title.to_string(),
                    emoji: emoji.to_string(),
                    entries: matching,
                })
            }
        })
        .collect();

    Changelog {
        project: project.to_string(),
        version: version.to_string(),
        previous_version: previous_version.map(|s| s.to_string()),
        date,
        bump,
        sections,
        total_commits: commits.len(),
        contributors,
    }
}

/// Render a changelog entry block as markdown.
pub fn render_markdown(changelog: &Changelog) -> String {
    let mut out = format!("## {} ({})\n", changelog.version, changelog.date);
    if let Some(previous) = &changelog.previous_version {
        out.push_str(&format!("\n_Changes since {}_\n", previous));
    }

    for section in &changelog.sections {
        out.push_str(&format!("\n### {} {}\n\n", section.emoji, section.title));
        for entry in &section.entries {
            let scope_prefix = entry
                .scope
                .as_ref()
                .map(|s| format!("**{}**: ", s))
                .unwrap_or_default();
            let short_sha: String = entry.sha.chars().take(7).collect();
            out.push_str(&format!(
                "- {}{} ({})\n",
                scope_prefix, entry.description, short_sha
            ));
            if entry.breaking
                && let Some(detail) = &entry.breaking_description
            {
                out.push_str(&format!("  **BREAKING CHANGE**: {}\n", detail));
            }
        }
    }

    if !changelog.contributors.is_empty() {
        let names: Vec<&str> = changelog.contributors.iter().map(|s| s.as_str()).collect();
        out.push_str(&format!("\nContributors: {}\n", names.join(", ")));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::commit;
    use crate::vcs::CommitInfo;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 20).unwrap()
    }

    fn authored(sha: &str, message: &str, author: &str) -> CommitInfo {
        CommitInfo {
            author_name: author.to_string(),
            ..commit(sha, message)
        }
    }

    #[test]
    fn test_sections_in_fixed_order() {
        let commits = vec![
            commit("c1", "fix: crash on empty input"),
            commit("c2", "feat!: new storage format"),
            commit("c3", "perf: faster globbing"),
            commit("c4", "docs: clarify usage"),
        ];
        let log = assemble(
            "core",
            "2.0.0",
            Some("1.2.3"),
            &commits,
            &ConventionalCommitConfig::default(),
            date(),
        );

        let titles: Vec<&str> = log.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Breaking Changes", "Features", "Bug Fixes", "Performance", "Other"]
        );
        assert_eq!(log.bump, BumpType::Major);
        assert_eq!(log.total_commits, 4);
    }

    #[test]
    fn test_breaking_feat_lands_in_breaking_not_features() {
        let commits = vec![commit("c1", "feat!: breaking feature")];
        let log = assemble(
            "core",
            "2.0.0",
            None,
            &commits,
            &ConventionalCommitConfig::default(),
            date(),
        );
        assert_eq!(log.sections.len(), 1);
        assert_eq!(log.sections[0].title, "Breaking Changes");
    }

    #[test]
    fn test_ignored_commits_counted_but_not_listed() {
        let config = ConventionalCommitConfig {
            ignore_patterns: vec!["chore(release)".to_string()],
            ..Default::default()
        };
        let commits = vec![
            commit("c1", "feat: thing"),
            commit("c2", "chore(release): publish 1.1.0"),
        ];
        let log = assemble("core", "1.2.0", None, &commits, &config, date());
        assert_eq!(log.total_commits, 2);
        let listed: usize = log.sections.iter().map(|s| s.entries.len()).sum();
        assert_eq!(listed, 1);
    }

    #[test]
    fn test_contributors_distinct() {
        let commits = vec![
            authored("c1", "feat: a", "Ada"),
            authored("c2", "fix: b", "Grace"),
            authored("c3", "fix: c", "Ada"),
        ];
        let log = assemble(
            "core",
            "1.1.0",
            None,
            &commits,
            &ConventionalCommitConfig::default(),
            date(),
        );
        assert_eq!(
            log.contributors,
            BTreeSet::from(["Ada".to_string(), "Grace".to_string()])
        );
    }

    #[test]
    fn test_entry_details_captured() {
        let commits = vec![authored("deadbeef123", "fix(parser): handle BOM (#42)", "Ada")];
        let log = assemble(
            "core",
            "1.0.1",
            None,
            &commits,
            &ConventionalCommitConfig::default(),
            date(),
        );
        let entry = &log.sections[0].entries[0];
        assert_eq!(entry.scope.as_deref(), Some("parser"));
        assert_eq!(entry.pull_request, Some(42));
        assert_eq!(entry.sha, "deadbeef123");
        assert_eq!(entry.author, "Ada");
    }

    #[test]
    fn test_render_markdown() {
        let commits = vec![
            commit("abc1234567", "feat(ui): new button"),
            commit("def5678901", "fix: crash\n\nBREAKING CHANGE: config key renamed"),
        ];
        let log = assemble(
            "core",
            "2.0.0",
            Some("1.5.0"),
            &commits,
            &ConventionalCommitConfig::default(),
            date(),
        );
        let md = render_markdown(&log);
        assert!(md.starts_with("## 2.0.0 (2025-11-20)"));
        assert!(md.contains("_Changes since 1.5.0_"));
        assert!(md.contains("### 💥 Breaking Changes"));
        assert!(md.contains("**BREAKING CHANGE**: config key renamed"));
        assert!(md.contains("**ui**: new button (abc1234)"));
        assert!(md.contains("Contributors: Dev One"));
    }

    #[test]
    fn test_empty_commit_list() {
        let log = assemble(
            "core",
            "1.0.0",
            None,
            &[],
            &ConventionalCommitConfig::default(),
            date(),
        );
        assert_eq!(log.bump, BumpType::None);
        assert!(log.sections.is_empty());
        assert_eq!(log.total_commits, 0);
    }
}
