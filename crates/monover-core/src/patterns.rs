//! Glob classification of changed files.
//!
//! Paths are matched with `/` as a literal separator: `*` never crosses a
//! directory boundary, `**` does. Backslashes in inputs are normalized to
//! `/` before matching so Windows-style diffs classify the same way.

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::version::BumpType;

/// Classifier configuration for change detection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangeDetectionConfig {
    /// Files matching these never trigger a version change.
    pub ignore_patterns: Vec<String>,

    /// Files matching these force a major bump.
    pub major_patterns: Vec<String>,

    /// Files matching these force at least a minor bump.
    pub minor_patterns: Vec<String>,

    /// Files matching these force at least a patch bump.
    pub patch_patterns: Vec<String>,

    /// When set, only files matched by a major/minor/patch pattern count;
    /// unclassified files are treated like ignored ones.
    pub source_only_mode: bool,

    /// Raise any derived bump to at least this magnitude.
    pub minimum_bump_type: Option<BumpType>,

    /// Extra paths (relative to the repository root) monitored for changes.
    pub additional_monitor_paths: Vec<String>,
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A list of compiled glob patterns.
///
/// Compilation happens once per config; invalid patterns are skipped with a
/// warning rather than failing the whole classification.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub fn compile(raw: &[String]) -> PatternSet {
        let patterns = raw
            .iter()
            .filter_map(|p| {
                let normalized = p.replace('\\', "/");
                match Pattern::new(&normalized) {
                    Ok(pattern) => Some(pattern),
                    Err(e) => {
                        warn!(pattern = %p, error = %e, "skipping invalid glob pattern");
                        None
                    }
                }
            })
            .collect();
        PatternSet { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Test a normalized (`/`-separated) path against every pattern.
    pub fn matches(&self, path: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_with(path, MATCH_OPTIONS))
    }
}

/// Compiled form of a [`ChangeDetectionConfig`].
#[derive(Debug, Clone)]
pub struct ChangeClassifier {
    ignore: PatternSet,
    major: PatternSet,
    minor: PatternSet,
    patch: PatternSet,
    source_only_mode: bool,
    minimum_bump_type: Option<BumpType>,
}

impl ChangeClassifier {
    pub fn new(config: &ChangeDetectionConfig) -> ChangeClassifier {
        ChangeClassifier {
            ignore: PatternSet::compile(&config.ignore_patterns),
            major: PatternSet::compile(&config.major_patterns),
            minor: PatternSet::compile(&config.minor_patterns),
            patch: PatternSet::compile(&config.patch_patterns),
            source_only_mode: config.source_only_mode,
            minimum_bump_type: config.minimum_bump_type,
        }
    }

    /// Partition a change list. Ignore patterns win outright; among the bump
    /// patterns the first of major > minor > patch to match wins.
    pub fn classify(&self, files: &[String]) -> ChangeClassification {
        let mut result = ChangeClassification::default();

        for file in files {
            let path = file.replace('\\', "/");
            if self.ignore.matches(&path) {
                result.ignored.push(path);
            } else if self.major.matches(&path) {
                result.major.push(path);
            } else if self.minor.matches(&path) {
                result.minor.push(path);
            } else if self.patch.matches(&path) {
                result.patch.push(path);
            } else {
                result.unclassified.push(path);
            }
        }

        result
    }

    /// Derive the bump a classification requires.
    pub fn derive_bump(&self, classification: &ChangeClassification) -> BumpDecision {
        let total = classification.total_files();

        if total == classification.ignored.len() {
            return BumpDecision {
                bump: BumpType::None,
                should_ignore: true,
                reason: "All changed files match ignore patterns".to_string(),
            };
        }

        if self.source_only_mode && classification.classified_count() == 0 {
            return BumpDecision {
                bump: BumpType::None,
                should_ignore: true,
                reason: "No source files changed (source-only mode)".to_string(),
            };
        }

        let (mut bump, reason) = if !classification.major.is_empty() {
            (
                BumpType::Major,
                format!(
                    "{} file(s) match major patterns",
                    classification.major.len()
                ),
            )
        } else if !classification.minor.is_empty() {
            (
                BumpType::Minor,
                format!(
                    "{} file(s) match minor patterns",
                    classification.minor.len()
                ),
            )
        } else {
            let count = classification.patch.len() + classification.unclassified.len();
            (BumpType::Patch, format!("{} file(s) changed", count))
        };

        if let Some(minimum) = self.minimum_bump_type
            && minimum > bump
        {
            bump = minimum;
        }

        BumpDecision {
            bump,
            should_ignore: false,
            reason,
        }
    }
}

/// Partition of a changed-file list.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeClassification {
    pub ignored: Vec<String>,
    pub major: Vec<String>,
    pub minor: Vec<String>,
    pub patch: Vec<String>,
    pub unclassified: Vec<String>,
}

impl ChangeClassification {
    pub fn total_files(&self) -> usize {
        self.ignored.len()
            + self.major.len()
            + self.minor.len()
            + self.patch.len()
            + self.unclassified.len()
    }

    /// Files matched by one of the major/minor/patch pattern lists.
    pub fn classified_count(&self) -> usize {
        self.major.len() + self.minor.len() + self.patch.len()
    }
}

/// Outcome of bump derivation over a classification.
#[derive(Debug, Clone)]
pub struct BumpDecision {
    pub bump: BumpType,
    pub should_ignore: bool,
    pub reason: String,
}
