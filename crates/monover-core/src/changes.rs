//! Change detection: what changed since the baseline, and how much it
//! matters for the project being versioned.

use std::path::Path;

use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::patterns::{ChangeClassification, ChangeClassifier};
use crate::vcs::Vcs;
use crate::version::BumpType;

/// Outcome of change detection for one project.
#[derive(Debug, Clone)]
pub struct ChangeReport {
    /// False iff `bump` is [`BumpType::None`].
    pub changed: bool,
    pub bump: BumpType,
    /// Changed files inside the watched closure, repo-root relative.
    pub files: Vec<String>,
    pub classification: ChangeClassification,
    pub reason: String,
    /// Whether any of the changed files live in a dependency's directory.
    pub dependency_changed: bool,
}

impl ChangeReport {
    fn initial() -> ChangeReport {
        ChangeReport {
            changed: true,
            bump: BumpType::Minor,
            files: Vec::new(),
            classification: ChangeClassification::default(),
            reason: "Initial repository".to_string(),
            dependency_changed: false,
        }
    }

    fn baseline_unavailable() -> ChangeReport {
        ChangeReport {
            changed: true,
            bump: BumpType::Patch,
            files: Vec::new(),
            classification: ChangeClassification::default(),
            reason: "comparison baseline unavailable".to_string(),
            dependency_changed: false,
        }
    }
}

fn normalize(path: &str) -> String {
    let p = path.replace('\\', "/");
    p.trim_start_matches("./").trim_matches('/').to_string()
}

/// Whether `path` equals `scope` or lives underneath it. An empty scope is
/// the repository root and matches everything.
fn within(path: &str, scope: &str) -> bool {
    if scope.is_empty() || scope == "." {
        return true;
    }
    path == scope || path.starts_with(&format!("{}/", scope))
}

fn path_str(path: &Path) -> String {
    normalize(&path.to_string_lossy())
}

/// Diff head against the baseline and classify what falls inside the
/// project's watched closure: its own directory, the source directories of
/// its transitive dependencies, and any extra monitored paths.
///
/// A missing baseline commit (initial repository) reports an initial minor
/// change. A baseline that no longer resolves (pruned history, shallow
/// clone) falls back to "assume changed, bump patch".
pub fn detect_changes(
    vcs: &dyn Vcs,
    head: &str,
    baseline_commit: Option<&str>,
    project_dir: &Path,
    dependency_dirs: &[std::path::PathBuf],
    monitor_paths: &[String],
    classifier: &ChangeClassifier,
) -> EngineResult<ChangeReport> {
    let Some(baseline) = baseline_commit else {
        return Ok(ChangeReport::initial());
    };

    let entries = match vcs.diff(baseline, head) {
        Ok(entries) => entries,
        Err(EngineError::CommitNotFound { .. }) | Err(EngineError::TagNotFound { .. }) => {
            warn!(baseline = %baseline, "baseline commit unavailable, assuming changes");
            return Ok(ChangeReport::baseline_unavailable());
        }
        Err(e) => return Err(e),
    };

    let project_scope = path_str(project_dir);
    let dep_scopes: Vec<String> = dependency_dirs.iter().map(|d| path_str(d)).collect();
    let monitor_scopes: Vec<String> = monitor_paths.iter().map(|m| normalize(m)).collect();

    let mut files = Vec::new();
    let mut dependency_changed = false;
    for entry in entries {
        let path = normalize(&entry.path);
        let in_project = within(&path, &project_scope);
        let in_dep = dep_scopes.iter().any(|scope| within(&path, scope));
        let in_monitor = monitor_scopes.iter().any(|scope| within(&path, scope));
        if in_dep {
            dependency_changed = true;
        }
        if in_project || in_dep || in_monitor {
            files.push(path);
        }
    }

    let classification = classifier.classify(&files);
    let decision = classifier.derive_bump(&classification);
    debug!(
        files = files.len(),
        bump = %decision.bump,
        "change detection complete"
    );

    Ok(ChangeReport {
        changed: decision.bump != BumpType::None,
        bump: decision.bump,
        files,
        classification,
        reason: decision.reason,
        dependency_changed,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::patterns::ChangeDetectionConfig;
    use crate::testing::FakeVcs;

    fn classifier() -> ChangeClassifier {
        ChangeClassifier::new(&ChangeDetectionConfig::default())
    }

    fn detect(
        vcs: &FakeVcs,
        baseline: Option<&str>,
        project: &str,
        deps: &[&str],
        monitors: &[&str],
    ) -> ChangeReport {
        detect_changes(
            vcs,
            "head",
            baseline,
            Path::new(project),
            &deps.iter().map(PathBuf::from).collect::<Vec<_>>(),
            &monitors.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            &classifier(),
        )
        .unwrap()
    }

    #[test]
    fn test_initial_repository() {
        let vcs = FakeVcs::new();
        let report = detect(&vcs, None, "libs/core", &[], &[]);
        assert!(report.changed);
        assert_eq!(report.bump, BumpType::Minor);
        assert_eq!(report.reason, "Initial repository");
    }

    #[test]
    fn test_change_in_project_dir() {
        let vcs = FakeVcs::new().with_diff("base", "head", &["libs/core/src/lib.rs"]);
        let report = detect(&vcs, Some("base"), "libs/core", &[], &[]);
        assert!(report.changed);
        assert_eq!(report.files, vec!["libs/core/src/lib.rs"]);
        assert!(!report.dependency_changed);
    }

    #[test]
    fn test_change_outside_closure_ignored() {
        let vcs = FakeVcs::new().with_diff("base", "head", &["apps/web/main.rs"]);
        let report = detect(&vcs, Some("base"), "libs/core", &[], &[]);
        assert!(!report.changed);
        assert!(report.files.is_empty());
    }

    #[test]
    fn test_sibling_prefix_does_not_match() {
        // "libs/core-extra" must not count as inside "libs/core".
        let vcs = FakeVcs::new().with_diff("base", "head", &["libs/core-extra/lib.rs"]);
        let report = detect(&vcs, Some("base"), "libs/core", &[], &[]);
        assert!(!report.changed);
    }

    #[test]
    fn test_dependency_change_detected() {
        let vcs = FakeVcs::new().with_diff("base", "head", &["libs/shared/util.rs"]);
        let report = detect(&vcs, Some("base"), "libs/core", &["libs/shared"], &[]);
        assert!(report.changed);
        assert!(report.dependency_changed);
    }

    #[test]
    fn test_monitor_path_change_detected() {
        let vcs = FakeVcs::new().with_diff("base", "head", &["protos/api.proto"]);
        let report = detect(&vcs, Some("base"), "libs/core", &[], &["protos"]);
        assert!(report.changed);
        assert!(!report.dependency_changed);
    }

    #[test]
    fn test_backslash_paths_normalized() {
        let vcs = FakeVcs::new().with_diff("base", "head", &[r"libs\core\src\lib.rs"]);
        let report = detect(&vcs, Some("base"), "libs/core", &[], &[]);
        assert!(report.changed);
        assert_eq!(report.files, vec!["libs/core/src/lib.rs"]);
    }

    #[test]
    fn test_missing_baseline_falls_back_to_patch() {
        let vcs = FakeVcs::new().with_missing_ref("gone");
        let report = detect(&vcs, Some("gone"), "libs/core", &[], &[]);
        assert!(report.changed);
        assert_eq!(report.bump, BumpType::Patch);
        assert_eq!(report.reason, "comparison baseline unavailable");
    }

    #[test]
    fn test_ignored_changes_do_not_mark_changed() {
        let vcs = FakeVcs::new().with_diff("base", "head", &["libs/core/README.md"]);
        let cls = ChangeClassifier::new(&ChangeDetectionConfig {
            ignore_patterns: vec!["**/*.md".to_string()],
            ..Default::default()
        });
        let report = detect_changes(
            &vcs,
            "head",
            Some("base"),
            Path::new("libs/core"),
            &[],
            &[],
            &cls,
        )
        .unwrap();
        assert!(!report.changed);
        assert_eq!(report.bump, BumpType::None);
        assert_eq!(report.classification.ignored.len(), 1);
    }
}
