//! Run orchestration: load projects, version each one in dependency order,
//! coordinate groups, optionally tag and assemble changelogs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::branch::{global_tag_name, project_tag_name};
use crate::cache::RunCache;
use crate::calculator::{VersionResult, calculate_version};
use crate::changelog::{Changelog, assemble};
use crate::config::MonoverConfig;
use crate::error::{EngineError, EngineResult};
use crate::policy::{PolicyKind, apply_policy};
use crate::project::{ProjectGraph, ProjectInfo, load_projects, topological_order};
use crate::vcs::Vcs;
use crate::version::version_string;

/// Per-run inputs beyond the configuration.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub repo_root: PathBuf,
    /// Restrict discovery to a subdirectory.
    pub subdir: Option<PathBuf>,
    /// Compute only this project (its dependencies still load).
    pub only_project: Option<String>,
    pub create_tags: bool,
    pub assemble_changelogs: bool,
    /// Calendar date for CalVer and changelog stamping.
    pub today: NaiveDate,
}

impl RunRequest {
    pub fn new(repo_root: impl Into<PathBuf>, today: NaiveDate) -> RunRequest {
        RunRequest {
            repo_root: repo_root.into(),
            subdir: None,
            only_project: None,
            create_tags: false,
            assemble_changelogs: false,
            today,
        }
    }
}

/// A project the run could not compute.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectFailure {
    pub project: String,
    pub error: String,
}

/// Everything one run produced.
#[derive(Debug, Default, Serialize)]
pub struct RunOutcome {
    pub results: BTreeMap<String, VersionResult>,
    pub changelogs: BTreeMap<String, Changelog>,
    pub created_tags: Vec<String>,
    pub failures: Vec<ProjectFailure>,
    pub warnings: Vec<String>,
}

/// The versioning engine: owns the per-run cache, borrows its collaborators.
pub struct Engine<'a, V: Vcs, G: ProjectGraph + Sync> {
    vcs: &'a V,
    graph: &'a G,
    config: MonoverConfig,
    cache: RunCache,
}

impl<'a, V: Vcs, G: ProjectGraph + Sync> Engine<'a, V, G> {
    pub fn new(vcs: &'a V, graph: &'a G, config: MonoverConfig) -> Self {
        Engine {
            vcs,
            graph,
            config,
            cache: RunCache::new(),
        }
    }

    pub fn config(&self) -> &MonoverConfig {
        &self.config
    }

    fn check_cancel(should_cancel: &dyn Fn() -> bool) -> EngineResult<()> {
        if should_cancel() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    fn load(&self, request: &RunRequest) -> EngineResult<Vec<ProjectInfo>> {
        if let Some(projects) = self.cache.projects() {
            return Ok(projects);
        }
        let projects = load_projects(
            self.graph,
            &request.repo_root,
            request.subdir.as_deref(),
        )?;
        for project in &projects {
            self.cache.store_direct_deps(
                project.manifest_path.clone(),
                project
                    .direct_deps
                    .iter()
                    .filter_map(|dep| {
                        projects
                            .iter()
                            .find(|p| &p.name == dep)
                            .map(|p| p.manifest_path.clone())
                    })
                    .collect(),
            );
        }
        self.cache.store_projects(projects.clone());
        Ok(projects)
    }

    /// Run the engine over every project (or the one requested).
    ///
    /// `should_cancel` is polled before each project and between the major
    /// phases; a raised flag aborts with [`EngineError::Cancelled`].
    pub fn run(
        &self,
        request: &RunRequest,
        should_cancel: &dyn Fn() -> bool,
    ) -> EngineResult<RunOutcome> {
        let mut outcome = RunOutcome {
            warnings: self.config.validate(),
            ..Default::default()
        };

        let head = self.vcs.head_commit()?;
        self.cache.validate_and_invalidate(&head);

        if self.vcs.is_shallow() {
            outcome.warnings.push(
                "repository is a shallow clone; commit heights and baselines may be incomplete"
                    .to_string(),
            );
        }

        let projects = self.load(request)?;
        let names: Vec<String> = projects.iter().map(|p| p.name.clone()).collect();

        let problems = self.config.version_policy.validate_configuration(&names);
        if !problems.is_empty() {
            return Err(EngineError::Misconfiguration { problems });
        }

        for name in self.config.projects.keys() {
            if !names.contains(name) {
                outcome
                    .warnings
                    .push(format!("override for unknown project '{}'", name));
            }
        }

        Self::check_cancel(should_cancel)?;

        let order = topological_order(&projects);
        info!(projects = order.len(), head = %head, "starting version run");

        for name in &order {
            if let Some(only) = &request.only_project
                && only != name
            {
                continue;
            }
            Self::check_cancel(should_cancel)?;

            let Some(project) = projects.iter().find(|p| &p.name == name) else {
                continue;
            };
            let options = self
                .config
                .effective_options(project, &projects, &request.repo_root);

            match calculate_version(self.vcs, &self.cache, &options, request.today) {
                Ok(result) => {
                    debug!(project = %name, version = %result.version, "project versioned");
                    outcome.results.insert(name.clone(), result);
                }
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) => {
                    warn!(project = %name, error = %e, "project computation failed");
                    outcome.failures.push(ProjectFailure {
                        project: name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Self::check_cancel(should_cancel)?;
        apply_policy(&mut outcome.results, &self.config.version_policy);

        if request.assemble_changelogs {
            Self::check_cancel(should_cancel)?;
            self.assemble_changelogs(request, &mut outcome)?;
        }

        if request.create_tags {
            Self::check_cancel(should_cancel)?;
            self.create_tags(&mut outcome)?;
        }

        Ok(outcome)
    }

    fn assemble_changelogs(
        &self,
        request: &RunRequest,
        outcome: &mut RunOutcome,
    ) -> EngineResult<()> {
        let head = self.vcs.head_commit()?;
        for (name, result) in &outcome.results {
            if !result.changed {
                continue;
            }
            let commits = self
                .vcs
                .commits_between(result.baseline_commit.as_deref(), &head)?;
            let changelog = assemble(
                name,
                &result.version,
                result.previous_version.as_deref(),
                &commits,
                &self.config.conventional_commits,
                request.today,
            );
            outcome.changelogs.insert(name.clone(), changelog);
        }
        Ok(())
    }

    fn create_tags(&self, outcome: &mut RunOutcome) -> EngineResult<()> {
        let prefix = self.config.tag_prefix();

        for (name, result) in &outcome.results {
            if !result.changed {
                continue;
            }
            let tag = project_tag_name(name, prefix, &result.semver);
            let message = format!("{} {}", name, version_string(&result.semver));
            if self.vcs.create_annotated_tag(&tag, &message)? {
                outcome.created_tags.push(tag);
            } else {
                debug!(tag = %tag, "tag already exists");
            }
        }

        // Lock-step runs also stamp the shared version as a repo-wide tag.
        if self.config.version_policy.policy == PolicyKind::LockStep
            && let Some(result) = outcome.results.values().find(|r| r.changed)
        {
            let tag = global_tag_name(prefix, &result.semver);
            let message = format!("release {}", version_string(&result.semver));
            if self.vcs.create_annotated_tag(&tag, &message)? {
                outcome.created_tags.push(tag);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::policy::{PolicyGroup, VersionPolicyConfig};
    use crate::testing::{FakeGraph, FakeVcs};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 20).unwrap()
    }

    fn never_cancel() -> impl Fn() -> bool {
        || false
    }

    fn request() -> RunRequest {
        RunRequest::new("", today())
    }

    fn two_projects() -> FakeGraph {
        FakeGraph::new()
            .with_project("a", "a/project.yaml", &[])
            .with_project("b", "b/project.yaml", &[])
    }

    #[test]
    fn test_run_versions_all_projects() {
        let vcs = FakeVcs::new()
            .with_tag("a-v1.2.0", "base-a", 100)
            .with_tag("b-v1.5.3", "base-b", 100)
            .with_default_diff(&["a/lib.rs", "b/lib.rs"]);
        let graph = two_projects();
        let engine = Engine::new(&vcs, &graph, MonoverConfig::default());

        let outcome = engine.run(&request(), &never_cancel()).unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results["a"].version, "1.2.1");
        assert_eq!(outcome.results["b"].version, "1.5.4");
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn test_lockstep_group_aligns_members() {
        let vcs = FakeVcs::new()
            .with_tag("a-v1.2.0", "base-a", 100)
            .with_tag("b-v1.5.3", "base-b", 100)
            .with_default_diff(&["a/lib.rs", "b/lib.rs"]);
        let graph = two_projects();
        let config = MonoverConfig {
            version_policy: VersionPolicyConfig {
                policy: PolicyKind::LockStep,
                ..Default::default()
            },
            ..Default::default()
        };
        let engine = Engine::new(&vcs, &graph, config);

        let outcome = engine.run(&request(), &never_cancel()).unwrap();
        assert_eq!(outcome.results["a"].version, "1.5.4");
        assert_eq!(outcome.results["b"].version, "1.5.4");
    }

    #[test]
    fn test_dependency_change_bumps_dependent() {
        let vcs = FakeVcs::new()
            .with_tag("v1.0.0", "base", 100)
            .with_default_diff(&["core/lib.rs"]);
        let graph = FakeGraph::new()
            .with_project("core", "core/project.yaml", &[])
            .with_project("app", "app/project.yaml", &["core/project.yaml"]);
        let engine = Engine::new(&vcs, &graph, MonoverConfig::default());

        let outcome = engine.run(&request(), &never_cancel()).unwrap();
        // app did not change itself but its dependency closure did.
        assert!(outcome.results["app"].changed);
        assert_eq!(outcome.results["app"].version, "1.0.1");
    }

    #[test]
    fn test_only_project_restricts_run() {
        let vcs = FakeVcs::new()
            .with_tag("v1.0.0", "base", 100)
            .with_default_diff(&["a/lib.rs"]);
        let graph = two_projects();
        let engine = Engine::new(&vcs, &graph, MonoverConfig::default());

        let mut req = request();
        req.only_project = Some("a".to_string());
        let outcome = engine.run(&req, &never_cancel()).unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.results.contains_key("a"));
    }

    #[test]
    fn test_policy_misconfiguration_refuses_run() {
        let vcs = FakeVcs::new();
        let graph = two_projects();
        let config = MonoverConfig {
            version_policy: VersionPolicyConfig {
                policy: PolicyKind::Grouped,
                groups: BTreeMap::from([(
                    "empty".to_string(),
                    PolicyGroup {
                        projects: Vec::new(),
                        ..Default::default()
                    },
                )]),
            },
            ..Default::default()
        };
        let engine = Engine::new(&vcs, &graph, config);

        let err = engine.run(&request(), &never_cancel()).unwrap_err();
        assert!(matches!(err, EngineError::Misconfiguration { .. }));
    }

    #[test]
    fn test_constraint_failure_recorded_not_fatal() {
        let vcs = FakeVcs::new()
            .with_tag("v1.0.0", "base", 100)
            .with_default_diff(&["a/lib.rs", "b/lib.rs"]);
        let graph = two_projects();
        let mut config = MonoverConfig::default();
        config.constraints.enabled = true;
        config.constraints.blocked_versions = vec!["1.0.1".to_string()];
        let engine = Engine::new(&vcs, &graph, config);

        let outcome = engine.run(&request(), &never_cancel()).unwrap();
        // Both candidates are 1.0.1 and blocked, so both fail and are skipped.
        assert_eq!(outcome.failures.len(), 2);
        assert!(outcome.results.is_empty());
    }

    #[test]
    fn test_major_approval_gate_unblocked_by_config() {
        let vcs = FakeVcs::new()
            .with_tag("a-v1.0.0", "base-a", 100)
            .with_default_diff(&["a/lib.rs"])
            .with_commit("c1", "feat!: remove legacy API");
        let graph = FakeGraph::new().with_project("a", "a/project.yaml", &[]);

        let mut blocked = MonoverConfig::default();
        blocked.constraints.enabled = true;
        blocked.constraints.require_major_approval = true;
        let engine = Engine::new(&vcs, &graph, blocked);
        let outcome = engine.run(&request(), &never_cancel()).unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].error.contains("constraint"));

        let mut approved = MonoverConfig::default();
        approved.constraints.enabled = true;
        approved.constraints.require_major_approval = true;
        approved.major_approved = Some(true);
        let engine = Engine::new(&vcs, &graph, approved);
        let outcome = engine.run(&request(), &never_cancel()).unwrap();
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.results["a"].version, "2.0.0");
    }

    #[test]
    fn test_cancellation_before_first_project() {
        let vcs = FakeVcs::new();
        let graph = two_projects();
        let engine = Engine::new(&vcs, &graph, MonoverConfig::default());

        let err = engine.run(&request(), &(|| true)).unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[test]
    fn test_cancellation_mid_run() {
        let vcs = FakeVcs::new().with_default_diff(&["a/lib.rs"]);
        let graph = two_projects();
        let engine = Engine::new(&vcs, &graph, MonoverConfig::default());

        // Allow a few polls, then raise the flag.
        let polls = Cell::new(0);
        let cancel = move || {
            polls.set(polls.get() + 1);
            polls.get() > 2
        };
        let err = engine.run(&request(), &cancel).unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[test]
    fn test_tag_creation_for_changed_projects() {
        let vcs = FakeVcs::new()
            .with_tag("a-v1.0.0", "base-a", 100)
            .with_default_diff(&["a/lib.rs"]);
        let graph = FakeGraph::new().with_project("a", "a/project.yaml", &[]);
        let engine = Engine::new(&vcs, &graph, MonoverConfig::default());

        let mut req = request();
        req.create_tags = true;
        let outcome = engine.run(&req, &never_cancel()).unwrap();
        assert_eq!(outcome.created_tags, vec!["a-v1.0.1"]);
        assert_eq!(vcs.created_tags.borrow().len(), 1);
    }

    #[test]
    fn test_tag_creation_idempotent() {
        let vcs = FakeVcs::new()
            .with_tag("a-v1.0.0", "base-a", 100)
            .with_default_diff(&["a/lib.rs"]);
        let graph = FakeGraph::new().with_project("a", "a/project.yaml", &[]);
        let engine = Engine::new(&vcs, &graph, MonoverConfig::default());

        let mut req = request();
        req.create_tags = true;
        let first = engine.run(&req, &never_cancel()).unwrap();
        assert_eq!(first.created_tags, vec!["a-v1.0.1"]);

        // The tag now exists; a second identical run creates nothing.
        let second = engine.run(&req, &never_cancel()).unwrap();
        assert!(second.created_tags.is_empty());
    }

    #[test]
    fn test_changelog_assembly() {
        let vcs = FakeVcs::new()
            .with_tag("a-v1.0.0", "base-a", 100)
            .with_default_diff(&["a/lib.rs"])
            .with_commit("c1", "feat: new thing")
            .with_commit("c2", "fix: old bug");
        let graph = FakeGraph::new().with_project("a", "a/project.yaml", &[]);
        let engine = Engine::new(&vcs, &graph, MonoverConfig::default());

        let mut req = request();
        req.assemble_changelogs = true;
        let outcome = engine.run(&req, &never_cancel()).unwrap();
        let changelog = &outcome.changelogs["a"];
        assert_eq!(changelog.version, "1.1.0");
        assert_eq!(changelog.total_commits, 2);
        assert_eq!(changelog.sections.len(), 2);
    }

    #[test]
    fn test_run_is_deterministic() {
        let vcs = FakeVcs::new()
            .with_tag("v1.0.0", "base", 100)
            .with_default_diff(&["a/lib.rs", "b/lib.rs"]);
        let graph = two_projects();
        let engine = Engine::new(&vcs, &graph, MonoverConfig::default());

        let first = engine.run(&request(), &never_cancel()).unwrap();
        let second = engine.run(&request(), &never_cancel()).unwrap();
        let versions = |o: &RunOutcome| {
            o.results
                .iter()
                .map(|(k, v)| (k.clone(), v.version.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(versions(&first), versions(&second));
    }

    #[test]
    fn test_unknown_project_override_warns() {
        let vcs = FakeVcs::new();
        let graph = two_projects();
        let mut config = MonoverConfig::default();
        config
            .projects
            .insert("ghost".to_string(), Default::default());
        let engine = Engine::new(&vcs, &graph, config);

        let outcome = engine.run(&request(), &never_cancel()).unwrap();
        assert!(
            outcome
                .warnings
                .iter()
                .any(|w| w.contains("ghost"))
        );
    }
}
