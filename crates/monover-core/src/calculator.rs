//! The central version calculation.
//!
//! Composes baseline resolution, change detection, bump derivation, branch
//! policy, prerelease progression and CalVer computation, then runs the
//! result through the constraint validator.

use std::path::PathBuf;

use chrono::NaiveDate;
use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::branch::{
    BranchKind, VersionTag, classify_branch, find_global_tag, find_project_tag, sanitize_branch,
};
use crate::cache::RunCache;
use crate::calver::CalVerConfig;
use crate::changes::{ChangeReport, detect_changes};
use crate::constraints::{Violation, VersionConstraints, partition};
use crate::conventional::{ConventionalCommitConfig, analyze_bump_type};
use crate::error::{EngineError, EngineResult};
use crate::patterns::{ChangeDetectionConfig, ChangeClassifier};
use crate::vcs::Vcs;
use crate::version::{
    BumpType, apply_bump, full_string, parse_version, prerelease_parts, with_build,
    with_prerelease,
};

/// Prerelease channel applied to freshly bumped versions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrereleaseType {
    #[default]
    None,
    Alpha,
    Beta,
    Rc,
    #[serde(untagged)]
    Custom(String),
}

impl PrereleaseType {
    /// The channel identifier, or `None` for stable releases.
    pub fn channel(&self) -> Option<&str> {
        match self {
            PrereleaseType::None => None,
            PrereleaseType::Alpha => Some("alpha"),
            PrereleaseType::Beta => Some("beta"),
            PrereleaseType::Rc => Some("rc"),
            PrereleaseType::Custom(name) => Some(name.as_str()),
        }
    }
}

/// Which numbering scheme a project follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionScheme {
    #[default]
    SemVer,
    CalVer,
}

/// Build-metadata decoration derived from git state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitIntegrationConfig {
    pub include_branch_in_metadata: bool,
    pub include_short_hash_in_metadata: bool,
}

/// Everything the calculator needs to version one project.
#[derive(Debug, Clone)]
pub struct VersionOptions {
    pub repo_root: PathBuf,
    /// Project source directory, relative to the repository root.
    pub project_path: PathBuf,
    pub project_name: String,
    pub tag_prefix: String,
    pub prerelease_type: PrereleaseType,
    /// Configured baseline overriding discovered tags when higher.
    pub base_version: Option<Version>,
    /// Short-circuit: emit exactly this string.
    pub force_version: Option<String>,
    /// Source directories of transitive dependencies, repo-root relative.
    pub dependencies: Vec<PathBuf>,
    pub additional_monitor_paths: Vec<String>,
    pub skip_test_projects: bool,
    pub skip_non_packable: bool,
    /// Explicitly requested bump; overrides commit and file analysis.
    pub default_increment: Option<BumpType>,
    pub scheme: VersionScheme,
    pub calver: CalVerConfig,
    pub git: GitIntegrationConfig,
    pub change_detection: ChangeDetectionConfig,
    pub constraints: VersionConstraints,
    pub conventional: ConventionalCommitConfig,
    pub is_test: bool,
    pub is_packable: bool,
    pub major_approved: bool,
}

impl Default for VersionOptions {
    fn default() -> Self {
        VersionOptions {
            repo_root: PathBuf::new(),
            project_path: PathBuf::new(),
            project_name: String::new(),
            tag_prefix: "v".to_string(),
            prerelease_type: PrereleaseType::None,
            base_version: None,
            force_version: None,
            dependencies: Vec::new(),
            additional_monitor_paths: Vec::new(),
            skip_test_projects: false,
            skip_non_packable: false,
            default_increment: None,
            scheme: VersionScheme::SemVer,
            calver: CalVerConfig::default(),
            git: GitIntegrationConfig::default(),
            change_detection: ChangeDetectionConfig::default(),
            constraints: VersionConstraints::default(),
            conventional: ConventionalCommitConfig::default(),
            is_test: false,
            is_packable: true,
            major_approved: false,
        }
    }
}

/// Result of versioning one project.
#[derive(Debug, Clone, Serialize)]
pub struct VersionResult {
    pub project: String,
    /// Full version string including build metadata when present.
    pub version: String,
    #[serde(skip)]
    pub semver: Version,
    pub changed: bool,
    pub reason: String,
    pub commit_height: u64,
    pub scheme: VersionScheme,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calver: Option<CalVerConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    #[serde(skip)]
    pub baseline_commit: Option<String>,
    /// Warning-severity constraint violations.
    pub warnings: Vec<Violation>,
}

/// Where the resolved baseline came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BaselineSource {
    Tag,
    ConfigBase,
    InitialDefault,
}

fn resolve_baseline(
    vcs: &dyn Vcs,
    cache: &RunCache,
    options: &VersionOptions,
    branch: &BranchKind,
) -> EngineResult<(VersionTag, BaselineSource)> {
    let key = RunCache::tag_key(&options.project_name, branch.label(), &options.tag_prefix);

    let project_tag = match cache.tag(&key) {
        Some(cached) => cached,
        None => {
            let tag = find_project_tag(vcs, &options.project_name, &options.tag_prefix)?;
            cache.store_tag(key, tag.clone());
            tag
        }
    };
    let global_key = RunCache::tag_key("", branch.label(), &options.tag_prefix);
    let global_tag = match cache.tag(&global_key) {
        Some(cached) => cached,
        None => {
            let tag = find_global_tag(vcs, &options.tag_prefix)?;
            cache.store_tag(global_key, tag.clone());
            tag
        }
    };

    // A configured base version wins when it is ahead of everything the
    // repository already carries.
    if let Some(base) = &options.base_version {
        let highest_known = [&project_tag, &global_tag]
            .into_iter()
            .flatten()
            .map(|t| &t.version)
            .max_by(|a, b| a.cmp_precedence(b));
        let base_is_ahead = match highest_known {
            Some(known) => base.cmp_precedence(known).is_gt(),
            None => true,
        };
        if base_is_ahead {
            return Ok((
                VersionTag::global(base.clone(), None),
                BaselineSource::ConfigBase,
            ));
        }
    }

    let tag = match (project_tag, global_tag) {
        (None, None) => {
            return Ok((
                VersionTag::global(Version::new(0, 1, 0), None),
                BaselineSource::InitialDefault,
            ));
        }
        (Some(project), None) => project,
        (None, Some(global)) => global,
        (Some(project), Some(global)) => {
            let project_key = (project.version.major, project.version.minor);
            let global_key = (global.version.major, global.version.minor);
            if global_key > project_key { global } else { project }
        }
    };
    Ok((tag, BaselineSource::Tag))
}

fn unchanged(
    options: &VersionOptions,
    baseline: &VersionTag,
    reason: &str,
    height: u64,
) -> VersionResult {
    VersionResult {
        project: options.project_name.clone(),
        version: full_string(&baseline.version),
        semver: baseline.version.clone(),
        changed: false,
        reason: reason.to_string(),
        commit_height: height,
        scheme: options.scheme,
        calver: calver_echo(options),
        previous_version: Some(full_string(&baseline.version)),
        baseline_commit: baseline.commit.clone(),
        warnings: Vec::new(),
    }
}

fn calver_echo(options: &VersionOptions) -> Option<CalVerConfig> {
    match options.scheme {
        VersionScheme::CalVer => Some(options.calver.clone()),
        VersionScheme::SemVer => None,
    }
}

fn cached_height(
    vcs: &dyn Vcs,
    cache: &RunCache,
    from: Option<&str>,
    to: &str,
) -> EngineResult<u64> {
    let Some(from) = from else {
        return Ok(0);
    };
    let key = RunCache::height_key(from, to);
    if let Some(height) = cache.height(&key) {
        return Ok(height);
    }
    let height = vcs.commit_height(from, to)?;
    cache.store_height(key, height);
    Ok(height)
}

/// The SemVer branch policy: how the baseline advances on each branch kind.
fn apply_branch_policy(
    options: &VersionOptions,
    branch: &BranchKind,
    baseline: &Version,
    bump: BumpType,
    height: u64,
) -> EngineResult<(Version, String)> {
    match branch {
        BranchKind::Main => {
            if let Some((channel, n)) = prerelease_parts(baseline) {
                let next = with_prerelease(baseline, &format!("{}.{}", channel, n + 1))?;
                return Ok((next, format!("Incrementing {} version", channel)));
            }
            // A prerelease without a numeric counter cannot progress; degrade
            // to a patch bump and re-apply the configured channel.
            let (effective_bump, note) = if baseline.pre.is_empty() {
                (bump, None)
            } else {
                (BumpType::Patch, Some("malformed prerelease suffix"))
            };
            let mut next = apply_bump(baseline, effective_bump);
            let reason = match options.prerelease_type.channel() {
                Some(channel) => {
                    next = with_prerelease(&next, &format!("{}.1", channel))?;
                    format!(
                        "Incrementing {} version with {} prerelease",
                        effective_bump, channel
                    )
                }
                None => format!("Incrementing {} version", effective_bump),
            };
            debug!(note, version = %next, "main branch policy applied");
            Ok((next, reason))
        }
        BranchKind::Release(extracted) => {
            let next = with_prerelease(extracted, "rc.1")?;
            let reason = format!("Release candidate for {}", extracted);
            Ok((next, reason))
        }
        BranchKind::Dev => {
            let next = with_prerelease(
                &apply_bump(baseline, BumpType::Patch),
                &format!("dev.{}", height),
            )?;
            Ok((next, "Dev branch build".to_string()))
        }
        BranchKind::Feature(name) => {
            let identifier = if name.is_empty() { "feature" } else { name };
            let next = with_prerelease(
                &apply_bump(baseline, BumpType::Patch),
                &format!("{}.{}", identifier, height),
            )?;
            Ok((next, "Feature branch build".to_string()))
        }
    }
}

/// Compute the version for a single project.
pub fn calculate_version(
    vcs: &dyn Vcs,
    cache: &RunCache,
    options: &VersionOptions,
    today: NaiveDate,
) -> EngineResult<VersionResult> {
    if options.project_name.is_empty() {
        return Err(EngineError::invalid_input("project name is empty"));
    }

    let head = vcs.head_commit()?;
    let branch_name = vcs.current_branch_name()?;
    let branch = classify_branch(&branch_name, &options.tag_prefix);
    debug!(project = %options.project_name, branch = %branch_name, "calculating version");

    let (baseline, source) = resolve_baseline(vcs, cache, options, &branch)?;

    // Skip rules come before any diffing.
    if options.is_test && options.skip_test_projects {
        return Ok(unchanged(options, &baseline, "Test project", 0));
    }
    if !options.is_packable && options.skip_non_packable {
        return Ok(unchanged(options, &baseline, "Non-packable project", 0));
    }

    if let Some(forced) = &options.force_version {
        let semver = parse_version(forced, &options.tag_prefix)
            .unwrap_or_else(|_| Version::new(0, 0, 0));
        return Ok(VersionResult {
            project: options.project_name.clone(),
            version: forced.clone(),
            semver,
            changed: true,
            reason: "Forced version".to_string(),
            commit_height: 0,
            scheme: options.scheme,
            calver: calver_echo(options),
            previous_version: Some(full_string(&baseline.version)),
            baseline_commit: baseline.commit.clone(),
            warnings: Vec::new(),
        });
    }

    // Config-derived baselines have no commit to diff against: the baseline
    // version itself is the answer.
    if baseline.commit.is_none() {
        let reason = match source {
            BaselineSource::ConfigBase => "First change with new base version from configuration",
            _ => "Initial repository",
        };
        let version = match options.scheme {
            VersionScheme::CalVer
                if source == BaselineSource::InitialDefault
                    && options.calver.applies_on(today) =>
            {
                options.calver.compute(today, None)
            }
            _ => baseline.version.clone(),
        };
        return Ok(VersionResult {
            project: options.project_name.clone(),
            version: full_string(&version),
            semver: version,
            changed: true,
            reason: reason.to_string(),
            commit_height: 0,
            scheme: options.scheme,
            calver: calver_echo(options),
            previous_version: None,
            baseline_commit: None,
            warnings: Vec::new(),
        });
    }

    let classifier = ChangeClassifier::new(&options.change_detection);
    let report: ChangeReport = detect_changes(
        vcs,
        &head,
        baseline.commit.as_deref(),
        &options.project_path,
        &options.dependencies,
        &options.additional_monitor_paths,
        &classifier,
    )?;
    cache.store_has_changes(
        format!("{}_{}", options.project_name, head),
        report.changed,
    );

    let height = cached_height(vcs, cache, baseline.commit.as_deref(), &head)?;

    if !report.changed && options.default_increment.is_none() {
        return Ok(unchanged(options, &baseline, "No changes detected", height));
    }

    // Bump priority: explicit increment, then conventional commits, then the
    // file-pattern classification, then plain patch.
    let bump = match options.default_increment {
        Some(explicit) => explicit,
        None => {
            let conventional_bump = if options.conventional.enabled {
                let commits = vcs.commits_between(baseline.commit.as_deref(), &head)?;
                analyze_bump_type(&commits, &options.conventional)
            } else {
                BumpType::None
            };
            if conventional_bump != BumpType::None {
                conventional_bump
            } else if report.bump != BumpType::None {
                report.bump
            } else {
                BumpType::Patch
            }
        }
    };

    // CalVer projects follow the calendar only from the configured start
    // date; until then they advance like any SemVer project.
    let use_calendar =
        options.scheme == VersionScheme::CalVer && options.calver.applies_on(today);
    let (mut candidate, reason) = if use_calendar {
        let version = options.calver.compute(today, Some(&baseline.version));
        (version, format!("Calendar version for {}", today))
    } else {
        apply_branch_policy(options, &branch, &baseline.version, bump, height)?
    };

    let mut metadata = Vec::new();
    if options.git.include_branch_in_metadata {
        metadata.push(sanitize_branch(&branch_name));
    }
    if options.git.include_short_hash_in_metadata {
        let short = &head[..head.len().min(7)];
        metadata.push(format!("sha.{}", short));
    }
    if !metadata.is_empty() {
        candidate = with_build(&candidate, &metadata.join("."))?;
    }

    let violations = options.constraints.validate(
        &full_string(&candidate),
        &baseline.version,
        bump,
        options.major_approved,
    );
    let (errors, warnings) = partition(violations);
    if !errors.is_empty() {
        return Err(EngineError::ConstraintViolation { violations: errors });
    }

    info!(
        project = %options.project_name,
        version = %candidate,
        %reason,
        "version calculated"
    );

    Ok(VersionResult {
        project: options.project_name.clone(),
        version: full_string(&candidate),
        semver: candidate,
        changed: true,
        reason,
        commit_height: height,
        scheme: options.scheme,
        calver: calver_echo(options),
        previous_version: Some(full_string(&baseline.version)),
        baseline_commit: baseline.commit.clone(),
        warnings,
    })
}
