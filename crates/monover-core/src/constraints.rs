//! Version constraint validation.
//!
//! Runs after a candidate version is computed. Error-severity violations
//! fail the project's computation; warnings ride along on the result.

use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::version::{BumpType, parse_version, version_string};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One failed constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub constraint: String,
    pub message: String,
    pub severity: Severity,
}

impl Violation {
    fn error(constraint: &str, message: String) -> Violation {
        Violation {
            constraint: constraint.to_string(),
            message,
            severity: Severity::Error,
        }
    }

    fn warning(constraint: &str, message: String) -> Violation {
        Violation {
            constraint: constraint.to_string(),
            message,
            severity: Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Pattern,
    Range,
}

/// A user-defined rule evaluated against the candidate version string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CustomRule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub severity: Severity,
    /// Rule payload: a glob pattern for `pattern`, a `.x`-wildcard version
    /// pattern for `range`.
    pub config: String,
}

/// Constraint configuration, per scope (global or per project).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct VersionConstraints {
    pub enabled: bool,
    pub minimum_version: Option<String>,
    pub maximum_version: Option<String>,
    /// Version pattern with `.x` wildcards, e.g. `2.3.x`.
    pub allowed_range: Option<String>,
    /// Exact versions that must never be produced; build metadata ignored.
    pub blocked_versions: Vec<String>,
    pub require_monotonic_increase: bool,
    pub require_major_approval: bool,
    pub custom_rules: Vec<CustomRule>,
}

/// Match a version against a `.x`-wildcard pattern. Components beyond the
/// pattern's length are unconstrained.
fn matches_wildcard_range(version: &Version, pattern: &str) -> Option<bool> {
    let components = [version.major, version.minor, version.patch];
    for (i, part) in pattern.split('.').take(3).enumerate() {
        if part.eq_ignore_ascii_case("x") || part == "*" {
            continue;
        }
        let Ok(value) = part.parse::<u64>() else {
            return None;
        };
        if components[i] != value {
            return Some(false);
        }
    }
    Some(true)
}

impl VersionConstraints {
    /// Validate a candidate version. Returns every violation found; the
    /// caller decides how errors and warnings propagate.
    pub fn validate(
        &self,
        candidate: &str,
        baseline: &Version,
        bump: BumpType,
        major_approved: bool,
    ) -> Vec<Violation> {
        if !self.enabled {
            return Vec::new();
        }

        let mut violations = Vec::new();

        let version = match parse_version(candidate, "") {
            Ok(version) => version,
            Err(_) => {
                violations.push(Violation::error(
                    "version",
                    format!("candidate version '{}' is not valid SemVer", candidate),
                ));
                return violations;
            }
        };

        if let Some(minimum) = &self.minimum_version {
            match parse_version(minimum, "") {
                Ok(min) if version.cmp_precedence(&min).is_lt() => {
                    violations.push(Violation::error(
                        "minimumVersion",
                        format!("{} is below the minimum {}", candidate, minimum),
                    ));
                }
                Ok(_) => {}
                Err(_) => violations.push(Violation::warning(
                    "minimumVersion",
                    format!("configured minimum '{}' is not valid SemVer", minimum),
                )),
            }
        }

        if let Some(maximum) = &self.maximum_version {
            match parse_version(maximum, "") {
                Ok(max) if version.cmp_precedence(&max).is_gt() => {
                    violations.push(Violation::error(
                        "maximumVersion",
                        format!("{} is above the maximum {}", candidate, maximum),
                    ));
                }
                Ok(_) => {}
                Err(_) => violations.push(Violation::warning(
                    "maximumVersion",
                    format!("configured maximum '{}' is not valid SemVer", maximum),
                )),
            }
        }

        if let Some(range) = &self.allowed_range {
            match matches_wildcard_range(&version, range) {
                Some(false) => violations.push(Violation::error(
                    "allowedRange",
                    format!("{} is outside the allowed range {}", candidate, range),
                )),
                Some(true) => {}
                None => violations.push(Violation::warning(
                    "allowedRange",
                    format!("allowed range '{}' is malformed", range),
                )),
            }
        }

        for blocked in &self.blocked_versions {
            if let Ok(blocked_version) = parse_version(blocked, "")
                && version_string(&version) == version_string(&blocked_version)
            {
                violations.push(Violation::error(
                    "blockedVersions",
                    format!("{} is on the block list", candidate),
                ));
            }
        }

        if self.require_monotonic_increase && !version.cmp_precedence(baseline).is_gt() {
            violations.push(Violation::error(
                "monotonicIncrease",
                format!("{} does not increase over {}", candidate, baseline),
            ));
        }

        if self.require_major_approval && bump == BumpType::Major && !major_approved {
            violations.push(Violation::error(
                "majorApproval",
                "major bump requires explicit approval".to_string(),
            ));
        }

        for rule in &self.custom_rules {
            let name = rule.name.as_deref().unwrap_or("custom");
            let passed = match rule.rule_type {
                RuleType::Pattern => match glob::Pattern::new(&rule.config) {
                    Ok(pattern) => pattern.matches(&version_string(&version)),
                    Err(e) => {
                        warn!(rule = name, error = %e, "invalid custom rule pattern");
                        violations.push(Violation::warning(
                            name,
                            format!("rule pattern '{}' is invalid", rule.config),
                        ));
                        continue;
                    }
                },
                RuleType::Range => match matches_wildcard_range(&version, &rule.config) {
                    Some(matched) => matched,
                    None => {
                        violations.push(Violation::warning(
                            name,
                            format!("rule range '{}' is invalid", rule.config),
                        ));
                        continue;
                    }
                },
            };
            if !passed {
                violations.push(Violation {
                    constraint: name.to_string(),
                    message: format!("{} violates rule '{}'", candidate, rule.config),
                    severity: rule.severity,
                });
            }
        }

        violations
    }
}

/// Split a violation list into (errors, warnings).
pub fn partition(violations: Vec<Violation>) -> (Vec<Violation>, Vec<Violation>) {
    violations
        .into_iter()
        .partition(|v| v.severity == Severity::Error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled() -> VersionConstraints {
        VersionConstraints {
            enabled: true,
            ..Default::default()
        }
    }

    fn baseline() -> Version {
        Version::new(1, 0, 0)
    }

    #[test]
    fn test_disabled_passes_everything() {
        let constraints = VersionConstraints {
            enabled: false,
            blocked_versions: vec!["2.3.0".to_string()],
            ..Default::default()
        };
        assert!(
            constraints
                .validate("2.3.0", &baseline(), BumpType::Patch, false)
                .is_empty()
        );
    }

    #[test]
    fn test_malformed_candidate_is_error() {
        let violations = enabled().validate("garbage", &baseline(), BumpType::Patch, false);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Error);
        assert_eq!(violations[0].constraint, "version");
    }

    #[test]
    fn test_minimum_version() {
        let constraints = VersionConstraints {
            minimum_version: Some("2.0.0".to_string()),
            ..enabled()
        };
        let violations = constraints.validate("1.9.0", &baseline(), BumpType::Minor, false);
        assert_eq!(violations[0].constraint, "minimumVersion");
        assert!(
            constraints
                .validate("2.0.0", &baseline(), BumpType::Minor, false)
                .is_empty()
        );
    }

    #[test]
    fn test_maximum_version() {
        let constraints = VersionConstraints {
            maximum_version: Some("3.0.0".to_string()),
            ..enabled()
        };
        let violations = constraints.validate("3.0.1", &baseline(), BumpType::Patch, false);
        assert_eq!(violations[0].constraint, "maximumVersion");
    }

    #[test]
    fn test_allowed_range_wildcards() {
        let constraints = VersionConstraints {
            allowed_range: Some("2.3.x".to_string()),
            ..enabled()
        };
        assert!(
            constraints
                .validate("2.3.7", &baseline(), BumpType::Patch, false)
                .is_empty()
        );
        let violations = constraints.validate("2.4.0", &baseline(), BumpType::Minor, false);
        assert_eq!(violations[0].constraint, "allowedRange");
    }

    #[test]
    fn test_allowed_range_short_pattern() {
        let constraints = VersionConstraints {
            allowed_range: Some("2.x".to_string()),
            ..enabled()
        };
        assert!(
            constraints
                .validate("2.9.1", &baseline(), BumpType::Minor, false)
                .is_empty()
        );
        assert!(
            !constraints
                .validate("3.0.0", &baseline(), BumpType::Major, true)
                .is_empty()
        );
    }

    #[test]
    fn test_blocked_versions_ignore_build_metadata() {
        let constraints = VersionConstraints {
            blocked_versions: vec!["2.3.0".to_string()],
            ..enabled()
        };
        let violations = constraints.validate("2.3.0+sha.abc", &baseline(), BumpType::Minor, false);
        assert_eq!(violations[0].constraint, "blockedVersions");
        assert_eq!(violations[0].severity, Severity::Error);
    }

    #[test]
    fn test_blocked_versions_exact_only() {
        let constraints = VersionConstraints {
            blocked_versions: vec!["2.3.0".to_string()],
            ..enabled()
        };
        assert!(
            constraints
                .validate("2.3.1", &baseline(), BumpType::Patch, false)
                .is_empty()
        );
    }

    #[test]
    fn test_monotonic_increase() {
        let constraints = VersionConstraints {
            require_monotonic_increase: true,
            ..enabled()
        };
        let violations = constraints.validate("1.0.0", &baseline(), BumpType::None, false);
        assert_eq!(violations[0].constraint, "monotonicIncrease");
        assert!(
            constraints
                .validate("1.0.1", &baseline(), BumpType::Patch, false)
                .is_empty()
        );
    }

    #[test]
    fn test_major_approval() {
        let constraints = VersionConstraints {
            require_major_approval: true,
            ..enabled()
        };
        let violations = constraints.validate("2.0.0", &baseline(), BumpType::Major, false);
        assert_eq!(violations[0].constraint, "majorApproval");
        assert!(
            constraints
                .validate("2.0.0", &baseline(), BumpType::Major, true)
                .is_empty()
        );
        assert!(
            constraints
                .validate("1.1.0", &baseline(), BumpType::Minor, false)
                .is_empty()
        );
    }

    #[test]
    fn test_custom_pattern_rule_warning_severity() {
        let constraints = VersionConstraints {
            custom_rules: vec![CustomRule {
                name: Some("no-zero-major".to_string()),
                rule_type: RuleType::Pattern,
                severity: Severity::Warning,
                config: "[1-9]*".to_string(),
            }],
            ..enabled()
        };
        let violations = constraints.validate("0.5.0", &baseline(), BumpType::Minor, false);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Warning);
    }

    #[test]
    fn test_custom_range_rule() {
        let constraints = VersionConstraints {
            custom_rules: vec![CustomRule {
                name: None,
                rule_type: RuleType::Range,
                severity: Severity::Error,
                config: "1.x".to_string(),
            }],
            ..enabled()
        };
        assert!(
            constraints
                .validate("1.4.0", &baseline(), BumpType::Minor, false)
                .is_empty()
        );
        let violations = constraints.validate("2.0.0", &baseline(), BumpType::Major, false);
        assert_eq!(violations[0].constraint, "custom");
    }

    #[test]
    fn test_partition() {
        let (errors, warnings) = partition(vec![
            Violation::error("a", "x".to_string()),
            Violation::warning("b", "y".to_string()),
        ]);
        assert_eq!(errors.len(), 1);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_config_deserializes_camel_case() {
        let yaml = r#"
enabled: true
minimumVersion: 1.0.0
blockedVersions:
  - 2.3.0
requireMonotonicIncrease: true
requireMajorApproval: false
customRules:
  - name: stay-in-v2
    type: range
    severity: warning
    config: 2.x
"#;
        let constraints: VersionConstraints = yaml_serde::from_str(yaml).unwrap();
        assert!(constraints.require_monotonic_increase);
        assert_eq!(constraints.custom_rules.len(), 1);
        assert_eq!(constraints.custom_rules[0].rule_type, RuleType::Range);
    }
}
