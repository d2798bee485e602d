//! SemVer parsing, formatting and bump arithmetic.
//!
//! Builds on the `semver` crate for ordering (SemVer 2.0.0 identifier
//! comparison comes for free) and adds the lenient parsing the tag resolver
//! needs: an optional tag prefix and a missing patch component.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use semver::{BuildMetadata, Prerelease, Version};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// The coarse magnitude of a version change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BumpType {
    #[default]
    None,
    Patch,
    Minor,
    Major,
}

impl fmt::Display for BumpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BumpType::None => write!(f, "none"),
            BumpType::Patch => write!(f, "patch"),
            BumpType::Minor => write!(f, "minor"),
            BumpType::Major => write!(f, "major"),
        }
    }
}

impl FromStr for BumpType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(BumpType::None),
            "patch" => Ok(BumpType::Patch),
            "minor" => Ok(BumpType::Minor),
            "major" => Ok(BumpType::Major),
            other => Err(EngineError::invalid_input(format!(
                "unknown bump type '{}'",
                other
            ))),
        }
    }
}

static LENIENT_VERSION: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"^(?P<major>\d+)\.(?P<minor>\d+)(?:\.(?P<patch>\d+))?(?:-(?P<pre>[0-9A-Za-z.-]+))?(?:\+(?P<build>[0-9A-Za-z.-]+))?$",
    )
    .expect("lenient version regex is valid")
});

/// Parse a version string, stripping an optional tag prefix first.
///
/// Accepts `MAJOR.MINOR` (patch defaults to 0) in addition to full SemVer.
/// Malformed input is an error, never silently coerced.
pub fn parse_version(input: &str, tag_prefix: &str) -> EngineResult<Version> {
    let trimmed = input.trim();
    let stripped = strip_prefix_ignore_case(trimmed, tag_prefix).unwrap_or(trimmed);

    if let Ok(version) = Version::parse(stripped) {
        return Ok(version);
    }

    let caps = LENIENT_VERSION
        .captures(stripped)
        .ok_or_else(|| EngineError::MalformedVersion {
            value: input.to_string(),
        })?;

    let parse_component = |name: &str| -> EngineResult<u64> {
        caps.name(name)
            .map(|m| {
                m.as_str()
                    .parse::<u64>()
                    .map_err(|_| EngineError::MalformedVersion {
                        value: input.to_string(),
                    })
            })
            .unwrap_or(Ok(0))
    };

    let mut version = Version::new(
        parse_component("major")?,
        parse_component("minor")?,
        parse_component("patch")?,
    );
    if let Some(pre) = caps.name("pre") {
        version.pre = Prerelease::new(pre.as_str()).map_err(|_| EngineError::MalformedVersion {
            value: input.to_string(),
        })?;
    }
    if let Some(build) = caps.name("build") {
        version.build =
            BuildMetadata::new(build.as_str()).map_err(|_| EngineError::MalformedVersion {
                value: input.to_string(),
            })?;
    }
    Ok(version)
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return None;
    }
    match s.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => Some(&s[prefix.len()..]),
        _ => None,
    }
}

/// Format as an artifact version: `MAJOR.MINOR.PATCH[-PRE]`, build metadata omitted.
pub fn version_string(version: &Version) -> String {
    if version.pre.is_empty() {
        format!("{}.{}.{}", version.major, version.minor, version.patch)
    } else {
        format!(
            "{}.{}.{}-{}",
            version.major, version.minor, version.patch, version.pre
        )
    }
}

/// Format the full string, including `+BUILD` when present.
pub fn full_string(version: &Version) -> String {
    version.to_string()
}

/// Apply a bump to the numeric components, resetting the lower ones.
///
/// Prerelease and build metadata are cleared; the caller re-applies them.
pub fn apply_bump(version: &Version, bump: BumpType) -> Version {
    match bump {
        BumpType::Major => Version::new(version.major + 1, 0, 0),
        BumpType::Minor => Version::new(version.major, version.minor + 1, 0),
        BumpType::Patch => Version::new(version.major, version.minor, version.patch + 1),
        BumpType::None => Version::new(version.major, version.minor, version.patch),
    }
}

/// Split a prerelease of the form `{channel}.N` into its parts.
///
/// Returns `None` for stable versions and for suffixes without a trailing
/// numeric counter (e.g. a bare `-alpha`).
pub fn prerelease_parts(version: &Version) -> Option<(String, u64)> {
    if version.pre.is_empty() {
        return None;
    }
    let pre = version.pre.as_str();
    let (channel, counter) = pre.rsplit_once('.')?;
    let n = counter.parse::<u64>().ok()?;
    if channel.is_empty() {
        return None;
    }
    Some((channel.to_string(), n))
}

/// Replace the prerelease component, keeping the numeric base.
pub fn with_prerelease(version: &Version, pre: &str) -> EngineResult<Version> {
    let mut out = Version::new(version.major, version.minor, version.patch);
    out.pre = Prerelease::new(pre).map_err(|_| EngineError::MalformedVersion {
        value: format!("{}-{}", version_string(version), pre),
    })?;
    Ok(out)
}

/// Replace the build metadata on a version, preserving everything else.
pub fn with_build(version: &Version, build: &str) -> EngineResult<Version> {
    let mut out = version.clone();
    out.build = BuildMetadata::new(build).map_err(|_| EngineError::MalformedVersion {
        value: format!("{}+{}", version_string(version), build),
    })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let v = parse_version("1.2.3", "v").unwrap();
        assert_eq!(v, Version::new(1, 2, 3));
    }

    #[test]
    fn test_parse_with_prefix() {
        let v = parse_version("v1.2.3", "v").unwrap();
        assert_eq!(v, Version::new(1, 2, 3));
    }

    #[test]
    fn test_parse_prefix_case_insensitive() {
        let v = parse_version("V2.0.0", "v").unwrap();
        assert_eq!(v, Version::new(2, 0, 0));
    }

    #[test]
    fn test_parse_missing_patch_defaults_to_zero() {
        let v = parse_version("1.2", "v").unwrap();
        assert_eq!(v, Version::new(1, 2, 0));
    }

    #[test]
    fn test_parse_missing_patch_with_prerelease() {
        let v = parse_version("2.1-rc.1", "").unwrap();
        assert_eq!(v.major, 2);
        assert_eq!(v.minor, 1);
        assert_eq!(v.patch, 0);
        assert_eq!(v.pre.as_str(), "rc.1");
    }

    #[test]
    fn test_parse_full_with_build() {
        let v = parse_version("1.0.0-beta.2+sha.abc1234", "").unwrap();
        assert_eq!(v.pre.as_str(), "beta.2");
        assert_eq!(v.build.as_str(), "sha.abc1234");
    }

    #[test]
    fn test_parse_malformed_is_error() {
        assert!(parse_version("not-a-version", "v").is_err());
        assert!(parse_version("1", "v").is_err());
        assert!(parse_version("", "v").is_err());
    }

    #[test]
    fn test_roundtrip_valid_semver() {
        for s in ["1.2.3", "0.1.0", "1.0.0-alpha.1", "2.0.0-rc.1+build.5"] {
            let v = parse_version(s, "").unwrap();
            assert_eq!(full_string(&v), s);
        }
    }

    #[test]
    fn test_version_string_omits_build() {
        let v = parse_version("1.2.3-rc.1+sha.deadbee", "").unwrap();
        assert_eq!(version_string(&v), "1.2.3-rc.1");
        assert_eq!(full_string(&v), "1.2.3-rc.1+sha.deadbee");
    }

    #[test]
    fn test_ordering_prerelease_below_release() {
        let pre = parse_version("1.0.0-alpha.1", "").unwrap();
        let rel = parse_version("1.0.0", "").unwrap();
        assert!(pre < rel);
    }

    #[test]
    fn test_ordering_numeric_vs_alphanumeric_identifiers() {
        let numeric = parse_version("1.0.0-1", "").unwrap();
        let alpha = parse_version("1.0.0-alpha", "").unwrap();
        assert!(numeric < alpha);
    }

    #[test]
    fn test_ordering_ignores_build_metadata() {
        let a = parse_version("1.0.0+abc", "").unwrap();
        let b = parse_version("1.0.0+xyz", "").unwrap();
        assert_eq!(a.cmp_precedence(&b), std::cmp::Ordering::Equal);
    }

    #[test]
    fn test_apply_bump_resets_lower_components() {
        let v = Version::new(1, 2, 3);
        assert_eq!(apply_bump(&v, BumpType::Major), Version::new(2, 0, 0));
        assert_eq!(apply_bump(&v, BumpType::Minor), Version::new(1, 3, 0));
        assert_eq!(apply_bump(&v, BumpType::Patch), Version::new(1, 2, 4));
        assert_eq!(apply_bump(&v, BumpType::None), Version::new(1, 2, 3));
    }

    #[test]
    fn test_apply_bump_clears_prerelease() {
        let v = parse_version("1.2.3-alpha.4", "").unwrap();
        assert_eq!(apply_bump(&v, BumpType::Patch), Version::new(1, 2, 4));
    }

    #[test]
    fn test_prerelease_parts() {
        let v = parse_version("1.0.0-alpha.5", "").unwrap();
        assert_eq!(prerelease_parts(&v), Some(("alpha".to_string(), 5)));

        let v = parse_version("1.0.0-nightly.12", "").unwrap();
        assert_eq!(prerelease_parts(&v), Some(("nightly".to_string(), 12)));
    }

    #[test]
    fn test_prerelease_parts_without_counter() {
        let v = parse_version("1.0.0-alpha", "").unwrap();
        assert_eq!(prerelease_parts(&v), None);

        let v = parse_version("1.0.0", "").unwrap();
        assert_eq!(prerelease_parts(&v), None);
    }

    #[test]
    fn test_bump_type_ordering() {
        assert!(BumpType::Major > BumpType::Minor);
        assert!(BumpType::Minor > BumpType::Patch);
        assert!(BumpType::Patch > BumpType::None);
    }

    #[test]
    fn test_bump_type_from_str() {
        assert_eq!("patch".parse::<BumpType>().unwrap(), BumpType::Patch);
        assert_eq!("MAJOR".parse::<BumpType>().unwrap(), BumpType::Major);
        assert!("huge".parse::<BumpType>().is_err());
    }

    #[test]
    fn test_with_prerelease() {
        let v = Version::new(1, 2, 3);
        let out = with_prerelease(&v, "beta.1").unwrap();
        assert_eq!(out.to_string(), "1.2.3-beta.1");
    }

    #[test]
    fn test_with_build_combines() {
        let v = parse_version("1.2.3-rc.1", "").unwrap();
        let out = with_build(&v, "main.sha.abc1234").unwrap();
        assert_eq!(out.to_string(), "1.2.3-rc.1+main.sha.abc1234");
    }
}
