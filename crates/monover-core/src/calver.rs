//! Calendar-based versioning.
//!
//! A CalVer value is carried as a [`semver::Version`]: major holds the year
//! token, minor the period token (month or ISO week), patch the sequence
//! counter within the period.

use chrono::{Datelike, NaiveDate};
use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration for the CalVer scheme.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct CalVerConfig {
    /// Token string, e.g. `YYYY.MM.PATCH`. Tokens are separated by `separator`.
    pub format: String,

    /// Separator between tokens in the format string.
    pub separator: String,

    /// Reset the patch counter to 0 when the year or period rolls over.
    #[serde(rename = "resetPatchPeriodically")]
    pub reset_patch_on_period_change: bool,

    /// Earliest date the scheme applies from. Before this date projects
    /// configured for CalVer keep following the SemVer branch policy.
    pub start_date: Option<NaiveDate>,
}

impl Default for CalVerConfig {
    fn default() -> Self {
        CalVerConfig {
            format: "YYYY.MM.PATCH".to_string(),
            separator: ".".to_string(),
            reset_patch_on_period_change: true,
            start_date: None,
        }
    }
}

/// A single recognized CalVer format token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CalToken {
    FullYear,
    ShortYear,
    PaddedYear,
    Month,
    PaddedMonth,
    Week,
    PaddedWeek,
    Patch,
}

impl CalToken {
    fn parse(s: &str) -> Option<CalToken> {
        match s {
            "YYYY" => Some(CalToken::FullYear),
            "YY" => Some(CalToken::ShortYear),
            "0Y" => Some(CalToken::PaddedYear),
            "MM" => Some(CalToken::Month),
            "0M" => Some(CalToken::PaddedMonth),
            "WW" => Some(CalToken::Week),
            "0W" => Some(CalToken::PaddedWeek),
            "PATCH" => Some(CalToken::Patch),
            _ => None,
        }
    }

    fn is_year(self) -> bool {
        matches!(
            self,
            CalToken::FullYear | CalToken::ShortYear | CalToken::PaddedYear
        )
    }

    fn is_period(self) -> bool {
        matches!(
            self,
            CalToken::Month | CalToken::PaddedMonth | CalToken::Week | CalToken::PaddedWeek
        )
    }
}

impl CalVerConfig {
    /// Parse the configured format into tokens, falling back to
    /// `YYYY.MM.PATCH` when the format is unusable.
    fn tokens(&self) -> Vec<CalToken> {
        let sep = if self.separator.is_empty() {
            "."
        } else {
            self.separator.as_str()
        };
        let parsed: Option<Vec<CalToken>> = self.format.split(sep).map(CalToken::parse).collect();
        match parsed {
            Some(tokens)
                if tokens.iter().any(|t| t.is_year()) && tokens.iter().any(|t| t.is_period()) =>
            {
                tokens
            }
            _ => {
                warn!(format = %self.format, "invalid CalVer format, falling back to YYYY.MM.PATCH");
                vec![CalToken::FullYear, CalToken::Month, CalToken::Patch]
            }
        }
    }

    fn year_component(&self, date: NaiveDate) -> u64 {
        let year = date.year().max(0) as u64;
        match self.tokens().iter().find(|t| t.is_year()) {
            Some(CalToken::FullYear) | None => year,
            Some(_) => year % 100,
        }
    }

    fn period_component(&self, date: NaiveDate) -> u64 {
        match self.tokens().iter().find(|t| t.is_period()) {
            Some(CalToken::Week) | Some(CalToken::PaddedWeek) => date.iso_week().week() as u64,
            _ => date.month() as u64,
        }
    }

    /// Compute the CalVer version for `date`, given the previously released
    /// version (if any).
    ///
    /// When the year or period component differs from `existing`, the patch
    /// counter resets to 0 if `reset_patch_on_period_change` is set;
    /// otherwise the counter keeps incrementing.
    pub fn compute(&self, date: NaiveDate, existing: Option<&Version>) -> Version {
        let year = self.year_component(date);
        let period = self.period_component(date);

        let patch = match existing {
            None => 0,
            Some(prev) => {
                let period_changed = prev.major != year || prev.minor != period;
                if period_changed && self.reset_patch_on_period_change {
                    0
                } else {
                    prev.patch + 1
                }
            }
        };

        Version::new(year, period, patch)
    }

    /// Whether the calendar scheme is in effect on `date`.
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        self.start_date.is_none_or(|start| date >= start)
    }

    /// Whether a new version should be produced for `date` at all: true when
    /// there is no existing version, or when its year/period components
    /// differ from the current date's.
    pub fn should_increment(&self, date: NaiveDate, existing: Option<&Version>) -> bool {
        match existing {
            None => true,
            Some(prev) => {
                prev.major != self.year_component(date) || prev.minor != self.period_component(date)
            }
        }
    }

    /// Render a CalVer version with the configured separator and zero padding.
    ///
    /// The numeric value is held in a plain [`Version`]; padding tokens
    /// (`0Y`, `0M`, `0W`) only affect this string form.
    pub fn render(&self, version: &Version) -> String {
        let sep = if self.separator.is_empty() {
            "."
        } else {
            self.separator.as_str()
        };
        self.tokens()
            .iter()
            .map(|token| match token {
                CalToken::FullYear => version.major.to_string(),
                CalToken::ShortYear => version.major.to_string(),
                CalToken::PaddedYear => format!("{:02}", version.major),
                CalToken::Month | CalToken::Week => version.minor.to_string(),
                CalToken::PaddedMonth | CalToken::PaddedWeek => format!("{:02}", version.minor),
                CalToken::Patch => version.patch.to_string(),
            })
            .collect::<Vec<_>>()
            .join(sep)
    }
}
