use thiserror::Error;

use crate::constraints::Violation;

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors produced by the versioning engine.
///
/// Recoverable conditions (a tag that fails to parse, a single project that
/// cannot be computed) are handled locally and never surface through this
/// type; what remains is either bad input, a broken repository, or a
/// constraint/configuration failure the caller must act on.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Null-ish or nonsensical caller input (missing paths, unknown bump kind).
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// A version string that does not parse as SemVer.
    #[error("malformed version '{value}'")]
    MalformedVersion { value: String },

    /// The underlying repository could not be read at all.
    #[error("version control unavailable: {message}")]
    VcsUnavailable { message: String },

    /// A tag name that was expected to resolve did not.
    #[error("tag '{name}' not found")]
    TagNotFound { name: String },

    /// A commit reference that was expected to resolve did not.
    #[error("commit '{reference}' not found")]
    CommitNotFound { reference: String },

    /// One or more error-severity constraint violations.
    #[error("constraint validation failed ({} violation(s))", violations.len())]
    ConstraintViolation { violations: Vec<Violation> },

    /// Configuration problems that make a run impossible (a project in two
    /// policy groups, an empty group, a malformed group base version).
    #[error("configuration problems: {}", problems.join("; "))]
    Misconfiguration { problems: Vec<String> },

    /// Configuration file could not be read or parsed.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The caller's cancellation flag was raised mid-run.
    #[error("run cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand for [`EngineError::InvalidInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            message: message.into(),
        }
    }

    /// Shorthand for [`EngineError::VcsUnavailable`].
    pub fn vcs(message: impl Into<String>) -> Self {
        EngineError::VcsUnavailable {
            message: message.into(),
        }
    }
}
