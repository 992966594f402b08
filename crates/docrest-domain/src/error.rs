//! Domain error types.

use thiserror::Error;

/// Errors produced by the path model and the rule engine.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The request path cannot be interpreted as an object reference.
    #[error("{message}")]
    InvalidPath { message: String },

    /// A rule expression failed to parse.
    #[error("failed to parse expression '{expression}': {message}")]
    ExpressionParse { expression: String, message: String },

    /// A rule expression failed to evaluate.
    #[error("failed to evaluate expression '{expression}': {message}")]
    ExpressionEval { expression: String, message: String },

    /// A rule expression evaluated to something other than a boolean.
    #[error("expression '{expression}' did not yield a boolean")]
    NonBooleanCondition { expression: String },

    /// An auxiliary `with` document could not be fetched.
    ///
    /// Rule evaluation never propagates this variant: a failed `with` lookup
    /// binds the name to null. It exists so fetchers have a typed way to
    /// report failure.
    #[error("auxiliary document fetch failed: {message}")]
    WithFetch { message: String },
}

impl DomainError {
    /// Whether this error is the caller's fault (malformed input).
    pub fn is_bad_request(&self) -> bool {
        matches!(self, DomainError::InvalidPath { .. })
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
