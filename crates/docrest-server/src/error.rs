//! The service error taxonomy.
//!
//! Four kinds cover every failure the transport needs to distinguish:
//! bad-request, not-authorized, not-found and internal. Transports inspect
//! the kind through predicates rather than matching variants, so storage and
//! rule-engine errors can be folded in without leaking their types upward.

use docrest_domain::DomainError;
use docrest_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the request pipeline.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed input: bad path, invalid id, unknown order-by field,
    /// undecodable body.
    #[error("{message}")]
    BadRequest { message: String },

    /// The caller may not perform this operation on this target. Also
    /// covers targets no rule matches, so the rule set never leaks which
    /// documents exist.
    #[error("not authorized to access '{target}'")]
    NotAuthorized { target: String },

    /// The caller presented a credential that failed verification.
    #[error("invalid credential")]
    InvalidCredentials,

    /// The requested document does not exist.
    #[error("target not found: '{target}'")]
    NotFound { target: String },

    /// Anything else: rule evaluation failures, storage failures.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ServiceError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ServiceError::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_authorized(target: impl Into<String>) -> Self {
        ServiceError::NotAuthorized {
            target: target.into(),
        }
    }

    pub fn is_bad_request(&self) -> bool {
        matches!(self, ServiceError::BadRequest { .. })
    }

    pub fn is_not_authorized(&self) -> bool {
        matches!(
            self,
            ServiceError::NotAuthorized { .. } | ServiceError::InvalidCredentials
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound { .. })
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DocumentNotFound { target } => ServiceError::NotFound { target },
            e if e.is_bad_request() => ServiceError::BadRequest {
                message: e.to_string(),
            },
            e => ServiceError::Internal {
                message: e.to_string(),
            },
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        if err.is_bad_request() {
            ServiceError::BadRequest {
                message: err.to_string(),
            }
        } else {
            ServiceError::Internal {
                message: err.to_string(),
            }
        }
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
