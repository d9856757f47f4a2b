//! Error types for the authorization engine

use thiserror::Error;

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AccessError {
    /// A record the caller explicitly asked for does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed input or an operation rejected by a protection rule
    #[error("validation failed: {0}")]
    Validation(String),

    /// Persistent-store constraint violation; not retried
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Backend storage failure
    #[error("database error: {0}")]
    Database(String),

    /// Outcome of a failed capability requirement. The display string is
    /// deliberately generic; the fields carry the detail for logging.
    #[error("access denied")]
    Denied {
        subject_id: i64,
        capability: String,
        context_id: i64,
    },

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AccessError>;
