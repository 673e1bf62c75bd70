use thiserror::Error;

/// Storage operation error.
///
/// These are infrastructure errors as opposed to domain errors. Only
/// `Conflict` and `Timeout` are transient: the engine retries them with a
/// fresh read, everything else surfaces immediately.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency check failed, or the backend aborted the
    /// transaction as a serialization failure / deadlock victim.
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// Lock wait or statement timeout.
    #[error("storage timeout: {0}")]
    Timeout(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A write violated a ledger or stock constraint.
    #[error("invalid write: {0}")]
    Invalid(String),

    /// Connection, decoding or any other backend failure.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Timeout(_))
    }
}
