//! ABOUTME: Error type for the state/log/history substrate

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    /// Surfaces identically whether the row is missing or owned by someone
    /// else — ownership failures must not leak which case occurred.
    #[error("not_found_or_forbidden")]
    NotFoundOrForbidden,

    #[error("artifact rejected by safety gate: {reason}")]
    SafetyGate { reason: String },

    #[error("invalid trigger parameters: {0}")]
    InvalidTrigger(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("execution {0} not found")]
    ExecutionNotFound(i64),
}

pub type StateResult<T> = std::result::Result<T, StateError>;
