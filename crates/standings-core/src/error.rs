//! Error types for the standings pipeline.
//!
//! `StoreError` is defined here rather than in `standings-store` so the
//! submission flow and the cache can classify store failures (conflict,
//! timeout, permanent) without string matching.

use thiserror::Error;

/// Errors raised by an attempt store backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A compare-and-set append lost the race against another writer.
    #[error("write conflict: expected version {expected}, found {actual}")]
    Conflict { expected: u64, actual: u64 },

    /// The requested student, class or record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend is temporarily unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer in time.
    #[error("store call timed out after {0}ms")]
    Timeout(u64),

    /// Reading or writing the backing file failed.
    #[error("store I/O error: {0}")]
    Io(String),
}

impl StoreError {
    /// Returns `true` if retrying the same call cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::Io(_))
    }

    /// Returns `true` if this is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Errors surfaced by the standings engine.
#[derive(Debug, Clone, Error)]
pub enum StandingsError {
    /// Malformed input, rejected before anything was written.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The compare-and-set retry budget ran out.
    #[error("concurrent write conflict on {student_id}/{module_id} after {attempts} attempts")]
    Concurrency {
        student_id: String,
        module_id: String,
        attempts: u32,
    },

    /// The attempt store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An operation exceeded its deadline.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    /// Regenerating a scope's snapshot failed and no fallback existed.
    #[error("regeneration of scope '{scope}' failed: {reason}")]
    Regeneration { scope: String, reason: String },

    /// A scope key could not be parsed or is not served.
    #[error("unknown scope: {0}")]
    UnknownScope(String),
}

impl StandingsError {
    pub fn validation(message: impl Into<String>) -> Self {
        StandingsError::Validation(message.into())
    }
}

pub type Result<T, E = StandingsError> = std::result::Result<T, E>;
