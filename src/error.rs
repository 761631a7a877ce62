//! Error types for clipgate

use thiserror::Error;

/// Main error type for fingerprinting, matching, and scheduling operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("frame capture failed: {reason}")]
    Capture { reason: String },

    #[error("invalid frame matrix: expected {expected} values, got {actual}")]
    InvalidMatrix { expected: usize, actual: usize },

    #[error("invalid fingerprint: {reason}")]
    InvalidFingerprint { reason: String },

    #[error("job '{job_id}' timed out after {timeout_ms}ms")]
    Timeout { job_id: String, timeout_ms: u64 },

    #[error("job '{job_id}' failed: {reason}")]
    Task { job_id: String, reason: String },

    #[error("queue cleared: {reason}")]
    QueueCleared { reason: String },

    #[error("invalid configuration: {reason}")]
    Config { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for clipgate operations
pub type Result<T> = std::result::Result<T, Error>;
