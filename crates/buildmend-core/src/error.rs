//! Error types for buildmend operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildmendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid build plan at {path}: {reason}")]
    InvalidPlan { path: String, reason: String },

    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Repair agent error: {0}")]
    Repair(String),
}

/// Result type for buildmend operations
pub type Result<T> = std::result::Result<T, BuildmendError>;
