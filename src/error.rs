//! Error types for Momentum Flux

use thiserror::Error;

/// Errors raised by storage collaborators
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store read failed: {0}")]
    Read(String),

    #[error("Store write failed: {0}")]
    Write(String),

    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),
}

/// Errors that can occur during computation or orchestration
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
