//! Error types for taskline-core

use thiserror::Error;

/// Result type alias using taskline-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in taskline-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Command rejected before it reached the log
    #[error("Validation error: {0}")]
    Validation(String),

    /// Command log file could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Transport failure (connect, timeout, non-2xx status)
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed or partial sync response
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Server answered but reported the round as failed
    #[error("Server rejected sync: {0}")]
    ServerRejected(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether a sync round that failed with this error can simply be retried.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::ServerRejected(_))
    }
}
