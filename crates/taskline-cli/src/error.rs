use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] taskline_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No task title provided")]
    EmptyTitle,
    #[error("Task ID cannot be empty")]
    EmptyTaskId,
    #[error("Task not found for id/prefix: {0}")]
    TaskNotFound(String),
    #[error("{0}")]
    AmbiguousTaskId(String),
    #[error("Invalid value: {0}")]
    InvalidArgument(String),
    #[error("Nothing to change; pass at least one field")]
    NothingToEdit,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Sync is not configured. Set TASKLINE_API_URL (and TASKLINE_ACCESS_TOKEN if required).")]
    SyncNotConfigured,
}

impl From<taskline_core::config::ConfigError> for CliError {
    fn from(error: taskline_core::config::ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}
