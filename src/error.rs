//! Error types for tasktrail
//!
//! Library code returns [`TaskTrailError`]; the binary wraps it with anyhow
//! context at the command boundary.

use thiserror::Error;

/// Main error type for tasktrail operations
#[derive(Error, Debug)]
pub enum TaskTrailError {
    /// SQLite operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error (activity logs, database directory)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// A blacklist or find pattern failed to compile
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Search not found: {0}")]
    SearchNotFound(u64),

    #[error("Task not found: {0}")]
    TaskNotFound(u64),

    /// Stored state failed to load; the model runs without saving
    #[error("Stored state could not be loaded: {0}")]
    StorageUnavailable(String),

    /// The ingestion worker has stopped and can no longer accept commands
    #[error("Model runtime is no longer running")]
    RuntimeClosed,

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for tasktrail operations
pub type Result<T> = std::result::Result<T, TaskTrailError>;

impl From<serde_yaml::Error> for TaskTrailError {
    fn from(err: serde_yaml::Error) -> Self {
        TaskTrailError::Config(err.to_string())
    }
}

impl From<glob::PatternError> for TaskTrailError {
    fn from(err: glob::PatternError) -> Self {
        TaskTrailError::Config(format!("invalid log glob: {}", err))
    }
}
