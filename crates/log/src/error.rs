//! Error types for transaction log storage

use thiserror::Error;

/// Result type for log operations
pub type Result<T> = std::result::Result<T, LogError>;

/// Log errors
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt log record at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
}
