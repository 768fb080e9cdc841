//! Error types for staging work at a participant

use thiserror::Error;
use tpc_common::TransactionId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StagingError {
    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Transaction {0} no longer accepts work at this participant")]
    Closed(TransactionId),
}

pub type Result<T> = std::result::Result<T, StagingError>;
