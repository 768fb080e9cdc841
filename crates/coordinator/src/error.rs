//! Error types for the coordinator

use crate::transaction::TransactionStatus;
use thiserror::Error;
use tpc_common::TransactionId;

/// Coordinator error types
///
/// Only structural problems surface here. Participant failures are folded
/// into votes during prepare and into completion reports afterwards.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(TransactionId),

    #[error("Cannot {operation} transaction {txn_id} in state {state:?}")]
    InvalidState {
        txn_id: TransactionId,
        state: TransactionStatus,
        operation: &'static str,
    },

    #[error("Coordinator is shut down")]
    ShutDown,

    #[error("Transaction log error: {0}")]
    Log(#[from] tpc_log::LogError),
}

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, CoordinatorError>;
