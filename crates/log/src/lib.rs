//! Durable transaction log trait and record types
//!
//! The log is the only coordinator state that survives a restart. Backends
//! implement [`TransactionLog`]; replay helpers turn the raw record stream
//! into per-transaction histories for recovery.

mod error;
mod history;
mod record;

pub use error::{LogError, Result};
pub use history::{RecoveryAction, TransactionHistory, fold, history_of, incomplete};
pub use record::{Decision, LogRecord, Phase};

use tpc_common::TransactionId;

/// Trait for transaction log backends
pub trait TransactionLog: Send + Sync {
    /// Append one record atomically (no partial records)
    fn append(&self, record: LogRecord) -> Result<()>;

    /// Read every record in append order
    fn read_all(&self) -> Result<Vec<LogRecord>>;

    /// Transactions whose last record is not terminal, in first-seen order
    fn scan_incomplete(&self) -> Result<Vec<TransactionHistory>> {
        Ok(incomplete(&self.read_all()?))
    }

    /// Everything the log knows about one transaction
    fn history(&self, txn_id: TransactionId) -> Result<Option<TransactionHistory>> {
        Ok(history_of(&self.read_all()?, txn_id))
    }
}
