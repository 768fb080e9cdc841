//! Participants with real state behind them
//!
//! Each participant stages work per transaction, turns staged work into a
//! hold when it votes yes, and applies or discards the hold on commit or
//! rollback. Both answer repeated commit/rollback calls the same way.

mod error;
mod inventory;
mod ledger;

pub use error::{Result, StagingError};
pub use inventory::InventoryParticipant;
pub use ledger::LedgerParticipant;

/// How a transaction ended at this participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    Committed,
    RolledBack,
}
