//! Two-phase commit transaction coordinator
//!
//! Facade over the workspace crates plus the pieces the `tpc` binary needs:
//! layered settings, tracing setup and a walkthrough over a file-backed log.

pub mod bootstrap;
pub mod demo;
pub mod error;
pub mod settings;

pub use error::{Error, Result};
pub use settings::{CoordinatorSettings, Settings};

pub use tpc_common::{Participant, ParticipantError, ParticipantId, Timestamp, TransactionId};
pub use tpc_coordinator::{
    CompletionReport, Coordinator, CoordinatorConfig, CoordinatorError, Outcome,
    ParticipantDirectory, RecoverySummary, StaticDirectory, TransactionStatus,
};
pub use tpc_log::{LogRecord, TransactionLog};
pub use tpc_log_file::FileTransactionLog;
pub use tpc_log_memory::MemoryTransactionLog;
pub use tpc_participants::{InventoryParticipant, LedgerParticipant};
