//! Two-phase commit transaction coordinator
//!
//! Drives distributed transactions across a set of [`Participant`]s:
//! collects prepare votes under a deadline, delivers the decision with
//! bounded retries, and records every step in a [`TransactionLog`] so an
//! interrupted transaction can be finished by [`Coordinator::recover`].
//!
//! [`Participant`]: tpc_common::Participant
//! [`TransactionLog`]: tpc_log::TransactionLog

pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod recovery;
pub mod registry;
pub mod transaction;

pub use config::CoordinatorConfig;
pub use coordinator::Coordinator;
pub use error::{CoordinatorError, Result};
pub use executor::{
    CompletionExecutor, CompletionKind, CompletionReport, ParticipantFailure, PrepareExecutor,
};
pub use recovery::{ParticipantDirectory, RecoveryManager, RecoverySummary, StaticDirectory};
pub use registry::{TransactionEntry, TransactionRegistry};
pub use transaction::{AbortReason, Outcome, Transaction, TransactionStatus, Vote};
