//! Phase executors
//!
//! This module provides the two halves of the protocol:
//! - PrepareExecutor: collects votes under a shared deadline and logs the decision
//! - CompletionExecutor: drives commit or rollback with per-participant retries

mod completion;
mod prepare;

pub use completion::{CompletionExecutor, CompletionKind, CompletionReport, ParticipantFailure};
pub use prepare::PrepareExecutor;

use std::sync::Arc;
use tpc_log::{LogError, LogRecord, TransactionLog};

/// Append from async code without stalling a runtime worker
///
/// File-backed logs sync to disk on every append.
pub(crate) async fn append_record(
    log: &Arc<dyn TransactionLog>,
    record: LogRecord,
) -> tpc_log::Result<()> {
    let log = log.clone();
    tokio::task::spawn_blocking(move || log.append(record))
        .await
        .unwrap_or_else(|e| Err(LogError::Io(std::io::Error::other(e))))
}
