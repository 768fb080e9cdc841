//! Commit and rollback phase of 2PC
//!
//! Once a decision is durable it is never revisited. Every participant gets
//! the decision with bounded retries; participants that still fail are
//! reported, and the transaction reaches its terminal state regardless.

use super::append_record;
use crate::config::CoordinatorConfig;
use crate::registry::TransactionEntry;
use crate::transaction::TransactionStatus;
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tpc_common::{Participant, ParticipantError, ParticipantId, TransactionId};
use tpc_log::{LogRecord, TransactionLog};

/// Which decision is being delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    Commit,
    Rollback,
}

impl CompletionKind {
    /// State the transaction is in while calls are outstanding
    fn in_progress(&self) -> TransactionStatus {
        match self {
            CompletionKind::Commit => TransactionStatus::Committing,
            CompletionKind::Rollback => TransactionStatus::Aborting,
        }
    }

    /// State the transaction ends in
    fn terminal(&self) -> TransactionStatus {
        match self {
            CompletionKind::Commit => TransactionStatus::Committed,
            CompletionKind::Rollback => TransactionStatus::Aborted,
        }
    }

    fn record(&self, txn_id: TransactionId, failed: Vec<ParticipantId>) -> LogRecord {
        match self {
            CompletionKind::Commit => LogRecord::commit(txn_id, failed),
            CompletionKind::Rollback => LogRecord::rollback(txn_id, failed),
        }
    }
}

/// A participant that never acknowledged the decision
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantFailure {
    pub participant: ParticipantId,
    /// Calls made, including the first; zero if the participant could not be reached at all
    pub attempts: u32,
    pub error: ParticipantError,
}

/// What happened while delivering a decision
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReport {
    pub txn_id: TransactionId,

    /// Status of the transaction after the run
    pub status: TransactionStatus,

    /// False when the run was a no-op because of the current state
    pub driven: bool,

    pub failures: Vec<ParticipantFailure>,
}

impl CompletionReport {
    fn untouched(txn_id: TransactionId, status: TransactionStatus) -> Self {
        Self {
            txn_id,
            status,
            driven: false,
            failures: Vec::new(),
        }
    }

    /// Some participant may not have applied the decision
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn failed_participants(&self) -> Vec<ParticipantId> {
        self.failures.iter().map(|f| f.participant.clone()).collect()
    }
}

/// Delivers commit or rollback to every participant of a transaction
pub struct CompletionExecutor {
    backoff: ExponentialBuilder,
    log: Arc<dyn TransactionLog>,
}

impl CompletionExecutor {
    pub fn new(config: &CoordinatorConfig, log: Arc<dyn TransactionLog>) -> Self {
        Self {
            backoff: config.backoff(),
            log,
        }
    }

    /// Commit a prepared transaction
    ///
    /// A transaction already committed is left alone.
    pub async fn run_commit(&self, entry: &TransactionEntry) -> CompletionReport {
        self.complete(entry, CompletionKind::Commit, Vec::new()).await
    }

    /// Roll back an aborting transaction
    ///
    /// A transaction already aborted is left alone.
    pub async fn run_rollback(&self, entry: &TransactionEntry) -> CompletionReport {
        self.complete(entry, CompletionKind::Rollback, Vec::new()).await
    }

    /// Deliver `kind` to every participant of `entry`
    ///
    /// `unreachable` names participants that cannot be called at all; they
    /// are reported and logged as failed.
    pub(crate) async fn complete(
        &self,
        entry: &TransactionEntry,
        kind: CompletionKind,
        unreachable: Vec<ParticipantId>,
    ) -> CompletionReport {
        let txn_id = entry.id();

        let participants = match entry.update(|txn| Self::enter(txn, kind)) {
            Ok(participants) => participants,
            Err(status) => {
                if !status.is_terminal() {
                    tracing::warn!(%txn_id, ?status, ?kind, "Transaction cannot be completed from this state");
                }
                return CompletionReport::untouched(txn_id, status);
            }
        };

        tracing::debug!(%txn_id, ?kind, participants = participants.len(), "Delivering decision");

        let handles: Vec<_> = participants
            .into_iter()
            .map(|participant| {
                let backoff = self.backoff.clone();
                let id = participant.id().clone();
                let handle = tokio::spawn(async move {
                    deliver(participant.as_ref(), txn_id, kind, backoff).await
                });
                (id, handle)
            })
            .collect();

        let mut failures: Vec<ParticipantFailure> = unreachable
            .into_iter()
            .map(|participant| ParticipantFailure {
                participant,
                attempts: 0,
                error: ParticipantError::Unavailable("not found in participant directory".into()),
            })
            .collect();

        for (participant, handle) in handles {
            let failure = match handle.await {
                Ok((_, Ok(()))) => continue,
                Ok((attempts, Err(error))) => ParticipantFailure {
                    participant,
                    attempts,
                    error,
                },
                Err(join_error) => ParticipantFailure {
                    participant,
                    attempts: 0,
                    error: ParticipantError::Other(join_error.to_string()),
                },
            };
            failures.push(failure);
        }

        let status = kind.terminal();
        if let Err(e) = entry.update(|txn| txn.transition(status)) {
            tracing::error!(%txn_id, error = %e, "Failed to finish transaction");
        }

        let failed: Vec<ParticipantId> = failures.iter().map(|f| f.participant.clone()).collect();
        if let Err(e) = append_record(&self.log, kind.record(txn_id, failed.clone())).await {
            tracing::warn!(%txn_id, ?kind, error = %e, "Failed to log completion");
        }

        if failed.is_empty() {
            tracing::info!(%txn_id, ?status, "Transaction completed");
        } else {
            tracing::warn!(
                %txn_id,
                ?status,
                failed = ?failed,
                "Transaction completed degraded; some participants never acknowledged"
            );
        }

        CompletionReport {
            txn_id,
            status,
            driven: true,
            failures,
        }
    }

    /// Move into the in-progress state and snapshot the participants, or
    /// return the current status if there is nothing to do
    fn enter(
        txn: &mut crate::transaction::Transaction,
        kind: CompletionKind,
    ) -> std::result::Result<Vec<Arc<dyn Participant>>, TransactionStatus> {
        let status = txn.status();

        let ready = match (kind, status) {
            (_, current) if current == kind.in_progress() => true,
            (CompletionKind::Commit, TransactionStatus::Prepared) => true,
            // A prepare run that never finished counts as abort
            (CompletionKind::Rollback, TransactionStatus::Preparing) => true,
            _ => false,
        };
        if !ready {
            return Err(status);
        }

        if status != kind.in_progress() {
            txn.transition(kind.in_progress()).map_err(|_| status)?;
        }
        Ok(txn.participants().to_vec())
    }
}

/// Call commit or rollback on one participant until it succeeds, the
/// retries run out or it answers with a non-transient error; returns the
/// number of calls made with the last result
async fn deliver(
    participant: &dyn Participant,
    txn_id: TransactionId,
    kind: CompletionKind,
    backoff: ExponentialBuilder,
) -> (u32, std::result::Result<(), ParticipantError>) {
    let attempts = AtomicU32::new(0);
    let counter = &attempts;

    let result = (|| {
        counter.fetch_add(1, Ordering::Relaxed);
        invoke(participant, txn_id, kind)
    })
    .retry(backoff)
    .sleep(tokio::time::sleep)
    .when(ParticipantError::is_transient)
    .notify(|error: &ParticipantError, delay: Duration| {
        tracing::warn!(
            %txn_id,
            participant = %participant.id(),
            ?kind,
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "Participant call failed, retrying"
        );
    })
    .await;

    (attempts.into_inner(), result)
}

async fn invoke(
    participant: &dyn Participant,
    txn_id: TransactionId,
    kind: CompletionKind,
) -> std::result::Result<(), ParticipantError> {
    match kind {
        CompletionKind::Commit => participant.commit(txn_id).await,
        CompletionKind::Rollback => participant.rollback(txn_id).await,
    }
}
