//! Prepare phase of 2PC

use super::append_record;
use crate::error::Result;
use crate::registry::TransactionEntry;
use crate::transaction::{AbortReason, TransactionStatus, Vote};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tpc_common::{Participant, ParticipantError, ParticipantId, TransactionId};
use tpc_log::{Decision, LogRecord, TransactionLog};

/// Fans out `prepare` to every participant and computes the global decision
pub struct PrepareExecutor {
    /// Shared deadline for all votes of one transaction
    timeout: Duration,

    log: Arc<dyn TransactionLog>,
}

impl PrepareExecutor {
    pub fn new(timeout: Duration, log: Arc<dyn TransactionLog>) -> Self {
        Self { timeout, log }
    }

    /// Run the prepare phase for a pending transaction
    ///
    /// Leaves the transaction in `Prepared` or `Aborting` with every vote
    /// filled in, and logs the decision before returning.
    pub async fn run(&self, entry: &TransactionEntry) -> Result<Decision> {
        let txn_id = entry.id();

        let participants = entry.update(|txn| {
            txn.transition(TransactionStatus::Preparing)?;
            Ok::<_, crate::error::CoordinatorError>(txn.participants().to_vec())
        })?;
        let participant_ids: Vec<ParticipantId> =
            participants.iter().map(|p| p.id().clone()).collect();

        let votes = if participants.is_empty() {
            tracing::info!(%txn_id, "No participants enlisted, aborting");
            HashMap::new()
        } else {
            self.collect_votes(txn_id, &participants).await
        };

        let mut decision = if !participants.is_empty() && votes.values().all(Vote::is_commit) {
            Decision::Prepared
        } else {
            Decision::Abort
        };

        // The decision must be durable before anyone hears about it
        if let Err(e) = append_record(
            &self.log,
            LogRecord::decide(txn_id, decision, participant_ids.clone()),
        )
        .await
        {
            tracing::error!(%txn_id, error = %e, "Failed to log prepare decision");

            if decision == Decision::Prepared {
                decision = Decision::Abort;
                if let Err(e) =
                    append_record(&self.log, LogRecord::decide(txn_id, decision, participant_ids))
                        .await
                {
                    tracing::error!(%txn_id, error = %e, "Failed to log downgraded abort decision");
                }
            }
        }

        entry.update(|txn| {
            txn.record_votes(votes);
            txn.transition(match decision {
                Decision::Prepared => TransactionStatus::Prepared,
                Decision::Abort => TransactionStatus::Aborting,
            })
        })?;

        tracing::info!(%txn_id, ?decision, "Prepare phase decided");
        Ok(decision)
    }

    /// Ask every participant concurrently and wait until all voted yes,
    /// one voted no, or the deadline passed
    async fn collect_votes(
        &self,
        txn_id: TransactionId,
        participants: &[Arc<dyn Participant>],
    ) -> HashMap<ParticipantId, Vote> {
        let deadline = Instant::now() + self.timeout;
        let (tx, mut rx) = mpsc::channel(participants.len());

        for (index, participant) in participants.iter().enumerate() {
            let participant = participant.clone();
            let tx = tx.clone();

            // Calls are not cancelled at the deadline; a late answer finds
            // the receiver gone and is dropped
            tokio::spawn(async move {
                let result = participant.prepare(txn_id).await;
                let _ = tx.send((index, result)).await;
            });
        }
        drop(tx);

        let mut collected: Vec<Vote> = vec![Vote::Unknown; participants.len()];
        let mut outstanding = participants.len();
        let mut unanswered = AbortReason::Skipped;

        while outstanding > 0 {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some((index, result))) => {
                    outstanding -= 1;

                    let vote = Self::vote_from(result);
                    tracing::debug!(
                        %txn_id,
                        participant = %participants[index].id(),
                        ?vote,
                        "Received prepare vote"
                    );

                    let abort = !vote.is_commit();
                    collected[index] = vote;
                    if abort {
                        break;
                    }
                }
                Ok(None) => {
                    // Every task is gone but some never answered (panicked)
                    unanswered = AbortReason::Failed("prepare task ended without a vote".into());
                    break;
                }
                Err(_) => {
                    tracing::warn!(
                        %txn_id,
                        outstanding,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Prepare deadline exceeded"
                    );
                    unanswered = AbortReason::Timeout;
                    break;
                }
            }
        }

        participants
            .iter()
            .zip(collected)
            .map(|(participant, vote)| {
                let vote = match vote {
                    Vote::Unknown => Vote::Abort(unanswered.clone()),
                    vote => vote,
                };
                (participant.id().clone(), vote)
            })
            .collect()
    }

    fn vote_from(result: std::result::Result<bool, ParticipantError>) -> Vote {
        match result {
            Ok(true) => Vote::Commit,
            Ok(false) => Vote::Abort(AbortReason::Declined),
            Err(ParticipantError::Timeout) => Vote::Abort(AbortReason::Timeout),
            Err(e) => Vote::Abort(AbortReason::Failed(e.to_string())),
        }
    }
}
