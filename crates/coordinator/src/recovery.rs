//! Recovery manager for transactions interrupted by a coordinator crash
//!
//! Every transaction whose log history has no terminal record is re-driven:
//! a logged prepared decision is committed, anything else is rolled back.

use crate::error::Result;
use crate::executor::{CompletionExecutor, CompletionKind};
use crate::registry::TransactionRegistry;
use crate::transaction::{Outcome, Transaction, TransactionStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tpc_common::{Participant, ParticipantId, TransactionId};
use tpc_log::{RecoveryAction, TransactionHistory, TransactionLog};

/// Maps logged participant ids back to live participants
pub trait ParticipantDirectory: Send + Sync {
    fn resolve(&self, id: &ParticipantId) -> Option<Arc<dyn Participant>>;
}

impl ParticipantDirectory for HashMap<ParticipantId, Arc<dyn Participant>> {
    fn resolve(&self, id: &ParticipantId) -> Option<Arc<dyn Participant>> {
        self.get(id).cloned()
    }
}

/// Fixed set of participants keyed by their id
#[derive(Clone, Default)]
pub struct StaticDirectory {
    participants: HashMap<ParticipantId, Arc<dyn Participant>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant, replacing any with the same id
    pub fn with(mut self, participant: Arc<dyn Participant>) -> Self {
        self.register(participant);
        self
    }

    pub fn register(&mut self, participant: Arc<dyn Participant>) {
        self.participants
            .insert(participant.id().clone(), participant);
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

impl ParticipantDirectory for StaticDirectory {
    fn resolve(&self, id: &ParticipantId) -> Option<Arc<dyn Participant>> {
        self.participants.get(id).cloned()
    }
}

/// Transactions finished by one recovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoverySummary {
    pub committed: Vec<TransactionId>,
    pub rolled_back: Vec<TransactionId>,

    /// Subset of the above where some participant never acknowledged
    pub degraded: Vec<TransactionId>,
}

impl RecoverySummary {
    /// Number of transactions driven to a terminal state
    pub fn total(&self) -> usize {
        self.committed.len() + self.rolled_back.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Every recovered transaction with its outcome
    pub fn outcomes(&self) -> impl Iterator<Item = (TransactionId, Outcome)> + '_ {
        self.committed
            .iter()
            .map(|id| (*id, Outcome::Committed))
            .chain(self.rolled_back.iter().map(|id| (*id, Outcome::Aborted)))
    }
}

/// Manager for transaction recovery after coordinator failure
pub struct RecoveryManager {
    log: Arc<dyn TransactionLog>,
    registry: Arc<TransactionRegistry>,
    completion: Arc<CompletionExecutor>,
}

impl RecoveryManager {
    pub fn new(
        log: Arc<dyn TransactionLog>,
        registry: Arc<TransactionRegistry>,
        completion: Arc<CompletionExecutor>,
    ) -> Self {
        Self {
            log,
            registry,
            completion,
        }
    }

    /// Finish every incomplete transaction found in the log
    ///
    /// Running it again after it returned finds nothing left to do.
    pub async fn recover(&self, directory: &dyn ParticipantDirectory) -> Result<RecoverySummary> {
        let incomplete = self.log.scan_incomplete()?;
        let mut summary = RecoverySummary::default();

        if incomplete.is_empty() {
            tracing::debug!("No incomplete transactions in the log");
            return Ok(summary);
        }

        tracing::info!(count = incomplete.len(), "Recovering incomplete transactions");

        let mut pending = Vec::new();
        for history in incomplete {
            let txn_id = history.txn_id;

            // Live in this process; its own driver finishes it
            if self.registry.contains(txn_id) {
                tracing::debug!(%txn_id, "Skipping transaction that is still registered");
                continue;
            }

            let Some((kind, status)) = Self::plan(&history) else {
                continue;
            };

            let (participants, unresolved) = Self::resolve(&history, directory);
            if !unresolved.is_empty() {
                tracing::warn!(
                    %txn_id,
                    unresolved = ?unresolved,
                    "Participants missing from directory, they will be reported as failed"
                );
            }

            tracing::info!(%txn_id, ?kind, participants = history.participants.len(), "Re-driving transaction");

            let entry = self.registry.insert(Transaction::recovered(
                txn_id,
                participants,
                status,
                history.started_at,
            ));
            pending.push((entry, kind, unresolved));
        }

        // Each transaction is finished independently of the others
        let runs = pending.into_iter().map(|(entry, kind, unresolved)| async move {
            let report = {
                let _driver = entry.acquire_driver().await;
                self.completion.complete(&entry, kind, unresolved).await
            };

            if let Err(e) = self.registry.remove(entry.id()) {
                tracing::error!(txn_id = %entry.id(), error = %e, "Recovered transaction left registered");
            }
            report
        });

        for report in futures::future::join_all(runs).await {
            let txn_id = report.txn_id;
            match report.status.outcome() {
                Some(Outcome::Committed) => summary.committed.push(txn_id),
                Some(Outcome::Aborted) => summary.rolled_back.push(txn_id),
                None => continue,
            }
            if report.is_degraded() {
                summary.degraded.push(txn_id);
            }
        }

        tracing::info!(
            committed = summary.committed.len(),
            rolled_back = summary.rolled_back.len(),
            degraded = summary.degraded.len(),
            "Recovery finished"
        );

        Ok(summary)
    }

    /// Which decision to deliver, and the state to rebuild the transaction in
    fn plan(history: &TransactionHistory) -> Option<(CompletionKind, TransactionStatus)> {
        match history.recovery_action() {
            RecoveryAction::None => None,
            RecoveryAction::Commit => Some((CompletionKind::Commit, TransactionStatus::Prepared)),
            RecoveryAction::Rollback => {
                Some((CompletionKind::Rollback, TransactionStatus::Aborting))
            }
        }
    }

    fn resolve(
        history: &TransactionHistory,
        directory: &dyn ParticipantDirectory,
    ) -> (Vec<Arc<dyn Participant>>, Vec<ParticipantId>) {
        let mut participants = Vec::new();
        let mut unresolved = Vec::new();

        for id in &history.participants {
            match directory.resolve(id) {
                Some(participant) => participants.push(participant),
                None => unresolved.push(id.clone()),
            }
        }

        (participants, unresolved)
    }
}
