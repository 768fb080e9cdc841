//! Core coordinator implementation

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::executor::{CompletionExecutor, PrepareExecutor};
use crate::recovery::{ParticipantDirectory, RecoveryManager, RecoverySummary};
use crate::registry::{TransactionEntry, TransactionRegistry};
use crate::transaction::{Outcome, Transaction, TransactionStatus};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tpc_common::{Participant, TransactionId};
use tpc_log::{Decision, LogRecord, Phase, TransactionHistory, TransactionLog};

/// Two-phase commit transaction coordinator
pub struct Coordinator {
    config: CoordinatorConfig,

    /// Transactions that have not reached a terminal state yet
    registry: Arc<TransactionRegistry>,

    /// Durable record of every state change
    log: Arc<dyn TransactionLog>,

    prepare: PrepareExecutor,
    completion: Arc<CompletionExecutor>,

    /// Outcomes of transactions evicted from the registry
    retired: Mutex<LruCache<TransactionId, Outcome>>,

    /// Cleared by `shutdown`
    running: AtomicBool,
}

impl Coordinator {
    /// Create a coordinator over `log` without running recovery
    pub fn new(config: CoordinatorConfig, log: Arc<dyn TransactionLog>) -> Self {
        let capacity =
            NonZeroUsize::new(config.completed_cache_capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            prepare: PrepareExecutor::new(config.prepare_timeout, log.clone()),
            completion: Arc::new(CompletionExecutor::new(&config, log.clone())),
            registry: Arc::new(TransactionRegistry::new()),
            retired: Mutex::new(LruCache::new(capacity)),
            running: AtomicBool::new(true),
            config,
            log,
        }
    }

    /// Create a coordinator and finish whatever the log says was left
    /// incomplete by a previous run
    pub async fn start(
        config: CoordinatorConfig,
        log: Arc<dyn TransactionLog>,
        directory: &dyn ParticipantDirectory,
    ) -> Result<Self> {
        let coordinator = Self::new(config, log);
        let summary = coordinator.recover(directory).await?;

        tracing::info!(recovered = summary.total(), "Coordinator started");
        Ok(coordinator)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Transactions currently tracked in memory
    pub fn registry(&self) -> &TransactionRegistry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Begin a new distributed transaction
    pub fn begin(&self) -> Result<TransactionId> {
        self.ensure_running()?;

        let txn_id = self.registry.begin();
        if let Err(e) = self.log.append(LogRecord::begin(txn_id)) {
            self.registry.discard(txn_id);
            return Err(e.into());
        }

        tracing::debug!(%txn_id, "Began transaction");
        Ok(txn_id)
    }

    /// Add a participant to a pending transaction
    ///
    /// Enlisting the same participant id twice has no further effect.
    pub fn enlist(&self, txn_id: TransactionId, participant: Arc<dyn Participant>) -> Result<()> {
        self.ensure_running()?;

        let entry = self.registry.entry(txn_id)?;
        let participant_id = participant.id().clone();

        // The record is written under the transaction lock so it always lands
        // before the prepare phase can start
        let added = entry.update(|txn| -> Result<bool> {
            if !txn.enlist(participant)? {
                return Ok(false);
            }

            if let Err(e) = self
                .log
                .append(LogRecord::enlist(txn_id, participant_id.clone()))
            {
                txn.withdraw(&participant_id);
                return Err(e.into());
            }
            Ok(true)
        })?;

        if added {
            tracing::debug!(%txn_id, participant = %participant_id, "Enlisted participant");
        }
        Ok(())
    }

    /// Drive a transaction through both phases and report its outcome
    ///
    /// Calling it again for a finished transaction returns the same outcome
    /// without contacting any participant.
    pub async fn execute_transaction(&self, txn_id: TransactionId) -> Result<Outcome> {
        if let Some(outcome) = self.retired_outcome(txn_id) {
            return Ok(outcome);
        }

        let entry = match self.registry.entry(txn_id) {
            Ok(entry) => entry,
            Err(CoordinatorError::UnknownTransaction(_)) => {
                return self.outcome_from_log(txn_id);
            }
            Err(e) => return Err(e),
        };

        self.ensure_running()?;
        self.drive(&entry).await
    }

    /// Current status of a transaction, whether live, retired or only logged
    pub fn get_status(&self, txn_id: TransactionId) -> Result<TransactionStatus> {
        if let Ok(entry) = self.registry.entry(txn_id) {
            return Ok(entry.status());
        }

        if let Some(outcome) = self.retired_outcome(txn_id) {
            return Ok(outcome.status());
        }

        match self.log.history(txn_id)? {
            Some(history) => Ok(status_from_history(&history)),
            None => Err(CoordinatorError::UnknownTransaction(txn_id)),
        }
    }

    /// Snapshot of a transaction that is still registered
    pub fn get(&self, txn_id: TransactionId) -> Result<Transaction> {
        self.registry.get(txn_id)
    }

    /// Finish every incomplete transaction recorded in the log
    pub async fn recover(&self, directory: &dyn ParticipantDirectory) -> Result<RecoverySummary> {
        let manager = RecoveryManager::new(
            self.log.clone(),
            self.registry.clone(),
            self.completion.clone(),
        );
        let summary = manager.recover(directory).await?;

        let mut retired = self.retired.lock();
        for (txn_id, outcome) in summary.outcomes() {
            retired.put(txn_id, outcome);
        }

        Ok(summary)
    }

    /// Stop accepting new work
    ///
    /// Runs already in flight finish; everything else is left to recovery.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            tracing::info!(
                in_flight = self.registry.len(),
                "Coordinator shutting down"
            );
        }
    }

    /// Replace this instance with a fresh one over the same log, as after a
    /// process restart
    pub async fn restart(self, directory: &dyn ParticipantDirectory) -> Result<Self> {
        self.shutdown();
        let Self { config, log, .. } = self;

        Self::start(config, log, directory).await
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(CoordinatorError::ShutDown)
        }
    }

    fn retired_outcome(&self, txn_id: TransactionId) -> Option<Outcome> {
        self.retired.lock().get(&txn_id).copied()
    }

    /// Run whichever phases are still missing for a registered transaction
    async fn drive(&self, entry: &TransactionEntry) -> Result<Outcome> {
        let txn_id = entry.id();
        let _driver = entry.acquire_driver().await;

        // Another caller may have finished it while we waited
        if let Some(outcome) = entry.status().outcome() {
            return Ok(outcome);
        }

        if entry.status() == TransactionStatus::Pending {
            self.prepare.run(entry).await?;
        }

        let report = match entry.status() {
            TransactionStatus::Prepared | TransactionStatus::Committing => {
                self.completion.run_commit(entry).await
            }
            _ => self.completion.run_rollback(entry).await,
        };

        let outcome = report
            .status
            .outcome()
            .ok_or(CoordinatorError::InvalidState {
                txn_id,
                state: report.status,
                operation: "execute",
            })?;

        self.retire(txn_id, outcome);
        Ok(outcome)
    }

    /// Move a finished transaction from the registry into the outcome cache
    fn retire(&self, txn_id: TransactionId, outcome: Outcome) {
        self.retired.lock().put(txn_id, outcome);

        if let Err(e) = self.registry.remove(txn_id) {
            tracing::error!(%txn_id, error = %e, "Failed to retire transaction");
        }
    }

    /// Outcome of a transaction this instance no longer (or never) tracked
    fn outcome_from_log(&self, txn_id: TransactionId) -> Result<Outcome> {
        let history = self
            .log
            .history(txn_id)?
            .ok_or(CoordinatorError::UnknownTransaction(txn_id))?;

        let status = status_from_history(&history);
        match status.outcome() {
            Some(outcome) => {
                self.retired.lock().put(txn_id, outcome);
                Ok(outcome)
            }
            None => Err(CoordinatorError::InvalidState {
                txn_id,
                state: status,
                operation: "execute unrecovered",
            }),
        }
    }
}

/// Last state a logged transaction is known to have reached
fn status_from_history(history: &TransactionHistory) -> TransactionStatus {
    match (history.last_phase, history.decision) {
        (Phase::Begin | Phase::Enlist, _) => TransactionStatus::Pending,
        (Phase::Decide, Some(Decision::Prepared)) => TransactionStatus::Prepared,
        (Phase::Decide, _) => TransactionStatus::Aborting,
        (Phase::Commit, _) => TransactionStatus::Committed,
        (Phase::Rollback, _) => TransactionStatus::Aborted,
    }
}
