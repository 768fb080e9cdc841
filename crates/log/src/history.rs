//! Folding raw log records into per-transaction histories

use crate::record::{Decision, LogRecord, Phase};
use std::collections::HashMap;
use tpc_common::{ParticipantId, Timestamp, TransactionId};

/// What recovery must do with a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Already finished, nothing to do
    None,
    /// Prepared decision logged, re-drive commit
    Commit,
    /// Anything else, re-drive rollback
    Rollback,
}

/// Everything the log knows about one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionHistory {
    pub txn_id: TransactionId,
    /// Phase of the last record seen for this transaction
    pub last_phase: Phase,
    /// Most recent decision recorded, if any
    pub decision: Option<Decision>,
    /// Every participant the log has seen, in enlistment order
    pub participants: Vec<ParticipantId>,
    /// Participants reported as failed by the last terminal record
    pub failed: Vec<ParticipantId>,
    /// Timestamp of the first record
    pub started_at: Timestamp,
    /// Timestamp of the last record
    pub updated_at: Timestamp,
}

impl TransactionHistory {
    fn from_record(record: &LogRecord) -> Self {
        let mut history = Self {
            txn_id: record.txn_id,
            last_phase: record.phase,
            decision: None,
            participants: Vec::new(),
            failed: Vec::new(),
            started_at: record.timestamp,
            updated_at: record.timestamp,
        };
        history.apply(record);
        history
    }

    fn apply(&mut self, record: &LogRecord) {
        // A setup record never moves a decided transaction backwards
        if record.phase.is_setup() && !self.last_phase.is_setup() {
            return;
        }

        self.last_phase = record.phase;
        self.updated_at = record.timestamp;

        if let Some(decision) = record.decision {
            self.decision = Some(decision);
        }

        if let Some(participant) = &record.participant {
            self.add_participant(participant);
        }
        for participant in &record.participants {
            self.add_participant(participant);
        }

        if record.phase.is_terminal() {
            self.failed = record.failed.clone();
        }
    }

    fn add_participant(&mut self, participant: &ParticipantId) {
        if !self.participants.contains(participant) {
            self.participants.push(participant.clone());
        }
    }

    /// Whether the last record is terminal
    pub fn is_complete(&self) -> bool {
        self.last_phase.is_terminal()
    }

    /// Action recovery takes for this transaction
    pub fn recovery_action(&self) -> RecoveryAction {
        if self.is_complete() {
            return RecoveryAction::None;
        }

        match (self.last_phase, self.decision) {
            (Phase::Decide, Some(Decision::Prepared)) => RecoveryAction::Commit,
            _ => RecoveryAction::Rollback,
        }
    }
}

/// Group records by transaction, preserving first-seen order
pub fn fold(records: &[LogRecord]) -> Vec<TransactionHistory> {
    let mut index: HashMap<TransactionId, usize> = HashMap::new();
    let mut histories: Vec<TransactionHistory> = Vec::new();

    for record in records {
        match index.get(&record.txn_id) {
            Some(&position) => histories[position].apply(record),
            None => {
                index.insert(record.txn_id, histories.len());
                histories.push(TransactionHistory::from_record(record));
            }
        }
    }

    histories
}

/// Histories whose last record is not terminal
pub fn incomplete(records: &[LogRecord]) -> Vec<TransactionHistory> {
    fold(records)
        .into_iter()
        .filter(|history| !history.is_complete())
        .collect()
}

/// History of a single transaction, if the log mentions it
pub fn history_of(records: &[LogRecord], txn_id: TransactionId) -> Option<TransactionHistory> {
    let mut matching = records.iter().filter(|record| record.txn_id == txn_id);
    let first = matching.next()?;

    let mut history = TransactionHistory::from_record(first);
    for record in matching {
        history.apply(record);
    }
    Some(history)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(name: &str) -> ParticipantId {
        ParticipantId::from(name)
    }

    #[test]
    fn test_committed_transaction_is_complete() {
        let txn = TransactionId::new();
        let records = vec![
            LogRecord::begin(txn),
            LogRecord::enlist(txn, pid("a")),
            LogRecord::decide(txn, Decision::Prepared, vec![pid("a")]),
            LogRecord::commit(txn, vec![]),
        ];

        let histories = fold(&records);
        assert_eq!(histories.len(), 1);
        assert!(histories[0].is_complete());
        assert_eq!(histories[0].recovery_action(), RecoveryAction::None);
        assert!(incomplete(&records).is_empty());
    }

    #[test]
    fn test_prepared_decision_recovers_to_commit() {
        let txn = TransactionId::new();
        let records = vec![
            LogRecord::begin(txn),
            LogRecord::enlist(txn, pid("a")),
            LogRecord::enlist(txn, pid("b")),
            LogRecord::decide(txn, Decision::Prepared, vec![pid("a"), pid("b")]),
        ];

        let pending = incomplete(&records);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].recovery_action(), RecoveryAction::Commit);
        assert_eq!(pending[0].participants, vec![pid("a"), pid("b")]);
    }

    #[test]
    fn test_undecided_and_aborted_recover_to_rollback() {
        let undecided = TransactionId::new();
        let aborted = TransactionId::new();
        let records = vec![
            LogRecord::begin(undecided),
            LogRecord::enlist(undecided, pid("a")),
            LogRecord::begin(aborted),
            LogRecord::decide(aborted, Decision::Abort, vec![pid("b")]),
        ];

        let pending = incomplete(&records);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].txn_id, undecided);
        assert_eq!(pending[0].recovery_action(), RecoveryAction::Rollback);
        assert_eq!(pending[1].txn_id, aborted);
        assert_eq!(pending[1].recovery_action(), RecoveryAction::Rollback);
    }

    #[test]
    fn test_interleaved_transactions_keep_their_own_participants() {
        let first = TransactionId::new();
        let second = TransactionId::new();
        let records = vec![
            LogRecord::begin(first),
            LogRecord::begin(second),
            LogRecord::enlist(second, pid("x")),
            LogRecord::enlist(first, pid("a")),
            LogRecord::enlist(first, pid("a")),
            LogRecord::rollback(second, vec![pid("x")]),
        ];

        let histories = fold(&records);
        assert_eq!(histories[0].participants, vec![pid("a")]);
        assert_eq!(histories[1].participants, vec![pid("x")]);
        assert_eq!(histories[1].failed, vec![pid("x")]);
        assert!(histories[1].is_complete());
    }

    #[test]
    fn test_setup_records_after_decision_are_ignored() {
        let committed = TransactionId::new();
        let decided = TransactionId::new();
        let records = vec![
            LogRecord::begin(committed),
            LogRecord::enlist(committed, pid("a")),
            LogRecord::decide(committed, Decision::Prepared, vec![pid("a")]),
            LogRecord::commit(committed, vec![]),
            LogRecord::enlist(committed, pid("b")),
            LogRecord::begin(decided),
            LogRecord::decide(decided, Decision::Prepared, vec![pid("c")]),
            LogRecord::enlist(decided, pid("d")),
        ];

        let histories = fold(&records);
        assert!(histories[0].is_complete());
        assert_eq!(histories[0].last_phase, Phase::Commit);
        assert_eq!(histories[0].participants, vec![pid("a")]);
        assert_eq!(histories[1].recovery_action(), RecoveryAction::Commit);
        assert_eq!(histories[1].participants, vec![pid("c")]);

        let pending = incomplete(&records);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].txn_id, decided);
    }

    #[test]
    fn test_history_of() {
        let txn = TransactionId::new();
        let other = TransactionId::new();
        let records = vec![
            LogRecord::begin(other),
            LogRecord::begin(txn),
            LogRecord::decide(txn, Decision::Abort, vec![]),
        ];

        let history = history_of(&records, txn).unwrap();
        assert_eq!(history.last_phase, Phase::Decide);
        assert_eq!(history.decision, Some(Decision::Abort));
        assert!(history_of(&records, TransactionId::new()).is_none());
    }
}
