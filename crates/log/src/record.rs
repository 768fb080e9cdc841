//! Log record layout
//!
//! One record is written per phase transition. Records are never rewritten;
//! the last record for a transaction decides what recovery does with it.

use serde::{Deserialize, Serialize};
use tpc_common::{ParticipantId, Timestamp, TransactionId};

/// Phase transition recorded by a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Transaction allocated
    Begin,
    /// One participant added
    Enlist,
    /// Outcome of the prepare phase
    Decide,
    /// All commit calls finished (terminal)
    Commit,
    /// All rollback calls finished (terminal)
    Rollback,
}

impl Phase {
    /// Whether a transaction whose last record has this phase is finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Commit | Phase::Rollback)
    }

    /// Records written before the prepare phase starts
    pub fn is_setup(&self) -> bool {
        matches!(self, Phase::Begin | Phase::Enlist)
    }
}

/// Global decision of the prepare phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Every participant voted yes
    Prepared,
    /// At least one participant declined, timed out or failed
    Abort,
}

/// A single append-only log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub txn_id: TransactionId,
    pub phase: Phase,
    #[serde(default)]
    pub decision: Option<Decision>,
    /// Participant added by an `Enlist` record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<ParticipantId>,
    /// Full participant set, carried by `Decide` records
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<ParticipantId>,
    /// Participants that exhausted their retries, carried by terminal records
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<ParticipantId>,
    pub timestamp: Timestamp,
}

impl LogRecord {
    /// Bare record for a phase transition
    pub fn new(txn_id: TransactionId, phase: Phase, decision: Option<Decision>) -> Self {
        Self {
            txn_id,
            phase,
            decision,
            participant: None,
            participants: Vec::new(),
            failed: Vec::new(),
            timestamp: Timestamp::now(),
        }
    }

    pub fn begin(txn_id: TransactionId) -> Self {
        Self::new(txn_id, Phase::Begin, None)
    }

    pub fn enlist(txn_id: TransactionId, participant: ParticipantId) -> Self {
        Self {
            participant: Some(participant),
            ..Self::new(txn_id, Phase::Enlist, None)
        }
    }

    pub fn decide(
        txn_id: TransactionId,
        decision: Decision,
        participants: Vec<ParticipantId>,
    ) -> Self {
        Self {
            participants,
            ..Self::new(txn_id, Phase::Decide, Some(decision))
        }
    }

    pub fn commit(txn_id: TransactionId, failed: Vec<ParticipantId>) -> Self {
        Self {
            failed,
            ..Self::new(txn_id, Phase::Commit, None)
        }
    }

    pub fn rollback(txn_id: TransactionId, failed: Vec<ParticipantId>) -> Self {
        Self {
            failed,
            ..Self::new(txn_id, Phase::Rollback, None)
        }
    }
}
