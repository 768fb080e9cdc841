//! Transaction state and the 2PC state machine
//!
//! ```text
//! Pending -> Preparing -> Prepared -> Committing -> Committed
//!                |
//!                +------> Aborting -> Aborted
//! ```
//!
//! Status only ever moves forward along these edges.

use crate::error::{CoordinatorError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tpc_common::{Participant, ParticipantId, Timestamp, TransactionId};

/// Transaction state in the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    /// Created by `begin`, accepting enlistments
    Pending,
    /// Prepare calls are outstanding
    Preparing,
    /// Every participant voted yes and the decision is logged
    Prepared,
    /// Commit calls are outstanding
    Committing,
    /// Transaction has been committed
    Committed,
    /// Rollback calls are outstanding
    Aborting,
    /// Transaction has been aborted
    Aborted,
}

impl TransactionStatus {
    /// No participant calls can happen after this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Committed | TransactionStatus::Aborted)
    }

    /// Whether `next` is a legal single step from this state
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;

        matches!(
            (self, next),
            (Pending, Preparing)
                | (Preparing, Prepared)
                | (Preparing, Aborting)
                | (Prepared, Committing)
                | (Committing, Committed)
                | (Aborting, Aborted)
        )
    }

    /// Final outcome, if the state is terminal
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            TransactionStatus::Committed => Some(Outcome::Committed),
            TransactionStatus::Aborted => Some(Outcome::Aborted),
            _ => None,
        }
    }
}

/// Definite result of driving a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Committed,
    Aborted,
}

impl Outcome {
    pub fn status(&self) -> TransactionStatus {
        match self {
            Outcome::Committed => TransactionStatus::Committed,
            Outcome::Aborted => TransactionStatus::Aborted,
        }
    }
}

/// Why a participant counts as voting abort
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Participant answered `false`
    Declined,
    /// No answer before the prepare deadline
    Timeout,
    /// Participant call failed
    Failed(String),
    /// Not awaited because another participant had already aborted
    Skipped,
}

/// Prepare vote from a participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Vote {
    Unknown,
    Commit,
    Abort(AbortReason),
}

impl Vote {
    pub fn is_commit(&self) -> bool {
        matches!(self, Vote::Commit)
    }
}

/// A distributed transaction as tracked by the registry
#[derive(Clone)]
pub struct Transaction {
    id: TransactionId,
    participants: Vec<Arc<dyn Participant>>,
    status: TransactionStatus,
    votes: HashMap<ParticipantId, Vote>,
    created_at: Timestamp,
}

impl Transaction {
    /// Create a new pending transaction
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            participants: Vec::new(),
            status: TransactionStatus::Pending,
            votes: HashMap::new(),
            created_at: Timestamp::now(),
        }
    }

    /// Rebuild a transaction from the log so recovery can re-drive it
    pub(crate) fn recovered(
        id: TransactionId,
        participants: Vec<Arc<dyn Participant>>,
        status: TransactionStatus,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            participants,
            status,
            votes: HashMap::new(),
            created_at,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn participants(&self) -> &[Arc<dyn Participant>] {
        &self.participants
    }

    /// Participant names in enlistment order
    pub fn participant_ids(&self) -> Vec<ParticipantId> {
        self.participants.iter().map(|p| p.id().clone()).collect()
    }

    /// Vote recorded for a participant (`Unknown` until prepare finishes)
    pub fn vote(&self, participant: &ParticipantId) -> Vote {
        self.votes.get(participant).cloned().unwrap_or(Vote::Unknown)
    }

    pub fn votes(&self) -> &HashMap<ParticipantId, Vote> {
        &self.votes
    }

    /// Add a participant; returns false if one with the same id is present
    pub(crate) fn enlist(&mut self, participant: Arc<dyn Participant>) -> Result<bool> {
        if self.status != TransactionStatus::Pending {
            return Err(CoordinatorError::InvalidState {
                txn_id: self.id,
                state: self.status,
                operation: "enlist in",
            });
        }

        if self.participants.iter().any(|p| p.id() == participant.id()) {
            return Ok(false);
        }

        self.participants.push(participant);
        Ok(true)
    }

    /// Drop a participant again while still pending
    pub(crate) fn withdraw(&mut self, participant: &ParticipantId) {
        if self.status == TransactionStatus::Pending {
            self.participants.retain(|p| p.id() != participant);
        }
    }

    /// Move one step forward in the state machine
    pub(crate) fn transition(&mut self, next: TransactionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoordinatorError::InvalidState {
                txn_id: self.id,
                state: self.status,
                operation: "advance",
            });
        }

        tracing::debug!(txn_id = %self.id, from = ?self.status, to = ?next, "Transaction state change");
        self.status = next;
        Ok(())
    }

    /// Record the full vote set gathered by the prepare phase
    pub(crate) fn record_votes(&mut self, votes: HashMap<ParticipantId, Vote>) {
        self.votes = votes;
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("participants", &self.participant_ids())
            .field("status", &self.status)
            .field("votes", &self.votes)
            .field("created_at", &self.created_at)
            .finish()
    }
}
