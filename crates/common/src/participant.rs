//! The participant contract
//!
//! Every external service enlisted in a transaction implements
//! [`Participant`]. The coordinator only ever talks to participants through
//! this trait; business logic (debits, reservations, ...) lives in adapters
//! outside the core.

use crate::TransactionId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable name of a participant, persisted in the transaction log so
/// recovery can find the participant again after a restart
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Errors a participant can report from any phase
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParticipantError {
    #[error("Participant unavailable: {0}")]
    Unavailable(String),

    #[error("Participant rejected request: {0}")]
    Rejected(String),

    #[error("Participant call timed out")]
    Timeout,

    #[error("Participant error: {0}")]
    Other(String),
}

impl ParticipantError {
    /// Whether retrying the same call could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ParticipantError::Unavailable(_) | ParticipantError::Timeout
        )
    }
}

/// A service that takes part in two-phase commit
///
/// Implementations must uphold:
/// - `prepare` answers within a bounded time and only reserves resources;
///   returning `Ok(true)` is a durable promise to honor a later `commit`.
/// - `commit` is idempotent and must eventually succeed after a yes vote.
/// - `rollback` is idempotent and safe to call even if `prepare` never ran.
#[async_trait]
pub trait Participant: Send + Sync {
    /// Name used for logging and for recovery lookup
    fn id(&self) -> &ParticipantId;

    /// Vote on the transaction (`true` = ready to commit)
    async fn prepare(&self, txn_id: TransactionId) -> Result<bool, ParticipantError>;

    /// Make the prepared changes permanent
    async fn commit(&self, txn_id: TransactionId) -> Result<(), ParticipantError>;

    /// Release anything reserved for the transaction
    async fn rollback(&self, txn_id: TransactionId) -> Result<(), ParticipantError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct AlwaysYes {
        id: ParticipantId,
    }

    #[async_trait]
    impl Participant for AlwaysYes {
        fn id(&self) -> &ParticipantId {
            &self.id
        }

        async fn prepare(&self, _txn_id: TransactionId) -> Result<bool, ParticipantError> {
            Ok(true)
        }

        async fn commit(&self, _txn_id: TransactionId) -> Result<(), ParticipantError> {
            Ok(())
        }

        async fn rollback(&self, _txn_id: TransactionId) -> Result<(), ParticipantError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_trait_object_dispatch() {
        let participant: Arc<dyn Participant> = Arc::new(AlwaysYes {
            id: ParticipantId::from("ledger"),
        });

        assert_eq!(participant.id().as_str(), "ledger");
        assert!(participant.prepare(TransactionId::new()).await.unwrap());
    }

    #[test]
    fn test_transient_classification() {
        assert!(ParticipantError::Timeout.is_transient());
        assert!(ParticipantError::Unavailable("down".into()).is_transient());
        assert!(!ParticipantError::Rejected("no".into()).is_transient());
        assert!(!ParticipantError::Other("boom".into()).is_transient());
    }
}
