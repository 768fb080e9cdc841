//! Shared test participants

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tpc_common::{Participant, ParticipantError, ParticipantId, TransactionId};

/// How a scripted participant answers prepare
#[derive(Debug, Clone, Copy)]
pub enum Prepare {
    Yes,
    No,
    Fail,
    /// Vote yes after sleeping
    Delay(Duration),
}

/// Participant whose behavior is set up front and whose calls are counted
pub struct ScriptedParticipant {
    id: ParticipantId,
    prepare: Prepare,
    commit_failures: u32,
    rollback_failures: u32,

    /// While set, commit never returns
    stall_commits: AtomicBool,

    prepares: AtomicU32,
    commits: AtomicU32,
    rollbacks: AtomicU32,

    /// Transactions whose commit succeeded
    committed: Mutex<Vec<TransactionId>>,
    /// Transactions whose rollback succeeded
    rolled_back: Mutex<Vec<TransactionId>>,
}

impl ScriptedParticipant {
    pub fn new(name: &str) -> Self {
        Self {
            id: ParticipantId::from(name),
            prepare: Prepare::Yes,
            commit_failures: 0,
            rollback_failures: 0,
            stall_commits: AtomicBool::new(false),
            prepares: AtomicU32::new(0),
            commits: AtomicU32::new(0),
            rollbacks: AtomicU32::new(0),
            committed: Mutex::new(Vec::new()),
            rolled_back: Mutex::new(Vec::new()),
        }
    }

    pub fn voting(mut self, prepare: Prepare) -> Self {
        self.prepare = prepare;
        self
    }

    /// Fail the first `n` commit calls
    pub fn failing_commits(mut self, n: u32) -> Self {
        self.commit_failures = n;
        self
    }

    /// Fail the first `n` rollback calls
    pub fn failing_rollbacks(mut self, n: u32) -> Self {
        self.rollback_failures = n;
        self
    }

    pub fn stalling_commits(self) -> Self {
        self.stall_commits.store(true, Ordering::SeqCst);
        self
    }

    pub fn unstall(&self) {
        self.stall_commits.store(false, Ordering::SeqCst);
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn prepare_calls(&self) -> u32 {
        self.prepares.load(Ordering::SeqCst)
    }

    pub fn commit_calls(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollback_calls(&self) -> u32 {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn committed(&self) -> Vec<TransactionId> {
        self.committed.lock().clone()
    }

    pub fn rolled_back(&self) -> Vec<TransactionId> {
        self.rolled_back.lock().clone()
    }
}

#[async_trait]
impl Participant for ScriptedParticipant {
    fn id(&self) -> &ParticipantId {
        &self.id
    }

    async fn prepare(&self, _txn_id: TransactionId) -> Result<bool, ParticipantError> {
        self.prepares.fetch_add(1, Ordering::SeqCst);

        match self.prepare {
            Prepare::Yes => Ok(true),
            Prepare::No => Ok(false),
            Prepare::Fail => Err(ParticipantError::Unavailable("connection reset".into())),
            Prepare::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(true)
            }
        }
    }

    async fn commit(&self, txn_id: TransactionId) -> Result<(), ParticipantError> {
        let call = self.commits.fetch_add(1, Ordering::SeqCst) + 1;

        if self.stall_commits.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        if call <= self.commit_failures {
            return Err(ParticipantError::Unavailable(format!("commit attempt {}", call)));
        }

        self.committed.lock().push(txn_id);
        Ok(())
    }

    async fn rollback(&self, txn_id: TransactionId) -> Result<(), ParticipantError> {
        let call = self.rollbacks.fetch_add(1, Ordering::SeqCst) + 1;

        if call <= self.rollback_failures {
            return Err(ParticipantError::Unavailable(format!("rollback attempt {}", call)));
        }

        self.rolled_back.lock().push(txn_id);
        Ok(())
    }
}

/// Coerce for `enlist` and directories
pub fn dyn_participant(participant: &Arc<ScriptedParticipant>) -> Arc<dyn Participant> {
    participant.clone()
}
