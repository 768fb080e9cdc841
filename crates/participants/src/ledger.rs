//! Account ledger participant
//!
//! Balances are integers in the smallest currency unit. A transaction stages
//! postings (positive credit, negative debit); prepare votes no if any
//! account would go negative once every held debit is counted.

use crate::Resolution;
use crate::error::{Result, StagingError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tpc_common::{Participant, ParticipantError, ParticipantId, TransactionId};

#[derive(Debug, Clone)]
struct Posting {
    account: String,
    amount: i64,
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<String, i64>,

    /// Postings not yet voted on
    staged: HashMap<TransactionId, Vec<Posting>>,

    /// Postings promised by a yes vote
    held: HashMap<TransactionId, Vec<Posting>>,

    resolved: HashMap<TransactionId, Resolution>,
}

impl LedgerState {
    /// Balance minus every debit held by a prepared transaction
    fn available(&self, account: &str) -> i64 {
        let balance = self.balances.get(account).copied().unwrap_or(0);
        let held_debits: i64 = self
            .held
            .values()
            .flatten()
            .filter(|p| p.account == account && p.amount < 0)
            .map(|p| p.amount)
            .sum();
        balance + held_debits
    }

    fn net_by_account(postings: &[Posting]) -> HashMap<&str, i64> {
        let mut net: HashMap<&str, i64> = HashMap::new();
        for posting in postings {
            *net.entry(posting.account.as_str()).or_default() += posting.amount;
        }
        net
    }
}

/// Participant holding account balances
pub struct LedgerParticipant {
    id: ParticipantId,
    state: Mutex<LedgerState>,
}

impl LedgerParticipant {
    pub fn new(id: impl Into<ParticipantId>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Open an account with a starting balance
    pub fn with_account(self, account: &str, balance: i64) -> Self {
        self.state.lock().balances.insert(account.to_string(), balance);
        self
    }

    /// Committed balance of an account
    pub fn balance(&self, account: &str) -> Option<i64> {
        self.state.lock().balances.get(account).copied()
    }

    /// Stage a credit (positive) or debit (negative) for `txn_id`
    pub fn stage(&self, txn_id: TransactionId, account: &str, amount: i64) -> Result<()> {
        let mut state = self.state.lock();

        if !state.balances.contains_key(account) {
            return Err(StagingError::UnknownKey(account.to_string()));
        }
        if state.held.contains_key(&txn_id) || state.resolved.contains_key(&txn_id) {
            return Err(StagingError::Closed(txn_id));
        }

        state.staged.entry(txn_id).or_default().push(Posting {
            account: account.to_string(),
            amount,
        });
        Ok(())
    }

    /// Stage a transfer between two accounts of this ledger
    pub fn transfer(&self, txn_id: TransactionId, from: &str, to: &str, amount: i64) -> Result<()> {
        self.stage(txn_id, from, -amount)?;
        self.stage(txn_id, to, amount)
    }
}

#[async_trait]
impl Participant for LedgerParticipant {
    fn id(&self) -> &ParticipantId {
        &self.id
    }

    async fn prepare(&self, txn_id: TransactionId) -> std::result::Result<bool, ParticipantError> {
        let mut state = self.state.lock();

        if state.held.contains_key(&txn_id) {
            return Ok(true);
        }
        if let Some(resolution) = state.resolved.get(&txn_id) {
            return Ok(*resolution == Resolution::Committed);
        }

        let postings = state.staged.remove(&txn_id).unwrap_or_default();

        let short = LedgerState::net_by_account(&postings)
            .into_iter()
            .find(|(account, net)| state.available(account) + net < 0)
            .map(|(account, _)| account.to_string());

        if let Some(account) = short {
            tracing::info!(participant = %self.id, %txn_id, %account, "Insufficient funds, voting no");
            state.resolved.insert(txn_id, Resolution::RolledBack);
            return Ok(false);
        }

        state.held.insert(txn_id, postings);
        tracing::debug!(participant = %self.id, %txn_id, "Postings held");
        Ok(true)
    }

    async fn commit(&self, txn_id: TransactionId) -> std::result::Result<(), ParticipantError> {
        let mut state = self.state.lock();

        match state.resolved.get(&txn_id) {
            Some(Resolution::Committed) => return Ok(()),
            Some(Resolution::RolledBack) => {
                return Err(ParticipantError::Rejected(format!(
                    "transaction {} was rolled back",
                    txn_id
                )));
            }
            None => {}
        }

        let postings = state.held.remove(&txn_id).unwrap_or_default();
        for posting in &postings {
            *state.balances.entry(posting.account.clone()).or_default() += posting.amount;
        }
        state.resolved.insert(txn_id, Resolution::Committed);

        tracing::debug!(participant = %self.id, %txn_id, postings = postings.len(), "Postings applied");
        Ok(())
    }

    async fn rollback(&self, txn_id: TransactionId) -> std::result::Result<(), ParticipantError> {
        let mut state = self.state.lock();

        if state.resolved.get(&txn_id) == Some(&Resolution::Committed) {
            return Err(ParticipantError::Rejected(format!(
                "transaction {} was committed",
                txn_id
            )));
        }

        state.staged.remove(&txn_id);
        state.held.remove(&txn_id);
        state.resolved.insert(txn_id, Resolution::RolledBack);
        Ok(())
    }
}
