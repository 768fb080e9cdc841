//! Transaction registry
//!
//! In-memory map from transaction id to transaction state. The top-level map
//! sits behind a short-held lock used only for insert/lookup/remove; each
//! transaction carries its own lock for field updates plus an async driver
//! gate that serializes whole executions of the same transaction.

use crate::error::{CoordinatorError, Result};
use crate::transaction::{Transaction, TransactionStatus};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tpc_common::{Participant, TransactionId};

/// One registered transaction
pub struct TransactionEntry {
    id: TransactionId,

    /// Transaction fields, mutated under a short-held lock
    state: Mutex<Transaction>,

    /// Held for the duration of a prepare/commit/rollback run
    driver: AsyncMutex<()>,
}

impl TransactionEntry {
    fn new(transaction: Transaction) -> Self {
        Self {
            id: transaction.id(),
            state: Mutex::new(transaction),
            driver: AsyncMutex::new(()),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn status(&self) -> TransactionStatus {
        self.state.lock().status()
    }

    /// Consistent copy of the transaction
    pub fn snapshot(&self) -> Transaction {
        self.state.lock().clone()
    }

    /// Run `f` with exclusive access to the transaction fields
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut Transaction) -> R) -> R {
        f(&mut *self.state.lock())
    }

    /// Wait until no other task is driving this transaction
    pub(crate) async fn acquire_driver(&self) -> AsyncMutexGuard<'_, ()> {
        self.driver.lock().await
    }
}

/// Registry of active transactions
#[derive(Default)]
pub struct TransactionRegistry {
    transactions: RwLock<HashMap<TransactionId, Arc<TransactionEntry>>>,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh id and register a pending transaction
    pub fn begin(&self) -> TransactionId {
        let transaction = Transaction::new(TransactionId::new());
        let id = transaction.id();
        self.insert(transaction);
        id
    }

    /// Register an existing transaction (used by recovery)
    pub(crate) fn insert(&self, transaction: Transaction) -> Arc<TransactionEntry> {
        let entry = Arc::new(TransactionEntry::new(transaction));
        self.transactions
            .write()
            .insert(entry.id(), entry.clone());
        entry
    }

    /// Add a participant to a pending transaction
    ///
    /// Returns false if a participant with the same id was already enlisted.
    pub fn enlist(&self, txn_id: TransactionId, participant: Arc<dyn Participant>) -> Result<bool> {
        let entry = self.entry(txn_id)?;
        entry.update(|txn| txn.enlist(participant))
    }

    /// Snapshot of a registered transaction
    pub fn get(&self, txn_id: TransactionId) -> Result<Transaction> {
        Ok(self.entry(txn_id)?.snapshot())
    }

    /// Shared handle to a registered transaction
    pub fn entry(&self, txn_id: TransactionId) -> Result<Arc<TransactionEntry>> {
        self.transactions
            .read()
            .get(&txn_id)
            .cloned()
            .ok_or(CoordinatorError::UnknownTransaction(txn_id))
    }

    pub fn contains(&self, txn_id: TransactionId) -> bool {
        self.transactions.read().contains_key(&txn_id)
    }

    /// Evict a terminal transaction; removing an absent id is a no-op
    pub fn remove(&self, txn_id: TransactionId) -> Result<()> {
        let mut transactions = self.transactions.write();

        if let Some(entry) = transactions.get(&txn_id) {
            let status = entry.status();
            if !status.is_terminal() {
                return Err(CoordinatorError::InvalidState {
                    txn_id,
                    state: status,
                    operation: "remove",
                });
            }
            transactions.remove(&txn_id);
        }

        Ok(())
    }

    /// Forget a transaction regardless of its state
    pub(crate) fn discard(&self, txn_id: TransactionId) {
        self.transactions.write().remove(&txn_id);
    }

    /// Number of registered transactions
    pub fn len(&self) -> usize {
        self.transactions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.read().is_empty()
    }
}
