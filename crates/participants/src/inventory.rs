//! Stock reservation participant

use crate::Resolution;
use crate::error::{Result, StagingError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tpc_common::{Participant, ParticipantError, ParticipantId, TransactionId};

#[derive(Default)]
struct InventoryState {
    stock: HashMap<String, u64>,
    staged: HashMap<TransactionId, HashMap<String, u64>>,
    reserved: HashMap<TransactionId, HashMap<String, u64>>,
    resolved: HashMap<TransactionId, Resolution>,
}

impl InventoryState {
    fn unreserved(&self, sku: &str) -> u64 {
        let on_hand = self.stock.get(sku).copied().unwrap_or(0);
        let reserved: u64 = self
            .reserved
            .values()
            .filter_map(|items| items.get(sku))
            .sum();
        on_hand.saturating_sub(reserved)
    }
}

/// Participant that reserves stock on prepare and ships it on commit
pub struct InventoryParticipant {
    id: ParticipantId,
    state: Mutex<InventoryState>,
}

impl InventoryParticipant {
    pub fn new(id: impl Into<ParticipantId>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(InventoryState::default()),
        }
    }

    pub fn with_stock(self, sku: &str, quantity: u64) -> Self {
        self.state.lock().stock.insert(sku.to_string(), quantity);
        self
    }

    /// Units on hand, including reserved ones
    pub fn on_hand(&self, sku: &str) -> Option<u64> {
        self.state.lock().stock.get(sku).copied()
    }

    /// Units not promised to any prepared transaction
    pub fn available(&self, sku: &str) -> u64 {
        self.state.lock().unreserved(sku)
    }

    /// Ask for `quantity` units of `sku` as part of `txn_id`
    pub fn request(&self, txn_id: TransactionId, sku: &str, quantity: u64) -> Result<()> {
        let mut state = self.state.lock();

        if !state.stock.contains_key(sku) {
            return Err(StagingError::UnknownKey(sku.to_string()));
        }
        if state.reserved.contains_key(&txn_id) || state.resolved.contains_key(&txn_id) {
            return Err(StagingError::Closed(txn_id));
        }

        *state
            .staged
            .entry(txn_id)
            .or_default()
            .entry(sku.to_string())
            .or_default() += quantity;
        Ok(())
    }
}

#[async_trait]
impl Participant for InventoryParticipant {
    fn id(&self) -> &ParticipantId {
        &self.id
    }

    async fn prepare(&self, txn_id: TransactionId) -> std::result::Result<bool, ParticipantError> {
        let mut state = self.state.lock();

        if state.reserved.contains_key(&txn_id) {
            return Ok(true);
        }
        if let Some(resolution) = state.resolved.get(&txn_id) {
            return Ok(*resolution == Resolution::Committed);
        }

        let items = state.staged.remove(&txn_id).unwrap_or_default();
        if let Some((sku, wanted)) = items
            .iter()
            .find(|(sku, wanted)| state.unreserved(sku) < **wanted)
        {
            tracing::info!(participant = %self.id, %txn_id, %sku, wanted, "Out of stock, voting no");
            state.resolved.insert(txn_id, Resolution::RolledBack);
            return Ok(false);
        }

        state.reserved.insert(txn_id, items);
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

        let items = state.reserved.remove(&txn_id).unwrap_or_default();
        for (sku, quantity) in items {
            let on_hand = state.stock.entry(sku).or_default();
            *on_hand = on_hand.saturating_sub(quantity);
        }
        state.resolved.insert(txn_id, Resolution::Committed);

        tracing::debug!(participant = %self.id, %txn_id, "Reservation shipped");
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
        if state.reserved.remove(&txn_id).is_some() {
            tracing::debug!(participant = %self.id, %txn_id, "Reservation released");
        }
        state.resolved.insert(txn_id, Resolution::RolledBack);
        Ok(())
    }
}
