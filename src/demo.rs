//! Walkthrough of the coordinator over a file-backed log
//!
//! A shop with a bank ledger and a warehouse:
//! - a purchase that both participants accept and that commits
//! - a purchase the bank refuses for lack of funds, which aborts
//! - a purchase abandoned before execution, finished by recovery after a
//!   coordinator restart

use crate::error::Result;
use crate::settings::Settings;
use std::sync::Arc;
use tpc_common::TransactionId;
use tpc_coordinator::{Coordinator, Outcome, StaticDirectory, TransactionStatus};
use tpc_log_file::FileTransactionLog;
use tpc_participants::{InventoryParticipant, LedgerParticipant};

/// What the walkthrough observed
#[derive(Debug, Clone, PartialEq)]
pub struct DemoReport {
    pub purchase: Outcome,
    pub overdraft: Outcome,

    /// Status of the abandoned purchase after the restart
    pub abandoned: TransactionStatus,

    pub alice_balance: Option<i64>,
    pub shop_balance: Option<i64>,
    pub widgets_on_hand: Option<u64>,
}

struct Shop {
    bank: Arc<LedgerParticipant>,
    warehouse: Arc<InventoryParticipant>,
}

impl Shop {
    fn new() -> Self {
        Self {
            bank: Arc::new(
                LedgerParticipant::new("bank")
                    .with_account("alice", 100)
                    .with_account("bob", 20)
                    .with_account("shop", 0),
            ),
            warehouse: Arc::new(InventoryParticipant::new("warehouse").with_stock("widget", 5)),
        }
    }

    fn directory(&self) -> StaticDirectory {
        StaticDirectory::new()
            .with(self.bank.clone())
            .with(self.warehouse.clone())
    }

    /// Stage a purchase of `widgets` at 10 per unit and enlist both participants
    fn purchase(
        &self,
        coordinator: &Coordinator,
        buyer: &str,
        widgets: u64,
    ) -> Result<TransactionId> {
        let txn_id = coordinator.begin()?;

        self.bank
            .transfer(txn_id, buyer, "shop", 10 * widgets as i64)?;
        self.warehouse.request(txn_id, "widget", widgets)?;

        coordinator.enlist(txn_id, self.bank.clone())?;
        coordinator.enlist(txn_id, self.warehouse.clone())?;

        Ok(txn_id)
    }
}

/// Run the walkthrough with the log under `settings.log_dir`
pub async fn run(settings: &Settings) -> Result<DemoReport> {
    let config = settings.coordinator.to_config();
    let shop = Shop::new();
    let directory = shop.directory();

    let log = Arc::new(FileTransactionLog::open(settings.log_path())?);
    tracing::info!(path = %log.path().display(), "Opened transaction log");

    let coordinator = Coordinator::start(config, log, &directory).await?;

    let txn_id = shop.purchase(&coordinator, "alice", 3)?;
    let purchase = coordinator.execute_transaction(txn_id).await?;
    tracing::info!(%txn_id, ?purchase, "Alice bought three widgets");

    let txn_id = shop.purchase(&coordinator, "bob", 4)?;
    let overdraft = coordinator.execute_transaction(txn_id).await?;
    tracing::info!(%txn_id, ?overdraft, "Bob tried to buy four widgets");

    let abandoned_id = shop.purchase(&coordinator, "alice", 1)?;
    tracing::info!(txn_id = %abandoned_id, "Restarting before the last purchase executes");

    let coordinator = coordinator.restart(&directory).await?;
    let abandoned = coordinator.get_status(abandoned_id)?;
    tracing::info!(txn_id = %abandoned_id, ?abandoned, "Abandoned purchase after restart");

    coordinator.shutdown();

    Ok(DemoReport {
        purchase,
        overdraft,
        abandoned,
        alice_balance: shop.bank.balance("alice"),
        shop_balance: shop.bank.balance("shop"),
        widgets_on_hand: shop.warehouse.on_hand("widget"),
    })
}
