//! In-memory transaction log
//!
//! Clones share the same record buffer, so a log handed to a second
//! coordinator after the first one is dropped behaves like a file that
//! survived a crash.

use parking_lot::Mutex;
use std::sync::Arc;
use tpc_common::TransactionId;
use tpc_log::{LogRecord, Result, TransactionLog};

/// In-memory log for testing
#[derive(Clone, Default)]
pub struct MemoryTransactionLog {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemoryTransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a log with existing records
    pub fn with_records(records: Vec<LogRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
        }
    }

    /// Number of records appended so far
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Records belonging to one transaction, in append order
    pub fn records_for(&self, txn_id: TransactionId) -> Vec<LogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|record| record.txn_id == txn_id)
            .cloned()
            .collect()
    }
}

impl TransactionLog for MemoryTransactionLog {
    fn append(&self, record: LogRecord) -> Result<()> {
        self.records.lock().push(record);
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<LogRecord>> {
        Ok(self.records.lock().clone())
    }
}
