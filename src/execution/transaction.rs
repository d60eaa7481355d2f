use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::common::RecordId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    IntentionShared,
    Shared,
}

/// The slice of transaction state the scan handshake needs: identity,
/// isolation level, and the shared row locks taken per table.
pub struct Transaction {
    id: u32,
    isolation_level: IsolationLevel,
    shared_row_locks: Mutex<HashMap<u32, HashSet<RecordId>>>,
}

impl Transaction {
    pub fn new(id: u32, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            shared_row_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn record_row_lock(&self, table_oid: u32, rid: RecordId) {
        self.shared_row_locks
            .lock()
            .entry(table_oid)
            .or_default()
            .insert(rid);
    }

    /// Drains the recorded shared row locks for `table_oid`.
    pub fn take_row_locks(&self, table_oid: u32) -> Vec<RecordId> {
        self.shared_row_locks
            .lock()
            .remove(&table_oid)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn row_lock_count(&self, table_oid: u32) -> usize {
        self.shared_row_locks
            .lock()
            .get(&table_oid)
            .map(|set| set.len())
            .unwrap_or(0)
    }
}

/// Boundary interface to the transactional lock manager. The lock manager
/// itself is not part of the storage kernel; executors only depend on this
/// protocol. A `false` return is a refusal and aborts the caller.
pub trait LockManager: Send + Sync {
    fn lock_table(&self, txn: &Transaction, mode: LockMode, table_oid: u32) -> bool;
    fn unlock_table(&self, txn: &Transaction, table_oid: u32) -> bool;
    fn lock_row(&self, txn: &Transaction, mode: LockMode, table_oid: u32, rid: RecordId) -> bool;
    fn unlock_row(&self, txn: &Transaction, table_oid: u32, rid: RecordId) -> bool;
}
