use std::sync::Arc;

use crate::common::{KeelError, RecordId, Result};

use super::executor::{Executor, TableSource, Tuple};
use super::transaction::{IsolationLevel, LockManager, LockMode, Transaction};

/// Sequential table scan cooperating with the transactional lock manager.
///
/// Unless the transaction runs READ_UNCOMMITTED, `init` takes an
/// intention-shared lock on the table and every `next` takes a shared lock
/// on the row before handing it out; a refused lock aborts the executor.
/// Under READ_COMMITTED the end of the scan releases all row locks and then
/// the table lock; stricter levels leave release to the commit path.
pub struct SeqScanExecutor {
    table: Arc<dyn TableSource>,
    transaction: Arc<Transaction>,
    lock_manager: Arc<dyn LockManager>,
    rows: Vec<(Tuple, RecordId)>,
    cursor: usize,
    finished: bool,
}

impl SeqScanExecutor {
    pub fn new(
        table: Arc<dyn TableSource>,
        transaction: Arc<Transaction>,
        lock_manager: Arc<dyn LockManager>,
    ) -> Self {
        Self {
            table,
            transaction,
            lock_manager,
            rows: Vec::new(),
            cursor: 0,
            finished: false,
        }
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> Result<()> {
        if self.transaction.isolation_level() != IsolationLevel::ReadUncommitted {
            let locked = self.lock_manager.lock_table(
                &self.transaction,
                LockMode::IntentionShared,
                self.table.oid(),
            );
            if !locked {
                return Err(KeelError::ExecutorAborted(
                    "sequential scan could not lock the table".into(),
                ));
            }
        }
        self.rows = self.table.rows();
        self.cursor = 0;
        self.finished = false;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        if self.finished {
            return Ok(None);
        }
        if self.cursor == self.rows.len() {
            self.finished = true;
            if self.transaction.isolation_level() == IsolationLevel::ReadCommitted {
                let oid = self.table.oid();
                for rid in self.transaction.take_row_locks(oid) {
                    self.lock_manager.unlock_row(&self.transaction, oid, rid);
                }
                self.lock_manager.unlock_table(&self.transaction, oid);
            }
            return Ok(None);
        }

        let (tuple, rid) = self.rows[self.cursor].clone();
        self.cursor += 1;

        if self.transaction.isolation_level() != IsolationLevel::ReadUncommitted {
            let locked =
                self.lock_manager
                    .lock_row(&self.transaction, LockMode::Shared, self.table.oid(), rid);
            if !locked {
                return Err(KeelError::ExecutorAborted(
                    "sequential scan could not lock the row".into(),
                ));
            }
            self.transaction.record_row_lock(self.table.oid(), rid);
        }
        Ok(Some((tuple, rid)))
    }
}
