use std::collections::HashMap;
use std::sync::Arc;

use crate::common::{KeelError, RecordId, Result};

use super::limit_executor::LimitExecutor;
use super::plan::PlanNode;
use super::seq_scan_executor::SeqScanExecutor;
use super::sort_executor::SortExecutor;
use super::topn_executor::TopNExecutor;
use super::transaction::{LockManager, Transaction};

/// A row flowing through the executor pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    values: Vec<i64>,
}

impl Tuple {
    pub fn new(values: Vec<i64>) -> Self {
        Self { values }
    }

    pub fn value_at(&self, column: usize) -> i64 {
        self.values[column]
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }
}

/// Pull-based executor: `init` once, then `next` until it yields `None`.
pub trait Executor {
    fn init(&mut self) -> Result<()>;
    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>>;
}

/// Where a sequential scan gets its rows. The table heap itself lives
/// outside the storage kernel; this is its boundary interface.
pub trait TableSource: Send + Sync {
    fn oid(&self) -> u32;
    fn rows(&self) -> Vec<(Tuple, RecordId)>;
}

/// Everything an executor pipeline needs at build time.
pub struct ExecutorContext {
    pub transaction: Arc<Transaction>,
    pub lock_manager: Arc<dyn LockManager>,
    tables: HashMap<u32, Arc<dyn TableSource>>,
}

impl ExecutorContext {
    pub fn new(transaction: Arc<Transaction>, lock_manager: Arc<dyn LockManager>) -> Self {
        Self {
            transaction,
            lock_manager,
            tables: HashMap::new(),
        }
    }

    pub fn register_table(&mut self, table: Arc<dyn TableSource>) {
        self.tables.insert(table.oid(), table);
    }

    pub fn table(&self, oid: u32) -> Result<Arc<dyn TableSource>> {
        self.tables
            .get(&oid)
            .cloned()
            .ok_or(KeelError::TableNotFound(oid))
    }
}

/// Builds the executor pipeline for a plan tree.
pub fn create_executor(plan: &PlanNode, ctx: &ExecutorContext) -> Result<Box<dyn Executor>> {
    match plan {
        PlanNode::SeqScan { table_oid } => {
            let table = ctx.table(*table_oid)?;
            Ok(Box::new(SeqScanExecutor::new(
                table,
                Arc::clone(&ctx.transaction),
                Arc::clone(&ctx.lock_manager),
            )))
        }
        PlanNode::Sort { order_by, child } => Ok(Box::new(SortExecutor::new(
            create_executor(child, ctx)?,
            order_by.clone(),
        ))),
        PlanNode::Limit { limit, child } => Ok(Box::new(LimitExecutor::new(
            create_executor(child, ctx)?,
            *limit,
        ))),
        PlanNode::TopN { order_by, n, child } => Ok(Box::new(TopNExecutor::new(
            create_executor(child, ctx)?,
            order_by.clone(),
            *n,
        ))),
    }
}
