//! Integration tests for the executor boundary: the sequential-scan lock
//! handshake and the Sort + Limit -> TopN rewrite.

use std::sync::Arc;

use parking_lot::Mutex;

use keel::common::{KeelError, PageId, RecordId, SlotId};
use keel::execution::{
    create_executor, optimize_sort_limit_as_topn, Executor, ExecutorContext, IsolationLevel,
    LockManager, LockMode, OrderBy, PlanNode, TableSource, Transaction, Tuple,
};

fn rid(n: u32) -> RecordId {
    RecordId::new(PageId::new(n), SlotId::new(0))
}

struct MemTable {
    oid: u32,
    rows: Vec<(Tuple, RecordId)>,
}

impl MemTable {
    fn new(oid: u32, rows: Vec<Vec<i64>>) -> Self {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, values)| (Tuple::new(values), rid(i as u32)))
            .collect();
        Self { oid, rows }
    }
}

impl TableSource for MemTable {
    fn oid(&self) -> u32 {
        self.oid
    }

    fn rows(&self) -> Vec<(Tuple, RecordId)> {
        self.rows.clone()
    }
}

/// Lock manager double: grants or refuses by configuration and records
/// every call.
#[derive(Default)]
struct StubLockManager {
    deny_table: bool,
    deny_rows_after: Option<usize>,
    log: Mutex<Vec<String>>,
}

impl StubLockManager {
    fn events(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl LockManager for StubLockManager {
    fn lock_table(&self, _txn: &Transaction, mode: LockMode, table_oid: u32) -> bool {
        self.log.lock().push(format!("lock_table({mode:?}, {table_oid})"));
        !self.deny_table
    }

    fn unlock_table(&self, _txn: &Transaction, table_oid: u32) -> bool {
        self.log.lock().push(format!("unlock_table({table_oid})"));
        true
    }

    fn lock_row(&self, _txn: &Transaction, mode: LockMode, table_oid: u32, rid: RecordId) -> bool {
        let mut log = self.log.lock();
        let granted_rows = log.iter().filter(|e| e.starts_with("lock_row")).count();
        log.push(format!("lock_row({mode:?}, {table_oid}, {rid})"));
        match self.deny_rows_after {
            Some(limit) => granted_rows < limit,
            None => true,
        }
    }

    fn unlock_row(&self, _txn: &Transaction, table_oid: u32, rid: RecordId) -> bool {
        self.log.lock().push(format!("unlock_row({table_oid}, {rid})"));
        true
    }
}

fn scan_context(
    isolation: IsolationLevel,
    lock_manager: Arc<StubLockManager>,
) -> ExecutorContext {
    let txn = Arc::new(Transaction::new(1, isolation));
    let mut ctx = ExecutorContext::new(txn, lock_manager);
    ctx.register_table(Arc::new(MemTable::new(
        7,
        vec![vec![1, 30], vec![2, 10], vec![3, 20]],
    )));
    ctx
}

fn drain(executor: &mut Box<dyn Executor>) -> Vec<Tuple> {
    let mut out = Vec::new();
    executor.init().unwrap();
    while let Some((tuple, _)) = executor.next().unwrap() {
        out.push(tuple);
    }
    out
}

#[test]
fn test_seq_scan_read_uncommitted_takes_no_locks() {
    let lock_manager = Arc::new(StubLockManager::default());
    let ctx = scan_context(IsolationLevel::ReadUncommitted, Arc::clone(&lock_manager));

    let plan = PlanNode::SeqScan { table_oid: 7 };
    let mut executor = create_executor(&plan, &ctx).unwrap();
    let rows = drain(&mut executor);

    assert_eq!(rows.len(), 3);
    assert!(lock_manager.events().is_empty());
}

#[test]
fn test_seq_scan_read_committed_releases_rows_then_table() {
    let lock_manager = Arc::new(StubLockManager::default());
    let ctx = scan_context(IsolationLevel::ReadCommitted, Arc::clone(&lock_manager));

    let plan = PlanNode::SeqScan { table_oid: 7 };
    let mut executor = create_executor(&plan, &ctx).unwrap();
    let rows = drain(&mut executor);
    assert_eq!(rows.len(), 3);

    let events = lock_manager.events();
    assert_eq!(events[0], "lock_table(IntentionShared, 7)");
    assert_eq!(
        events.iter().filter(|e| e.starts_with("lock_row")).count(),
        3
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| e.starts_with("unlock_row"))
            .count(),
        3
    );
    // The table lock goes last, after every row lock is released
    assert_eq!(events.last().unwrap(), "unlock_table(7)");

    // All row locks were drained from the transaction
    assert_eq!(ctx.transaction.row_lock_count(7), 0);
}

#[test]
fn test_seq_scan_repeatable_read_keeps_locks() {
    let lock_manager = Arc::new(StubLockManager::default());
    let ctx = scan_context(IsolationLevel::RepeatableRead, Arc::clone(&lock_manager));

    let plan = PlanNode::SeqScan { table_oid: 7 };
    let mut executor = create_executor(&plan, &ctx).unwrap();
    drain(&mut executor);

    let events = lock_manager.events();
    assert!(!events.iter().any(|e| e.starts_with("unlock")));
    // Release is the commit path's job
    assert_eq!(ctx.transaction.row_lock_count(7), 3);
}

#[test]
fn test_seq_scan_aborts_when_table_lock_refused() {
    let lock_manager = Arc::new(StubLockManager {
        deny_table: true,
        ..Default::default()
    });
    let ctx = scan_context(IsolationLevel::ReadCommitted, Arc::clone(&lock_manager));

    let plan = PlanNode::SeqScan { table_oid: 7 };
    let mut executor = create_executor(&plan, &ctx).unwrap();
    assert!(matches!(
        executor.init(),
        Err(KeelError::ExecutorAborted(_))
    ));
}

#[test]
fn test_seq_scan_aborts_when_row_lock_refused() {
    let lock_manager = Arc::new(StubLockManager {
        deny_rows_after: Some(1),
        ..Default::default()
    });
    let ctx = scan_context(IsolationLevel::ReadCommitted, Arc::clone(&lock_manager));

    let plan = PlanNode::SeqScan { table_oid: 7 };
    let mut executor = create_executor(&plan, &ctx).unwrap();
    executor.init().unwrap();

    assert!(executor.next().unwrap().is_some());
    assert!(matches!(
        executor.next(),
        Err(KeelError::ExecutorAborted(_))
    ));
}

#[test]
fn test_unknown_table_fails_at_build_time() {
    let lock_manager = Arc::new(StubLockManager::default());
    let ctx = scan_context(IsolationLevel::ReadCommitted, lock_manager);

    let plan = PlanNode::SeqScan { table_oid: 99 };
    assert!(matches!(
        create_executor(&plan, &ctx),
        Err(KeelError::TableNotFound(99))
    ));
}

#[test]
fn test_sort_orders_rows() {
    let lock_manager = Arc::new(StubLockManager::default());
    let ctx = scan_context(IsolationLevel::ReadUncommitted, lock_manager);

    let plan = PlanNode::Sort {
        order_by: vec![OrderBy::asc(1)],
        child: Box::new(PlanNode::SeqScan { table_oid: 7 }),
    };
    let mut executor = create_executor(&plan, &ctx).unwrap();
    let rows = drain(&mut executor);

    let col0: Vec<i64> = rows.iter().map(|t| t.value_at(0)).collect();
    assert_eq!(col0, vec![2, 3, 1]);
}

#[test]
fn test_limit_truncates() {
    let lock_manager = Arc::new(StubLockManager::default());
    let ctx = scan_context(IsolationLevel::ReadUncommitted, lock_manager);

    let plan = PlanNode::Limit {
        limit: 2,
        child: Box::new(PlanNode::SeqScan { table_oid: 7 }),
    };
    let mut executor = create_executor(&plan, &ctx).unwrap();
    assert_eq!(drain(&mut executor).len(), 2);
}

#[test]
fn test_topn_matches_sort_then_limit() {
    let lock_manager = Arc::new(StubLockManager::default());
    let txn = Arc::new(Transaction::new(1, IsolationLevel::ReadUncommitted));
    let mut ctx = ExecutorContext::new(txn, lock_manager);
    let rows: Vec<Vec<i64>> = (0..20)
        .map(|i| vec![i, (i * 37 + 11) % 100])
        .collect();
    ctx.register_table(Arc::new(MemTable::new(5, rows)));

    let sorted_plan = PlanNode::Limit {
        limit: 4,
        child: Box::new(PlanNode::Sort {
            order_by: vec![OrderBy::desc(1)],
            child: Box::new(PlanNode::SeqScan { table_oid: 5 }),
        }),
    };

    let optimized = optimize_sort_limit_as_topn(sorted_plan.clone());
    assert!(matches!(optimized, PlanNode::TopN { n: 4, .. }));

    let mut plain = create_executor(&sorted_plan, &ctx).unwrap();
    let mut rewritten = create_executor(&optimized, &ctx).unwrap();
    assert_eq!(drain(&mut plain), drain(&mut rewritten));
}

#[test]
fn test_topn_with_fewer_rows_than_n() {
    let lock_manager = Arc::new(StubLockManager::default());
    let ctx = scan_context(IsolationLevel::ReadUncommitted, lock_manager);

    let plan = PlanNode::TopN {
        order_by: vec![OrderBy::asc(1)],
        n: 10,
        child: Box::new(PlanNode::SeqScan { table_oid: 7 }),
    };
    let mut executor = create_executor(&plan, &ctx).unwrap();
    let rows = drain(&mut executor);

    let col1: Vec<i64> = rows.iter().map(|t| t.value_at(1)).collect();
    assert_eq!(col1, vec![10, 20, 30]);
}
