use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::common::{RecordId, Result};

use super::executor::{Executor, Tuple};
use super::plan::{compare_tuples, OrderBy};

struct HeapItem {
    tuple: Tuple,
    rid: RecordId,
    order_by: Arc<[OrderBy]>,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_tuples(&self.tuple, &other.tuple, &self.order_by)
    }
}

/// Top-N with a bounded heap: keeps the best N rows of the child in a
/// max-heap whose top is the worst survivor, popping it whenever an
/// arriving row beats it. The substitute the optimizer installs for
/// Sort + Limit.
pub struct TopNExecutor {
    child: Box<dyn Executor>,
    order_by: Arc<[OrderBy]>,
    n: usize,
    results: Vec<(Tuple, RecordId)>,
    cursor: usize,
}

impl TopNExecutor {
    pub fn new(child: Box<dyn Executor>, order_by: Vec<OrderBy>, n: usize) -> Self {
        Self {
            child,
            order_by: order_by.into(),
            n,
            results: Vec::new(),
            cursor: 0,
        }
    }
}

impl Executor for TopNExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()?;
        let mut heap: BinaryHeap<HeapItem> = BinaryHeap::with_capacity(self.n + 1);
        while let Some((tuple, rid)) = self.child.next()? {
            heap.push(HeapItem {
                tuple,
                rid,
                order_by: Arc::clone(&self.order_by),
            });
            if heap.len() > self.n {
                heap.pop();
            }
        }
        self.results = heap
            .into_sorted_vec()
            .into_iter()
            .map(|item| (item.tuple, item.rid))
            .collect();
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        if self.cursor == self.results.len() {
            return Ok(None);
        }
        let row = self.results[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(row))
    }
}
