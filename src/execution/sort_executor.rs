use crate::common::{RecordId, Result};

use super::executor::{Executor, Tuple};
use super::plan::{compare_tuples, OrderBy};

/// Full-materialization sort: drains the child on `init`, then streams the
/// sorted rows.
pub struct SortExecutor {
    child: Box<dyn Executor>,
    order_by: Vec<OrderBy>,
    sorted: Vec<(Tuple, RecordId)>,
    cursor: usize,
}

impl SortExecutor {
    pub fn new(child: Box<dyn Executor>, order_by: Vec<OrderBy>) -> Self {
        Self {
            child,
            order_by,
            sorted: Vec::new(),
            cursor: 0,
        }
    }
}

impl Executor for SortExecutor {
    fn init(&mut self) -> Result<()> {
        self.child.init()?;
        self.sorted.clear();
        while let Some(row) = self.child.next()? {
            self.sorted.push(row);
        }
        self.sorted
            .sort_by(|a, b| compare_tuples(&a.0, &b.0, &self.order_by));
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, RecordId)>> {
        if self.cursor == self.sorted.len() {
            return Ok(None);
        }
        let row = self.sorted[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(row))
    }
}
