use std::cmp::Ordering;

use super::executor::Tuple;

/// One sort key: column index plus direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: usize,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: usize) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    pub fn desc(column: usize) -> Self {
        Self {
            column,
            descending: true,
        }
    }
}

/// Compares two tuples under an order-by spec; the first non-equal key
/// decides.
pub fn compare_tuples(a: &Tuple, b: &Tuple, order_by: &[OrderBy]) -> Ordering {
    for spec in order_by {
        let ord = a.value_at(spec.column).cmp(&b.value_at(spec.column));
        let ord = if spec.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Query plan tree for the executors in scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanNode {
    SeqScan {
        table_oid: u32,
    },
    Sort {
        order_by: Vec<OrderBy>,
        child: Box<PlanNode>,
    },
    Limit {
        limit: usize,
        child: Box<PlanNode>,
    },
    TopN {
        order_by: Vec<OrderBy>,
        n: usize,
        child: Box<PlanNode>,
    },
}
