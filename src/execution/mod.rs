mod executor;
mod limit_executor;
mod optimizer;
mod plan;
mod seq_scan_executor;
mod sort_executor;
mod topn_executor;
mod transaction;

pub use executor::{create_executor, Executor, ExecutorContext, TableSource, Tuple};
pub use limit_executor::LimitExecutor;
pub use optimizer::optimize_sort_limit_as_topn;
pub use plan::{compare_tuples, OrderBy, PlanNode};
pub use seq_scan_executor::SeqScanExecutor;
pub use sort_executor::SortExecutor;
pub use topn_executor::TopNExecutor;
pub use transaction::{IsolationLevel, LockManager, LockMode, Transaction};
