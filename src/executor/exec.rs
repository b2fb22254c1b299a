//! Operator contracts

use super::errors::ExecutorResult;
use crate::logical::Expr;
use crate::tuple::{Schema, Tuple};

/// A pull-based physical operator.
///
/// Lifecycle: `init`, then `next` until it returns `Ok(None)`, then `close`.
/// `reset` rewinds to the first row without re-planning. `init` is called
/// by the parent operator on its children.
pub trait PhysicalExec: Send {
    /// Operator name for EXPLAIN and log lines
    fn name(&self) -> &'static str;

    fn schema(&self) -> &Schema;

    fn init(&mut self) -> ExecutorResult<()>;

    fn next(&mut self) -> ExecutorResult<Option<Tuple>>;

    fn reset(&mut self) -> ExecutorResult<()>;

    fn close(&mut self) -> ExecutorResult<()>;
}

/// Leaf operator reading stored rows.
///
/// Scanners that report `is_projectable` / `is_selectable` accept a column
/// list / predicate and apply them while reading; the others reject both and
/// must be wrapped in project / filter operators.
pub trait Scanner: PhysicalExec {
    fn is_projectable(&self) -> bool;

    /// Restricts output to `columns`, in that order
    fn set_target(&mut self, columns: &[String]) -> ExecutorResult<()>;

    fn is_selectable(&self) -> bool;

    /// Drops rows for which `predicate` is not true
    fn set_search_condition(&mut self, predicate: &Expr) -> ExecutorResult<()>;
}

/// Runs an operator tree to completion and returns every row
pub fn collect_rows(exec: &mut dyn PhysicalExec) -> ExecutorResult<Vec<Tuple>> {
    exec.init()?;
    let mut rows = Vec::new();
    while let Some(row) = exec.next()? {
        rows.push(row);
    }
    exec.close()?;
    Ok(rows)
}
