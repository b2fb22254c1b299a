//! Per-task execution context

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::errors::{ExecutorError, ExecutorResult};
use crate::index::TwoLevelIndexReader;
use crate::observability::MetricsRegistry;
use crate::storage::Fragment;

/// Cooperative cancellation flag shared between a task and its owner.
///
/// Operators check it on every `next`; a cancelled operator returns
/// `TESSERA_EXEC_CANCELLED`.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> ExecutorResult<()> {
        if self.is_cancelled() {
            Err(ExecutorError::cancelled())
        } else {
            Ok(())
        }
    }
}

/// An opened index over one column of one table fragment
#[derive(Clone)]
pub struct IndexBinding {
    pub table: String,
    /// Key column, unqualified
    pub column: String,
    /// Row file the index offsets point into
    pub data: Fragment,
    pub reader: Arc<TwoLevelIndexReader>,
}

/// Everything the operators of one block need: input data locations,
/// opened indexes, the cancel signal and shared counters
#[derive(Clone)]
pub struct TaskContext {
    cancel: CancelSignal,
    metrics: Arc<MetricsRegistry>,
    tables: HashMap<String, Vec<Fragment>>,
    intermediates: HashMap<u32, Vec<Fragment>>,
    indexes: Vec<IndexBinding>,
}

impl TaskContext {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            cancel: CancelSignal::new(),
            metrics,
            tables: HashMap::new(),
            intermediates: HashMap::new(),
            indexes: Vec::new(),
        }
    }

    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn add_table_fragment(&mut self, table: impl Into<String>, fragment: Fragment) {
        self.tables.entry(table.into()).or_default().push(fragment);
    }

    /// Registers the materialized output of block `seq`
    pub fn add_intermediate(&mut self, seq: u32, fragment: Fragment) {
        self.intermediates.entry(seq).or_default().push(fragment);
    }

    pub fn add_index(&mut self, binding: IndexBinding) {
        self.indexes.push(binding);
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn table_fragments(&self, table: &str) -> ExecutorResult<&[Fragment]> {
        self.tables
            .get(table)
            .map(Vec::as_slice)
            .ok_or_else(|| ExecutorError::invalid_plan(format!("No data fragments for table {}", table)))
    }

    pub fn intermediate_fragments(&self, seq: u32) -> ExecutorResult<&[Fragment]> {
        self.intermediates.get(&seq).map(Vec::as_slice).ok_or_else(|| {
            ExecutorError::invalid_plan(format!("Output of block #{} is not available", seq))
        })
    }

    /// Indexes usable for a scan of `table`: the table must consist of
    /// exactly the fragment the index was built over
    pub fn indexes_for(&self, table: &str) -> Vec<&IndexBinding> {
        let fragments = match self.tables.get(table) {
            Some(f) if f.len() == 1 => f,
            _ => return Vec::new(),
        };
        self.indexes
            .iter()
            .filter(|b| b.table == table && b.data == fragments[0])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_signal_shared() {
        let signal = CancelSignal::new();
        let ctx = TaskContext::new(Arc::new(MetricsRegistry::new()))
            .with_cancel_signal(signal.clone());
        assert!(ctx.cancel_signal().check().is_ok());

        signal.cancel();
        assert!(ctx.cancel_signal().is_cancelled());
        assert!(ctx.cancel_signal().check().is_err());
    }

    #[test]
    fn test_missing_inputs_are_invalid_plans() {
        let mut ctx = TaskContext::new(Arc::new(MetricsRegistry::new()));
        ctx.add_table_fragment("emp", Fragment::new("emp", "/data/emp.rows"));
        ctx.add_intermediate(3, Fragment::new("block_3", "/data/q/3.rows"));

        assert_eq!(ctx.table_fragments("emp").unwrap().len(), 1);
        assert_eq!(ctx.intermediate_fragments(3).unwrap().len(), 1);
        assert!(ctx.table_fragments("dept").is_err());
        assert!(ctx.intermediate_fragments(4).is_err());
        assert!(ctx.indexes_for("emp").is_empty());
    }
}
