//! In-memory sort
//!
//! Materializes its input on the first `next` and sorts it with a stable
//! tuple comparator, so rows with equal keys keep their input order.

use super::context::CancelSignal;
use super::errors::{ExecutorError, ExecutorResult};
use super::exec::PhysicalExec;
use crate::tuple::{Schema, SortSpec, Tuple, TupleComparator};

pub struct SortExec {
    child: Box<dyn PhysicalExec>,
    comparator: TupleComparator,
    sorted: Option<Vec<Tuple>>,
    position: usize,
    cancel: CancelSignal,
}

impl SortExec {
    pub fn new(child: Box<dyn PhysicalExec>, specs: &[SortSpec]) -> ExecutorResult<Self> {
        let comparator = TupleComparator::new(child.schema(), specs)
            .map_err(|e| ExecutorError::invalid_plan(e.to_string()))?;
        Ok(Self {
            child,
            comparator,
            sorted: None,
            position: 0,
            cancel: CancelSignal::new(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    fn materialize(&mut self) -> ExecutorResult<()> {
        let mut rows = Vec::new();
        while let Some(row) = self.child.next()? {
            rows.push(row);
        }
        self.comparator.sort(&mut rows);
        self.sorted = Some(rows);
        self.position = 0;
        Ok(())
    }
}

impl PhysicalExec for SortExec {
    fn name(&self) -> &'static str {
        "Sort"
    }

    fn schema(&self) -> &Schema {
        self.child.schema()
    }

    fn init(&mut self) -> ExecutorResult<()> {
        self.sorted = None;
        self.position = 0;
        self.child.init()
    }

    fn next(&mut self) -> ExecutorResult<Option<Tuple>> {
        self.cancel.check()?;
        if self.sorted.is_none() {
            self.materialize()?;
        }
        let row = self
            .sorted
            .as_ref()
            .and_then(|rows| rows.get(self.position))
            .cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }

    /// Replays the sorted rows without reading the child again
    fn reset(&mut self) -> ExecutorResult<()> {
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) -> ExecutorResult<()> {
        self.sorted = None;
        self.child.close()
    }
}
