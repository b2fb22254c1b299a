//! Sequential scan over row data fragments

use std::sync::Arc;

use super::context::{CancelSignal, TaskContext};
use super::errors::{ExecutorError, ExecutorResult};
use super::eval::BoundExpr;
use super::exec::{PhysicalExec, Scanner};
use crate::logical::Expr;
use crate::observability::MetricsRegistry;
use crate::storage::{Fragment, RowReader};
use crate::tuple::{Schema, Tuple};

/// Reads every row of its fragments in file order, fragment by fragment.
/// Projectable and selectable.
pub struct SeqScanExec {
    scan_schema: Schema,
    out_schema: Schema,
    fragments: Vec<Fragment>,
    next_fragment: usize,
    reader: Option<RowReader>,
    condition: Option<BoundExpr>,
    projection: Option<Vec<usize>>,
    cancel: CancelSignal,
    metrics: Arc<MetricsRegistry>,
}

impl SeqScanExec {
    /// `schema` describes the stored rows
    pub fn new(schema: Schema, fragments: Vec<Fragment>, ctx: &TaskContext) -> Self {
        Self {
            out_schema: schema.clone(),
            scan_schema: schema,
            fragments,
            next_fragment: 0,
            reader: None,
            condition: None,
            projection: None,
            cancel: ctx.cancel_signal().clone(),
            metrics: Arc::clone(ctx.metrics()),
        }
    }

    /// Opens the next fragment; false when all are consumed
    fn open_next(&mut self) -> ExecutorResult<bool> {
        let fragment = match self.fragments.get(self.next_fragment) {
            Some(f) => f,
            None => return Ok(false),
        };
        self.reader = Some(RowReader::open(&fragment.path)?);
        self.next_fragment += 1;
        Ok(true)
    }
}

impl PhysicalExec for SeqScanExec {
    fn name(&self) -> &'static str {
        "SeqScan"
    }

    fn schema(&self) -> &Schema {
        &self.out_schema
    }

    fn init(&mut self) -> ExecutorResult<()> {
        self.reader = None;
        self.next_fragment = 0;
        Ok(())
    }

    fn next(&mut self) -> ExecutorResult<Option<Tuple>> {
        loop {
            self.cancel.check()?;

            let row = match self.reader.as_mut() {
                Some(reader) => reader.read_next()?,
                None => {
                    if !self.open_next()? {
                        return Ok(None);
                    }
                    continue;
                }
            };
            let row = match row {
                Some(row) => row,
                None => {
                    self.reader = None;
                    continue;
                }
            };

            self.metrics.increment_tuples_scanned();
            if row.len() != self.scan_schema.len() {
                return Err(ExecutorError::invalid_plan(format!(
                    "Stored row has {} values, scan schema {} has {}",
                    row.len(),
                    self.scan_schema,
                    self.scan_schema.len()
                )));
            }
            if let Some(cond) = &self.condition {
                if !cond.eval_predicate(&row)? {
                    continue;
                }
            }
            return Ok(Some(match &self.projection {
                Some(positions) => row.project(positions),
                None => row,
            }));
        }
    }

    fn reset(&mut self) -> ExecutorResult<()> {
        self.init()
    }

    fn close(&mut self) -> ExecutorResult<()> {
        self.reader = None;
        Ok(())
    }
}

impl Scanner for SeqScanExec {
    fn is_projectable(&self) -> bool {
        true
    }

    fn set_target(&mut self, columns: &[String]) -> ExecutorResult<()> {
        let mut positions = Vec::with_capacity(columns.len());
        let mut out = Schema::empty();
        for name in columns {
            let pos = self
                .scan_schema
                .index_of(name)
                .map_err(|e| ExecutorError::invalid_plan(e.to_string()))?;
            if let Some(col) = self.scan_schema.column(pos) {
                out.add_column(col.name.clone(), col.data_type);
            }
            positions.push(pos);
        }
        self.projection = Some(positions);
        self.out_schema = out;
        Ok(())
    }

    fn is_selectable(&self) -> bool {
        true
    }

    fn set_search_condition(&mut self, predicate: &Expr) -> ExecutorResult<()> {
        self.condition = Some(BoundExpr::bind(predicate, &self.scan_schema)?);
        Ok(())
    }
}
