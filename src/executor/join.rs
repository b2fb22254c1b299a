//! Nested-loop join
//!
//! The right input is materialized once in `init`; the left input streams.
//! Output rows are `left ++ right` over the merged schema, in left order and
//! then right order.

use super::context::CancelSignal;
use super::errors::ExecutorResult;
use super::eval::BoundExpr;
use super::exec::PhysicalExec;
use crate::logical::{Expr, JoinType};
use crate::tuple::{Schema, Tuple};

pub struct NestedLoopJoinExec {
    join_type: JoinType,
    left: Box<dyn PhysicalExec>,
    right: Box<dyn PhysicalExec>,
    condition: Option<BoundExpr>,
    schema: Schema,
    right_rows: Vec<Tuple>,
    current: Option<Tuple>,
    right_pos: usize,
    matched: bool,
    cancel: CancelSignal,
}

impl NestedLoopJoinExec {
    pub fn new(
        join_type: JoinType,
        left: Box<dyn PhysicalExec>,
        right: Box<dyn PhysicalExec>,
        condition: Option<&Expr>,
    ) -> ExecutorResult<Self> {
        let schema = Schema::merge(left.schema(), right.schema());
        let condition = condition
            .map(|c| BoundExpr::bind(c, &schema))
            .transpose()?;
        Ok(Self {
            join_type,
            left,
            right,
            condition,
            schema,
            right_rows: Vec::new(),
            current: None,
            right_pos: 0,
            matched: false,
            cancel: CancelSignal::new(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    fn advance_left(&mut self) -> ExecutorResult<bool> {
        self.current = self.left.next()?;
        self.right_pos = 0;
        self.matched = false;
        Ok(self.current.is_some())
    }
}

impl PhysicalExec for NestedLoopJoinExec {
    fn name(&self) -> &'static str {
        "NestedLoopJoin"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn init(&mut self) -> ExecutorResult<()> {
        self.left.init()?;
        self.right.init()?;
        self.right_rows.clear();
        while let Some(row) = self.right.next()? {
            self.right_rows.push(row);
        }
        self.current = None;
        self.right_pos = 0;
        self.matched = false;
        Ok(())
    }

    fn next(&mut self) -> ExecutorResult<Option<Tuple>> {
        self.cancel.check()?;
        loop {
            if self.current.is_none() && !self.advance_left()? {
                return Ok(None);
            }
            let left_row = match &self.current {
                Some(row) => row,
                None => continue,
            };

            while let Some(right_row) = self.right_rows.get(self.right_pos) {
                self.right_pos += 1;
                let joined = left_row.concat(right_row);
                let keep = match &self.condition {
                    Some(cond) => cond.eval_predicate(&joined)?,
                    None => true,
                };
                if keep {
                    self.matched = true;
                    return Ok(Some(joined));
                }
            }

            let padded = (self.join_type == JoinType::LeftOuter && !self.matched)
                .then(|| left_row.concat(&Tuple::nulls(self.right.schema().len())));
            self.current = None;
            if padded.is_some() {
                return Ok(padded);
            }
        }
    }

    fn reset(&mut self) -> ExecutorResult<()> {
        self.left.reset()?;
        self.current = None;
        self.right_pos = 0;
        self.matched = false;
        Ok(())
    }

    fn close(&mut self) -> ExecutorResult<()> {
        self.right_rows.clear();
        self.left.close()?;
        self.right.close()
    }
}
