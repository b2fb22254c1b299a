//! Row filtering and projection operators

use super::context::CancelSignal;
use super::errors::ExecutorResult;
use super::eval::BoundExpr;
use super::exec::PhysicalExec;
use crate::logical::{Expr, Target};
use crate::tuple::{Column, Schema, Tuple};

/// Passes through the rows of its child for which the predicate is true
pub struct FilterExec {
    child: Box<dyn PhysicalExec>,
    predicate: BoundExpr,
    cancel: CancelSignal,
}

impl FilterExec {
    pub fn new(child: Box<dyn PhysicalExec>, predicate: &Expr) -> ExecutorResult<Self> {
        let predicate = BoundExpr::bind(predicate, child.schema())?;
        Ok(Self {
            child,
            predicate,
            cancel: CancelSignal::new(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }
}

impl PhysicalExec for FilterExec {
    fn name(&self) -> &'static str {
        "Filter"
    }

    fn schema(&self) -> &Schema {
        self.child.schema()
    }

    fn init(&mut self) -> ExecutorResult<()> {
        self.child.init()
    }

    fn next(&mut self) -> ExecutorResult<Option<Tuple>> {
        self.cancel.check()?;
        while let Some(row) = self.child.next()? {
            if self.predicate.eval_predicate(&row)? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn reset(&mut self) -> ExecutorResult<()> {
        self.child.reset()
    }

    fn close(&mut self) -> ExecutorResult<()> {
        self.child.close()
    }
}

/// Evaluates one expression per target column
pub struct ProjectExec {
    child: Box<dyn PhysicalExec>,
    targets: Vec<BoundExpr>,
    schema: Schema,
    cancel: CancelSignal,
}

impl ProjectExec {
    pub fn new(child: Box<dyn PhysicalExec>, targets: &[Target]) -> ExecutorResult<Self> {
        let bound = targets
            .iter()
            .map(|t| BoundExpr::bind(&t.expr, child.schema()))
            .collect::<ExecutorResult<Vec<_>>>()?;
        let schema = Schema::new(
            targets
                .iter()
                .map(|t| Column::new(t.name.clone(), t.data_type))
                .collect(),
        );
        Ok(Self {
            child,
            targets: bound,
            schema,
            cancel: CancelSignal::new(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }
}

impl PhysicalExec for ProjectExec {
    fn name(&self) -> &'static str {
        "Project"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn init(&mut self) -> ExecutorResult<()> {
        self.child.init()
    }

    fn next(&mut self) -> ExecutorResult<Option<Tuple>> {
        self.cancel.check()?;
        let row = match self.child.next()? {
            Some(row) => row,
            None => return Ok(None),
        };
        let values = self
            .targets
            .iter()
            .map(|t| t.eval(&row))
            .collect::<ExecutorResult<Vec<_>>>()?;
        Ok(Some(Tuple::new(values)))
    }

    fn reset(&mut self) -> ExecutorResult<()> {
        self.child.reset()
    }

    fn close(&mut self) -> ExecutorResult<()> {
        self.child.close()
    }
}

/// Operator over rows held in memory; the input side of tests and of
/// materialized join inputs
pub struct ValuesExec {
    schema: Schema,
    rows: Vec<Tuple>,
    position: usize,
}

impl ValuesExec {
    pub fn new(schema: Schema, rows: Vec<Tuple>) -> Self {
        Self {
            schema,
            rows,
            position: 0,
        }
    }
}

impl PhysicalExec for ValuesExec {
    fn name(&self) -> &'static str {
        "Values"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn init(&mut self) -> ExecutorResult<()> {
        self.position = 0;
        Ok(())
    }

    fn next(&mut self) -> ExecutorResult<Option<Tuple>> {
        let row = self.rows.get(self.position).cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }

    fn reset(&mut self) -> ExecutorResult<()> {
        self.init()
    }

    fn close(&mut self) -> ExecutorResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{collect_rows, ExecutorErrorCode};
    use crate::tuple::{DataType, Datum};

    fn input() -> Box<dyn PhysicalExec> {
        let schema = Schema::empty()
            .with_column("t.a", DataType::Int4)
            .with_column("t.b", DataType::Text);
        let rows = (1..=5)
            .map(|i| Tuple::new(vec![Datum::Int4(i), Datum::text(format!("r{}", i))]))
            .collect();
        Box::new(ValuesExec::new(schema, rows))
    }

    #[test]
    fn test_filter_keeps_true_rows() {
        let mut exec = FilterExec::new(input(), &Expr::col("a").gt(Expr::lit(3))).unwrap();
        let rows = collect_rows(&mut exec).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(0), Some(&Datum::Int4(4)));
    }

    #[test]
    fn test_filter_unknown_column_is_invalid_plan() {
        let err = FilterExec::new(input(), &Expr::col("zz").eq(Expr::lit(1)))
            .err()
            .unwrap();
        assert_eq!(err.code(), ExecutorErrorCode::TesseraExecInvalidPlan);
    }

    #[test]
    fn test_project_computes_targets() {
        let targets = vec![
            Target::new(Expr::col("b"), "b", DataType::Text),
            Target::new(
                Expr::col("a").binary(crate::logical::BinaryOp::Multiply, Expr::lit(10)),
                "a10",
                DataType::Int4,
            ),
        ];
        let mut exec = ProjectExec::new(input(), &targets).unwrap();
        assert_eq!(exec.schema().len(), 2);

        let rows = collect_rows(&mut exec).unwrap();
        assert_eq!(rows[1], Tuple::new(vec![Datum::text("r2"), Datum::Int4(20)]));
    }
}
