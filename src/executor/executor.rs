//! Execution of one block on a worker
//!
//! Execution flow (strict order):
//! 1. Build the operator tree for the block plan
//! 2. Pull every row through it
//! 3. Append rows to the block's output file (or collect them for the
//!    terminal block)
//! 4. Close operators and the output file
//!
//! Operators are closed on both success and failure. A failed block leaves
//! a partial output file behind that no consumer is ever pointed at.

use std::path::Path;

use super::context::TaskContext;
use super::errors::{ExecutorError, ExecutorResult};
use super::exec::PhysicalExec;
use super::physical_planner::PhysicalPlanner;
use crate::observability::{log_event_with_fields, Event, ObservationScope};
use crate::planner::ExecutionBlock;
use crate::storage::{Fragment, RowAppender};
use crate::tuple::Tuple;

/// Materialized output of one finished block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOutput {
    /// Block sequence number; consumers scan it as `block #seq`
    pub seq: u32,
    pub rows: u64,
    pub fragment: Fragment,
}

/// Runs execution blocks against the inputs registered in a task context
pub struct BlockExecutor;

impl BlockExecutor {
    /// Runs `block` and writes its rows to `output`
    pub fn run(
        block: &ExecutionBlock,
        ctx: &TaskContext,
        output: &Path,
    ) -> ExecutorResult<BlockOutput> {
        let block_id = block.id.to_string();
        let scope = ObservationScope::with_fields("BLOCK_EXEC", &[("block", &block_id)]);

        let result = Self::write_rows(block, ctx, output);
        match &result {
            Ok(rows) => scope.complete_with_fields(&[("rows", &rows.to_string())]),
            Err(err) => Self::report_failure(scope, &block_id, err),
        }

        Ok(BlockOutput {
            seq: block.id.seq,
            rows: result?,
            fragment: Fragment::new(format!("block_{}", block.id.seq), output),
        })
    }

    /// Runs `block` and returns its rows in output order
    #[cfg(test)]
    pub(crate) fn collect(block: &ExecutionBlock, ctx: &TaskContext) -> ExecutorResult<Vec<Tuple>> {
        let block_id = block.id.to_string();
        let scope = ObservationScope::with_fields("BLOCK_EXEC", &[("block", &block_id)]);

        let mut rows = Vec::new();
        let result = PhysicalPlanner::create_exec(&block.plan, ctx)
            .and_then(|mut exec| drain(exec.as_mut(), |row| {
                rows.push(row);
                Ok(())
            }));
        match result {
            Ok(()) => {
                scope.complete_with_fields(&[("rows", &rows.len().to_string())]);
                Ok(rows)
            }
            Err(err) => {
                Self::report_failure(scope, &block_id, &err);
                Err(err)
            }
        }
    }

    /// Returns the number of rows written
    fn write_rows(block: &ExecutionBlock, ctx: &TaskContext, output: &Path) -> ExecutorResult<u64> {
        let mut exec = PhysicalPlanner::create_exec(&block.plan, ctx)?;
        let mut appender = RowAppender::create(output)?;
        let mut rows = 0u64;
        drain(exec.as_mut(), |row| {
            appender.append(&row)?;
            rows += 1;
            Ok(())
        })?;
        appender.close()?;
        Ok(rows)
    }

    fn report_failure(scope: ObservationScope<'_>, block_id: &str, err: &ExecutorError) {
        let reason = err.to_string();
        if err.is_fatal() {
            log_event_with_fields(Event::DataCorruption, &[("block", block_id), ("reason", &reason)]);
            scope.fail_fatal(&reason);
        } else {
            scope.fail(&reason);
        }
    }
}

/// Pulls every row into `sink`, closing the operator tree either way
fn drain(
    exec: &mut dyn PhysicalExec,
    mut sink: impl FnMut(Tuple) -> ExecutorResult<()>,
) -> ExecutorResult<()> {
    let pulled = exec.init().and_then(|()| {
        while let Some(row) = exec.next()? {
            sink(row)?;
        }
        Ok(())
    });
    let closed = exec.close();
    pulled.and(closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::executor::ExecutorErrorCode;
    use crate::logical::{Expr, LogicalNode};
    use crate::observability::MetricsRegistry;
    use crate::planner::{ExecutionBlockId, QueryId};
    use crate::storage::RowReader;
    use crate::tuple::{DataType, Datum, Schema};
    use tempfile::TempDir;

    fn schema() -> Schema {
        Schema::empty()
            .with_column("id", DataType::Int4)
            .with_column("name", DataType::Text)
    }

    fn setup(dir: &TempDir) -> TaskContext {
        let path = dir.path().join("emp.rows");
        let mut out = RowAppender::create(&path).unwrap();
        for id in 0..6 {
            out.append(&Tuple::new(vec![Datum::Int4(id), Datum::text(format!("e{}", id))]))
                .unwrap();
        }
        out.close().unwrap();

        let mut ctx = TaskContext::new(Arc::new(MetricsRegistry::new()));
        ctx.add_table_fragment("emp", Fragment::new("emp", path));
        ctx
    }

    fn block(seq: u32, plan: LogicalNode) -> ExecutionBlock {
        ExecutionBlock::new(ExecutionBlockId::new(QueryId::new(), seq), plan)
    }

    #[test]
    fn test_run_writes_block_output() {
        let dir = TempDir::new().unwrap();
        let ctx = setup(&dir);
        let plan = LogicalNode::scan_table("emp", &schema()).filter(Expr::col("id").lt(Expr::lit(4)));
        let out_path = dir.path().join("block_1.rows");

        let output = BlockExecutor::run(&block(1, plan), &ctx, &out_path).unwrap();
        assert_eq!(output.seq, 1);
        assert_eq!(output.rows, 4);

        let rows = RowReader::open(&output.fragment.path).unwrap().read_all().unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[3].get(1), Some(&Datum::text("e3")));
    }

    #[test]
    fn test_consumer_reads_intermediate() {
        let dir = TempDir::new().unwrap();
        let mut ctx = setup(&dir);
        let producer = block(1, LogicalNode::scan_table("emp", &schema()));
        let output = BlockExecutor::run(&producer, &ctx, &dir.path().join("b1.rows")).unwrap();
        ctx.add_intermediate(output.seq, output.fragment);

        let consumer_schema = producer.schema().clone();
        let plan = LogicalNode::intermediate_scan(1, consumer_schema, Some(output.rows))
            .filter(Expr::col("emp.id").gt_eq(Expr::lit(5)));
        let rows = BlockExecutor::collect(&block(2, plan), &ctx).unwrap();
        assert_eq!(rows, vec![Tuple::new(vec![Datum::Int4(5), Datum::text("e5")])]);
    }

    #[test]
    fn test_cancelled_block_fails() {
        let dir = TempDir::new().unwrap();
        let ctx = setup(&dir);
        ctx.cancel_signal().cancel();

        let err = BlockExecutor::collect(&block(1, LogicalNode::scan_table("emp", &schema())), &ctx)
            .unwrap_err();
        assert_eq!(err.code(), ExecutorErrorCode::TesseraExecCancelled);
    }
}
