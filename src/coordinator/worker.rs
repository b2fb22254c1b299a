//! In-process worker
//!
//! Executes dispatched blocks one at a time against a task context. Every
//! successful block's output is registered as an intermediate input, so
//! consumers dispatched later can scan it.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use super::dispatch::{BlockState, DispatchQueue, Dispatched};
use super::errors::{CoordinatorError, CoordinatorResult};
use crate::executor::{BlockExecutor, BlockOutput, TaskContext};
use crate::observability::{log_event_with_fields, Event};

pub struct LocalWorker {
    queue: DispatchQueue,
    ctx: TaskContext,
    work_dir: PathBuf,
    outputs: BTreeMap<u32, BlockOutput>,
}

impl LocalWorker {
    /// Block outputs are written under `work_dir`
    pub fn new(queue: DispatchQueue, ctx: TaskContext, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            queue,
            ctx,
            work_dir: work_dir.into(),
            outputs: BTreeMap::new(),
        }
    }

    /// Runs the next queued block, if any.
    ///
    /// A failed block is reported as `Failed` and returned as the error.
    pub fn run_next(&mut self) -> CoordinatorResult<Option<BlockOutput>> {
        match self.queue.try_next() {
            Some(dispatched) => self.execute(dispatched).map(Some),
            None => Ok(None),
        }
    }

    /// Runs blocks until every dispatcher is dropped; returns how many ran
    pub async fn serve(mut self) -> CoordinatorResult<usize> {
        let mut ran = 0;
        while let Some(dispatched) = self.queue.next().await {
            self.execute(dispatched)?;
            ran += 1;
        }
        Ok(ran)
    }

    pub fn output(&self, seq: u32) -> Option<&BlockOutput> {
        self.outputs.get(&seq)
    }

    fn execute(&mut self, dispatched: Dispatched) -> CoordinatorResult<BlockOutput> {
        let Dispatched { handle, request } = dispatched;
        let block = request.block;
        let block_id = block.id.to_string();
        self.queue.report(&handle, BlockState::Running);

        fs::create_dir_all(&self.work_dir)?;
        let path = self.work_dir.join(format!("block_{}.rows", block.id.seq));

        match BlockExecutor::run(&block, &self.ctx, &path) {
            Ok(output) => {
                self.queue
                    .report(&handle, BlockState::Succeeded { rows: output.rows });
                self.ctx.metrics().increment_blocks_completed();
                log_event_with_fields(
                    Event::BlockCompleted,
                    &[
                        ("block", &block_id),
                        ("rows", &output.rows.to_string()),
                        ("terminal", if request.terminal { "true" } else { "false" }),
                    ],
                );
                self.ctx.add_intermediate(output.seq, output.fragment.clone());
                self.outputs.insert(output.seq, output.clone());
                Ok(output)
            }
            Err(err) => {
                self.queue.report(
                    &handle,
                    BlockState::Failed {
                        reason: err.to_string(),
                        fatal: err.is_fatal(),
                    },
                );
                self.ctx.metrics().increment_blocks_failed();
                log_event_with_fields(
                    Event::BlockFailed,
                    &[("block", &block_id), ("reason", &err.to_string())],
                );
                Err(CoordinatorError::Execution {
                    block: block.id,
                    source: err,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::coordinator::{BlockDispatcher, ChannelDispatcher, DispatchRequest};
    use crate::logical::{Expr, LogicalNode};
    use crate::observability::MetricsRegistry;
    use crate::planner::{ExecutionBlock, ExecutionBlockId, QueryId};
    use crate::storage::{Fragment, RowAppender};
    use crate::tuple::{DataType, Datum, Schema, Tuple};
    use tempfile::TempDir;

    fn schema() -> Schema {
        Schema::empty().with_column("n", DataType::Int4)
    }

    fn context(dir: &TempDir) -> TaskContext {
        let path = dir.path().join("nums.rows");
        let mut out = RowAppender::create(&path).unwrap();
        for n in 0..10 {
            out.append(&Tuple::new(vec![Datum::Int4(n)])).unwrap();
        }
        out.close().unwrap();
        let mut ctx = TaskContext::new(Arc::new(MetricsRegistry::new()));
        ctx.add_table_fragment("nums", Fragment::new("nums", path));
        ctx
    }

    fn request(query: QueryId, seq: u32, plan: LogicalNode) -> DispatchRequest {
        DispatchRequest {
            block: ExecutionBlock::new(ExecutionBlockId::new(query, seq), plan),
            terminal: false,
        }
    }

    #[test]
    fn test_run_next_reports_success() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, queue) = ChannelDispatcher::new();
        let mut worker = LocalWorker::new(queue, context(&dir), dir.path().join("work"));

        let plan = LogicalNode::scan_table("nums", &schema()).filter(Expr::col("n").lt(Expr::lit(3)));
        let handle = dispatcher.submit(request(QueryId::new(), 1, plan)).unwrap();

        let output = worker.run_next().unwrap().unwrap();
        assert_eq!(output.rows, 3);
        assert_eq!(dispatcher.status(&handle), BlockState::Succeeded { rows: 3 });
        assert!(worker.output(1).is_some());
        assert!(worker.run_next().unwrap().is_none());
    }

    #[test]
    fn test_failure_reported_and_returned() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, queue) = ChannelDispatcher::new();
        let mut worker = LocalWorker::new(queue, context(&dir), dir.path().join("work"));

        let plan = LogicalNode::scan_table("missing", &schema());
        let handle = dispatcher.submit(request(QueryId::new(), 1, plan)).unwrap();

        let err = worker.run_next().unwrap_err();
        assert!(matches!(err, CoordinatorError::Execution { .. }));
        assert!(matches!(dispatcher.status(&handle), BlockState::Failed { fatal: false, .. }));
    }

    #[tokio::test]
    async fn test_serve_drains_queue() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, queue) = ChannelDispatcher::new();
        let worker = LocalWorker::new(queue, context(&dir), dir.path().join("work"));

        let query = QueryId::new();
        let scan = LogicalNode::scan_table("nums", &schema());
        dispatcher.submit(request(query, 1, scan.clone())).unwrap();
        dispatcher.submit(request(query, 2, scan)).unwrap();
        drop(dispatcher);

        assert_eq!(worker.serve().await.unwrap(), 2);
    }
}
