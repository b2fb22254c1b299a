//! Query scheduling
//!
//! Walks a MasterPlan with an execution block cursor and submits each block
//! once all of its inputs have succeeded. The terminal block is always the
//! last submission.
//!
//! A block whose inputs are not done yet is held back and offered again on
//! the next `submit_next`, so callers may poll until their workers catch up.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::dispatch::{BlockDispatcher, BlockState, DispatchHandle, DispatchRequest};
use super::errors::{CoordinatorError, CoordinatorResult};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::planner::{ExecutionBlock, ExecutionBlockCursor, ExecutionBlockId, MasterPlan};

pub struct QueryScheduler<'p> {
    plan: &'p MasterPlan,
    cursor: ExecutionBlockCursor<'p>,
    /// Taken from the cursor but refused because an input was not done
    pending: Option<&'p ExecutionBlock>,
    dispatcher: &'p dyn BlockDispatcher,
    metrics: Arc<MetricsRegistry>,
    handles: BTreeMap<ExecutionBlockId, DispatchHandle>,
}

impl<'p> QueryScheduler<'p> {
    pub fn new(
        plan: &'p MasterPlan,
        dispatcher: &'p dyn BlockDispatcher,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            plan,
            cursor: ExecutionBlockCursor::new(plan),
            pending: None,
            dispatcher,
            metrics,
            handles: BTreeMap::new(),
        }
    }

    pub fn has_next(&self) -> bool {
        self.pending.is_some() || self.cursor.has_next()
    }

    /// Submits the next block in dependency order.
    ///
    /// Fails when an input of that block has not been dispatched or did not
    /// succeed; the block stays next in line and the call can be retried.
    /// Returns `None` once every block has been submitted.
    pub fn submit_next(&mut self) -> CoordinatorResult<Option<DispatchHandle>> {
        let block = match self.pending.take().or_else(|| self.cursor.next_block()) {
            Some(block) => block,
            None => return Ok(None),
        };

        if let Err(err) = self.check_inputs(block) {
            self.pending = Some(block);
            return Err(err);
        }

        let terminal = block.id == *self.plan.terminal_id();
        let handle = self.dispatcher.submit(DispatchRequest {
            block: block.clone(),
            terminal,
        })?;
        self.metrics.increment_blocks_dispatched();
        log_event_with_fields(
            Event::BlockDispatched,
            &[
                ("block", &block.id.to_string()),
                ("handle", &handle.id.to_string()),
                ("output", &block.output.to_string()),
            ],
        );
        self.handles.insert(block.id.clone(), handle.clone());
        Ok(Some(handle))
    }

    fn check_inputs(&self, block: &ExecutionBlock) -> CoordinatorResult<()> {
        for input in &block.inputs {
            match self.status(input)? {
                BlockState::Succeeded { .. } => {}
                state => {
                    return Err(CoordinatorError::BlockNotSucceeded {
                        block: input.clone(),
                        state: state.to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Current state of a dispatched block
    pub fn status(&self, block: &ExecutionBlockId) -> CoordinatorResult<BlockState> {
        let handle = self
            .handles
            .get(block)
            .ok_or_else(|| CoordinatorError::NotDispatched(block.clone()))?;
        Ok(self.dispatcher.status(handle))
    }

    pub fn handle(&self, block: &ExecutionBlockId) -> Option<&DispatchHandle> {
        self.handles.get(block)
    }
}
