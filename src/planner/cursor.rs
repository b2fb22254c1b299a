//! Dependency-ordered traversal of a MasterPlan
//!
//! Kahn's algorithm over the block DAG: a block becomes eligible once every
//! block it reads has been emitted. Ties are broken by block id, so the
//! order is deterministic for a given plan.

use std::collections::{BTreeMap, VecDeque};

use super::block::{ExecutionBlock, ExecutionBlockId};
use super::master_plan::MasterPlan;

/// Yields every block of a plan exactly once, inputs before consumers.
///
/// A `MasterPlan` has a single sink, so the terminal block is always last.
pub struct ExecutionBlockCursor<'p> {
    plan: &'p MasterPlan,
    pending: BTreeMap<&'p ExecutionBlockId, usize>,
    consumers: BTreeMap<&'p ExecutionBlockId, Vec<&'p ExecutionBlockId>>,
    frontier: VecDeque<&'p ExecutionBlockId>,
    emitted: usize,
}

impl<'p> ExecutionBlockCursor<'p> {
    pub fn new(plan: &'p MasterPlan) -> Self {
        let mut pending = BTreeMap::new();
        let mut consumers: BTreeMap<&ExecutionBlockId, Vec<&ExecutionBlockId>> = BTreeMap::new();
        for block in plan.blocks() {
            pending.insert(&block.id, block.inputs.len());
            for input in &block.inputs {
                consumers.entry(input).or_default().push(&block.id);
            }
        }
        let frontier = plan.leaves().map(|b| &b.id).collect();

        Self {
            plan,
            pending,
            consumers,
            frontier,
            emitted: 0,
        }
    }

    pub fn has_next(&self) -> bool {
        !self.frontier.is_empty()
    }

    /// Blocks not yet emitted
    pub fn remaining(&self) -> usize {
        self.plan.len() - self.emitted
    }

    pub fn next_block(&mut self) -> Option<&'p ExecutionBlock> {
        let id = self.frontier.pop_front()?;
        self.emitted += 1;

        if let Some(readers) = self.consumers.get(id) {
            for reader in readers {
                if let Some(count) = self.pending.get_mut(reader) {
                    *count -= 1;
                    if *count == 0 {
                        self.frontier.push_back(*reader);
                    }
                }
            }
        }

        self.plan.block(id)
    }
}

impl<'p> Iterator for ExecutionBlockCursor<'p> {
    type Item = &'p ExecutionBlock;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::{Expr, LogicalNode};
    use crate::planner::{GlobalOptimizer, GlobalPlanner, QueryId};
    use crate::tuple::{DataType, Schema};
    use std::collections::HashSet;

    fn table(name: &str) -> LogicalNode {
        LogicalNode::scan_table(name, &Schema::empty().with_column("id", DataType::Int4))
    }

    fn star() -> LogicalNode {
        let on = |l: &str, r: &str| Expr::col(format!("{}.id", l)).eq(Expr::col(format!("{}.id", r)));
        let left = table("a").inner_join(table("b"), on("a", "b"));
        let right = table("c").inner_join(table("d"), on("c", "d"));
        LogicalNode::root(
            left.inner_join(right, on("a", "c"))
                .project_columns(&["a.id"])
                .unwrap(),
        )
    }

    #[test]
    fn test_inputs_before_consumers() {
        let plan = GlobalPlanner::new().build(QueryId::new(), &star()).unwrap();
        let mut seen = HashSet::new();
        let mut order = Vec::new();

        let mut cursor = ExecutionBlockCursor::new(&plan);
        while cursor.has_next() {
            let block = cursor.next_block().unwrap();
            for input in &block.inputs {
                assert!(seen.contains(input), "{} emitted before input {}", block.id, input);
            }
            assert!(seen.insert(block.id.clone()));
            order.push(block.id.clone());
        }

        assert_eq!(order.len(), plan.len());
        assert_eq!(order.last(), Some(plan.terminal_id()));
        assert_eq!(cursor.remaining(), 0);
        assert!(cursor.next_block().is_none());
    }

    #[test]
    fn test_order_is_deterministic() {
        let raw = GlobalPlanner::new().build(QueryId::new(), &star()).unwrap();
        let plan = GlobalOptimizer::new(64, 0).optimize(raw).unwrap();

        let first: Vec<u32> = ExecutionBlockCursor::new(&plan).map(|b| b.id.seq).collect();
        let second: Vec<u32> = ExecutionBlockCursor::new(&plan).map(|b| b.id.seq).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), plan.len());
    }

    #[test]
    fn test_single_block_plan() {
        let plan = GlobalPlanner::new()
            .build(QueryId::new(), &LogicalNode::root(table("a")))
            .unwrap();
        let blocks: Vec<&ExecutionBlock> = ExecutionBlockCursor::new(&plan).collect();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].output.is_none());
    }
}
