//! MasterPlan: the validated execution block DAG of one query

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::block::{ExecutionBlock, ExecutionBlockId, QueryId};
use super::errors::{PlannerError, PlannerResult};

/// Execution blocks of one query plus the terminal block.
///
/// Construction validates the DAG:
/// - every block belongs to `query_id` and ids are unique
/// - every input exists and is read by an intermediate scan of the consumer
/// - the graph is acyclic
/// - the terminal block is the only sink and the only block without a shuffle
#[derive(Debug, Clone, PartialEq)]
pub struct MasterPlan {
    query_id: QueryId,
    blocks: BTreeMap<ExecutionBlockId, ExecutionBlock>,
    terminal: ExecutionBlockId,
}

impl MasterPlan {
    pub fn new(
        query_id: QueryId,
        blocks: Vec<ExecutionBlock>,
        terminal: ExecutionBlockId,
    ) -> PlannerResult<Self> {
        if blocks.is_empty() {
            return Err(PlannerError::planning("A master plan needs at least one block"));
        }

        let mut map = BTreeMap::new();
        for block in blocks {
            if block.id.query != query_id {
                return Err(PlannerError::planning_at(
                    block.id.clone(),
                    format!("Block belongs to query {}, plan is for {}", block.id.query, query_id),
                ));
            }
            let id = block.id.clone();
            if map.insert(id.clone(), block).is_some() {
                return Err(PlannerError::planning_at(id, "Duplicate block id"));
            }
        }

        if !map.contains_key(&terminal) {
            return Err(PlannerError::planning_at(terminal, "Terminal block is not in the plan"));
        }

        let plan = Self {
            query_id,
            blocks: map,
            terminal,
        };
        plan.validate()?;
        Ok(plan)
    }

    fn validate(&self) -> PlannerResult<()> {
        for block in self.blocks.values() {
            let mut seen = BTreeSet::new();
            for input in &block.inputs {
                if input == &block.id {
                    return Err(PlannerError::planning_at(block.id.clone(), "Block reads itself"));
                }
                if !self.blocks.contains_key(input) {
                    return Err(PlannerError::planning_at(
                        block.id.clone(),
                        format!("Input {} does not exist", input),
                    ));
                }
                if !seen.insert(input.seq) {
                    return Err(PlannerError::planning_at(
                        block.id.clone(),
                        format!("Input {} listed twice", input),
                    ));
                }
            }

            let scanned: BTreeSet<u32> = block.scanned_blocks().into_iter().collect();
            if scanned != seen {
                return Err(PlannerError::planning_at(
                    block.id.clone(),
                    format!(
                        "Intermediate scans {:?} do not match inputs {:?}",
                        scanned, seen
                    ),
                ));
            }

            let is_terminal = block.id == self.terminal;
            if is_terminal != block.output.is_none() {
                return Err(PlannerError::planning_at(
                    block.id.clone(),
                    if is_terminal {
                        "Terminal block must not shuffle its output"
                    } else {
                        "Only the terminal block may have no output shuffle"
                    },
                ));
            }
        }

        let consumers = self.consumer_map();
        for (id, readers) in &consumers {
            if *id == self.terminal && !readers.is_empty() {
                return Err(PlannerError::planning_at(id.clone(), "Terminal block has consumers"));
            }
            if *id != self.terminal && readers.is_empty() {
                return Err(PlannerError::planning_at(
                    id.clone(),
                    "Block output is never read; a plan has exactly one sink",
                ));
            }
        }

        // Kahn's algorithm; anything left unvisited sits on a cycle
        let mut pending: BTreeMap<&ExecutionBlockId, usize> = self
            .blocks
            .values()
            .map(|b| (&b.id, b.inputs.len()))
            .collect();
        let mut ready: VecDeque<&ExecutionBlockId> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0usize;
        while let Some(id) = ready.pop_front() {
            visited += 1;
            for consumer in consumers.get(id).into_iter().flatten() {
                if let Some(n) = pending.get_mut(consumer) {
                    *n -= 1;
                    if *n == 0 {
                        ready.push_back(consumer);
                    }
                }
            }
        }
        if visited != self.blocks.len() {
            let stuck = pending
                .iter()
                .find(|(_, n)| **n > 0)
                .map(|(id, _)| (*id).clone());
            let err = "Execution blocks form a cycle";
            return Err(match stuck {
                Some(id) => PlannerError::planning_at(id, err),
                None => PlannerError::planning(err),
            });
        }

        Ok(())
    }

    fn consumer_map(&self) -> BTreeMap<ExecutionBlockId, Vec<ExecutionBlockId>> {
        let mut map: BTreeMap<ExecutionBlockId, Vec<ExecutionBlockId>> = self
            .blocks
            .keys()
            .map(|id| (id.clone(), Vec::new()))
            .collect();
        for block in self.blocks.values() {
            for input in &block.inputs {
                if let Some(readers) = map.get_mut(input) {
                    readers.push(block.id.clone());
                }
            }
        }
        map
    }

    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    pub fn terminal_id(&self) -> &ExecutionBlockId {
        &self.terminal
    }

    pub fn terminal(&self) -> &ExecutionBlock {
        // validated at construction
        &self.blocks[&self.terminal]
    }

    pub fn block(&self, id: &ExecutionBlockId) -> Option<&ExecutionBlock> {
        self.blocks.get(id)
    }

    pub fn block_by_seq(&self, seq: u32) -> Option<&ExecutionBlock> {
        self.blocks.get(&ExecutionBlockId::new(self.query_id, seq))
    }

    /// Blocks ordered by id
    pub fn blocks(&self) -> impl Iterator<Item = &ExecutionBlock> {
        self.blocks.values()
    }

    /// Blocks that read the output of `id`, ordered by id
    pub fn consumers(&self, id: &ExecutionBlockId) -> Vec<&ExecutionBlockId> {
        self.blocks
            .values()
            .filter(|b| b.inputs.contains(id))
            .map(|b| &b.id)
            .collect()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &ExecutionBlock> {
        self.blocks.values().filter(|b| b.is_leaf())
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of input edges
    pub fn edge_count(&self) -> usize {
        self.blocks.values().map(|b| b.inputs.len()).sum()
    }

    /// Takes the plan apart so a rewrite can assemble a new one
    pub fn into_parts(self) -> (QueryId, Vec<ExecutionBlock>, ExecutionBlockId) {
        (self.query_id, self.blocks.into_values().collect(), self.terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::{Expr, LogicalNode};
    use crate::planner::{PlannerErrorCode, Shuffle};
    use crate::tuple::{DataType, Schema};

    fn table_block(query: QueryId, seq: u32, table: &str) -> ExecutionBlock {
        let schema = Schema::empty().with_column("id", DataType::Int4);
        ExecutionBlock::new(
            ExecutionBlockId::new(query, seq),
            LogicalNode::scan_table(table, &schema),
        )
        .with_output(Shuffle::Hash {
            keys: vec![format!("{}.id", table)],
        })
    }

    fn join_block(query: QueryId, seq: u32, left: u32, right: u32) -> ExecutionBlock {
        let l = Schema::empty().with_column("a.id", DataType::Int4);
        let r = Schema::empty().with_column("b.id", DataType::Int4);
        let plan = LogicalNode::intermediate_scan(left, l, None).inner_join(
            LogicalNode::intermediate_scan(right, r, None),
            Expr::col("a.id").eq(Expr::col("b.id")),
        );
        ExecutionBlock::new(ExecutionBlockId::new(query, seq), plan).with_inputs(vec![
            ExecutionBlockId::new(query, left),
            ExecutionBlockId::new(query, right),
        ])
    }

    #[test]
    fn test_valid_three_block_plan() {
        let q = QueryId::new();
        let plan = MasterPlan::new(
            q,
            vec![table_block(q, 1, "a"), table_block(q, 2, "b"), join_block(q, 3, 1, 2)],
            ExecutionBlockId::new(q, 3),
        )
        .unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.edge_count(), 2);
        assert_eq!(plan.leaves().count(), 2);
        assert_eq!(plan.consumers(&ExecutionBlockId::new(q, 1)).len(), 1);
        assert_eq!(plan.terminal().id.seq, 3);
    }

    #[test]
    fn test_cycle_rejected() {
        let q = QueryId::new();
        let a = join_block(q, 1, 2, 3).with_output(Shuffle::Hash { keys: vec![] });
        let b = join_block(q, 2, 1, 3).with_output(Shuffle::Hash { keys: vec![] });
        let c = table_block(q, 3, "c");
        let sink = ExecutionBlock::new(
            ExecutionBlockId::new(q, 4),
            LogicalNode::intermediate_scan(1, Schema::empty(), None),
        )
        .with_inputs(vec![ExecutionBlockId::new(q, 1)]);

        let err = MasterPlan::new(q, vec![a, b, c, sink], ExecutionBlockId::new(q, 4)).unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::TesseraPlanningError);
        assert!(err.message().contains("cycle"));
    }

    #[test]
    fn test_second_sink_rejected() {
        let q = QueryId::new();
        let err = MasterPlan::new(
            q,
            vec![
                table_block(q, 1, "a"),
                table_block(q, 2, "b"),
                join_block(q, 3, 1, 2),
                table_block(q, 4, "orphan"),
            ],
            ExecutionBlockId::new(q, 3),
        )
        .unwrap_err();
        assert_eq!(err.block().map(|b| b.seq), Some(4));
    }

    #[test]
    fn test_missing_input_rejected() {
        let q = QueryId::new();
        let err = MasterPlan::new(
            q,
            vec![table_block(q, 1, "a"), join_block(q, 3, 1, 2)],
            ExecutionBlockId::new(q, 3),
        )
        .unwrap_err();
        assert!(err.message().contains("does not exist"));
    }

    #[test]
    fn test_terminal_with_shuffle_rejected() {
        let q = QueryId::new();
        let err = MasterPlan::new(q, vec![table_block(q, 1, "a")], ExecutionBlockId::new(q, 1))
            .unwrap_err();
        assert!(err.message().contains("Terminal"));
    }
}
