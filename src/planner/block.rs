//! Execution blocks
//!
//! An execution block is the unit of distributed scheduling: a slice of the
//! logical plan bounded by shuffle boundaries, whose child blocks appear as
//! intermediate scans in its sub-plan.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logical::{LogicalNode, ScanSource};
use crate::tuple::{Schema, SortSpec};

/// Identity of one submitted query
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueryId(Uuid);

impl QueryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q_{}", self.0.simple())
    }
}

/// Block identity: owning query plus a sequence number unique within it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExecutionBlockId {
    pub query: QueryId,
    pub seq: u32,
}

impl ExecutionBlockId {
    pub fn new(query: QueryId, seq: u32) -> Self {
        Self { query, seq }
    }
}

impl fmt::Display for ExecutionBlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.query, self.seq)
    }
}

/// How a block's materialized output is distributed to its consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shuffle {
    /// Terminal block: output is the query result
    None,
    /// Hash-partitioned on `keys`; no keys means a single partition
    Hash { keys: Vec<String> },
    /// Range-partitioned on sort keys
    Range { specs: Vec<SortSpec> },
    /// Replicated in full to every consumer task
    Broadcast,
}

impl Shuffle {
    pub fn is_none(&self) -> bool {
        matches!(self, Shuffle::None)
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, Shuffle::Broadcast)
    }
}

impl fmt::Display for Shuffle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shuffle::None => write!(f, "NONE"),
            Shuffle::Hash { keys } => write!(f, "HASH({})", keys.join(", ")),
            Shuffle::Range { specs } => {
                let specs: Vec<String> = specs
                    .iter()
                    .map(|s| format!("{} {}", s.column, s.direction_str()))
                    .collect();
                write!(f, "RANGE({})", specs.join(", "))
            }
            Shuffle::Broadcast => write!(f, "BROADCAST"),
        }
    }
}

/// One node of the execution block DAG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionBlock {
    pub id: ExecutionBlockId,
    /// Blocks whose output this block reads; empty for leaf blocks
    pub inputs: Vec<ExecutionBlockId>,
    pub output: Shuffle,
    pub row_hint: Option<u64>,
    pub plan: LogicalNode,
}

impl ExecutionBlock {
    pub fn new(id: ExecutionBlockId, plan: LogicalNode) -> Self {
        Self {
            id,
            inputs: Vec::new(),
            output: Shuffle::None,
            row_hint: None,
            plan,
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<ExecutionBlockId>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_output(mut self, output: Shuffle) -> Self {
        self.output = output;
        self
    }

    pub fn with_row_hint(mut self, rows: Option<u64>) -> Self {
        self.row_hint = rows;
        self
    }

    pub fn schema(&self) -> &Schema {
        self.plan.schema()
    }

    pub fn is_leaf(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Sequence numbers of the blocks read by intermediate scans in the
    /// sub-plan, in tree order
    pub fn scanned_blocks(&self) -> Vec<u32> {
        let mut out = Vec::new();
        collect_intermediate_scans(&self.plan, &mut out);
        out
    }

    /// Names of the catalog tables scanned by the sub-plan
    pub fn scanned_tables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_table_scans(&self.plan, &mut out);
        out
    }
}

fn collect_intermediate_scans(node: &LogicalNode, out: &mut Vec<u32>) {
    if let LogicalNode::Scan(scan) = node {
        if let ScanSource::Intermediate { seq } = scan.source {
            out.push(seq);
        }
    }
    for child in node.children() {
        collect_intermediate_scans(child, out);
    }
}

fn collect_table_scans<'a>(node: &'a LogicalNode, out: &mut Vec<&'a str>) {
    if let LogicalNode::Scan(scan) = node {
        if let ScanSource::Table { table } = &scan.source {
            out.push(table);
        }
    }
    for child in node.children() {
        collect_table_scans(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::Expr;
    use crate::tuple::DataType;

    fn schema(prefix: &str) -> Schema {
        Schema::empty()
            .with_column(format!("{}.id", prefix), DataType::Int4)
            .with_column(format!("{}.name", prefix), DataType::Text)
    }

    #[test]
    fn test_block_id_display_and_order() {
        let query = QueryId::new();
        let a = ExecutionBlockId::new(query, 2);
        let b = ExecutionBlockId::new(query, 10);
        assert!(a < b);
        assert!(a.to_string().starts_with("q_"));
        assert!(a.to_string().ends_with("#2"));
    }

    #[test]
    fn test_scanned_blocks_in_tree_order() {
        let query = QueryId::new();
        let plan = LogicalNode::intermediate_scan(3, schema("l"), None).inner_join(
            LogicalNode::intermediate_scan(1, schema("r"), None),
            Expr::col("l.id").eq(Expr::col("r.id")),
        );
        let block = ExecutionBlock::new(ExecutionBlockId::new(query, 4), plan)
            .with_inputs(vec![ExecutionBlockId::new(query, 3), ExecutionBlockId::new(query, 1)]);

        assert_eq!(block.scanned_blocks(), vec![3, 1]);
        assert!(block.scanned_tables().is_empty());
        assert!(!block.is_leaf());
        assert_eq!(block.schema().len(), 4);
    }

    #[test]
    fn test_shuffle_display() {
        assert_eq!(Shuffle::None.to_string(), "NONE");
        assert_eq!(
            Shuffle::Hash {
                keys: vec!["e.deptname".into()]
            }
            .to_string(),
            "HASH(e.deptname)"
        );
        assert_eq!(
            Shuffle::Range {
                specs: vec![SortSpec::desc("score")]
            }
            .to_string(),
            "RANGE(score DESC)"
        );
    }
}
