//! EXPLAIN output for master plans
//!
//! Lists execution blocks in dispatch (cursor) order with their inputs,
//! output shuffle, row hint and operator tree. Output is deterministic for a
//! given plan and never affects planning.

use std::fmt;

use serde::Serialize;

use super::cursor::ExecutionBlockCursor;
use super::errors::PlannerError;
use super::master_plan::MasterPlan;

/// One block as shown by EXPLAIN
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplainBlock {
    pub seq: u32,
    pub inputs: Vec<u32>,
    pub output: String,
    pub row_hint: Option<u64>,
    pub terminal: bool,
    /// Operator tree, one line per operator, children indented
    pub operators: Vec<String>,
}

/// Human and machine readable view of a planning outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplainPlan {
    pub accepted: bool,
    pub query_id: Option<String>,
    pub blocks: Vec<ExplainBlock>,
    pub rejection_code: Option<String>,
    pub rejection_reason: Option<String>,
}

impl ExplainPlan {
    pub fn from_plan(plan: &MasterPlan) -> Self {
        let blocks = ExecutionBlockCursor::new(plan)
            .map(|block| ExplainBlock {
                seq: block.id.seq,
                inputs: block.inputs.iter().map(|id| id.seq).collect(),
                output: block.output.to_string(),
                row_hint: block.row_hint,
                terminal: block.id == *plan.terminal_id(),
                operators: block.plan.to_string().lines().map(str::to_string).collect(),
            })
            .collect();

        Self {
            accepted: true,
            query_id: Some(plan.query_id().to_string()),
            blocks,
            rejection_code: None,
            rejection_reason: None,
        }
    }

    pub fn from_error(err: &PlannerError) -> Self {
        let reason = match err.block() {
            Some(block) => format!("{} (block: {})", err.message(), block),
            None => err.message().to_string(),
        };
        Self {
            accepted: false,
            query_id: None,
            blocks: Vec::new(),
            rejection_code: Some(err.code().code().to_string()),
            rejection_reason: Some(reason),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== EXPLAIN PLAN ===")?;

        if !self.accepted {
            writeln!(f, "Status: REJECTED")?;
            if let Some(code) = &self.rejection_code {
                writeln!(f, "Error Code: {}", code)?;
            }
            if let Some(reason) = &self.rejection_reason {
                writeln!(f, "Reason: {}", reason)?;
            }
            return Ok(());
        }

        writeln!(f, "Status: ACCEPTED")?;
        if let Some(id) = &self.query_id {
            writeln!(f, "Query: {}", id)?;
        }
        writeln!(f, "Blocks: {}", self.blocks.len())?;

        for block in &self.blocks {
            write!(f, "#{}", block.seq)?;
            if block.inputs.is_empty() {
                write!(f, " [leaf]")?;
            } else {
                let inputs: Vec<String> = block.inputs.iter().map(|s| format!("#{}", s)).collect();
                write!(f, " inputs=[{}]", inputs.join(", "))?;
            }
            write!(f, " output={}", block.output)?;
            if let Some(rows) = block.row_hint {
                write!(f, " rows~{}", rows)?;
            }
            if block.terminal {
                write!(f, " (terminal)")?;
            }
            writeln!(f)?;
            for line in &block.operators {
                writeln!(f, "  {}", line)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::{Expr, LogicalNode};
    use crate::planner::{GlobalOptimizer, GlobalPlanner, QueryId};
    use crate::tuple::{DataType, Schema};

    fn join_plan() -> MasterPlan {
        let schema = Schema::empty().with_column("id", DataType::Int4);
        let root = LogicalNode::root(
            LogicalNode::scan_table("emp", &schema)
                .with_row_hint(1_000_000)
                .inner_join(
                    LogicalNode::scan_table("dept", &schema).with_row_hint(20),
                    Expr::col("emp.id").eq(Expr::col("dept.id")),
                ),
        );
        let raw = GlobalPlanner::new().build(QueryId::new(), &root).unwrap();
        GlobalOptimizer::new(64, 10_000).optimize(raw).unwrap()
    }

    #[test]
    fn test_explain_accepted_plan() {
        let explain = ExplainPlan::from_plan(&join_plan());

        assert!(explain.accepted);
        assert_eq!(explain.blocks.len(), 3);
        assert!(explain.blocks.last().unwrap().terminal);
        assert_eq!(explain.blocks[1].output, "BROADCAST");

        let output = explain.to_string();
        assert!(output.contains("ACCEPTED"));
        assert!(output.contains("SCAN dept"));
        assert!(output.contains("(terminal)"));
    }

    #[test]
    fn test_explain_rejected_plan() {
        let err = PlannerError::planning("Plan has no scan leaf");
        let explain = ExplainPlan::from_error(&err);

        assert!(!explain.accepted);
        assert_eq!(explain.rejection_code, Some("TESSERA_PLANNING_ERROR".into()));
        assert!(explain.to_string().contains("REJECTED"));
    }

    #[test]
    fn test_explain_deterministic() {
        let plan = join_plan();
        assert_eq!(
            ExplainPlan::from_plan(&plan).to_string(),
            ExplainPlan::from_plan(&plan).to_string()
        );
        assert!(ExplainPlan::from_plan(&plan).to_json().contains("\"seq\": 3"));
    }
}
