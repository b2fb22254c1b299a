//! Global planning for tessera
//!
//! Turns a logical plan into a DAG of execution blocks separated at shuffle
//! boundaries, optimizes the DAG with rule-based rewrites and walks it in
//! dependency order for dispatch.
//!
//! # Pipeline
//!
//! 1. `GlobalPlanner::build` partitions the logical tree into a `MasterPlan`
//! 2. `GlobalOptimizer::optimize` applies pass-through fusion and broadcast
//!    join until a fixpoint or the rewrite cap
//! 3. `ExecutionBlockCursor` yields blocks inputs-first, terminal last
//!
//! Every `MasterPlan` is validated on construction: one sink, no cycles,
//! inputs that exist and match the intermediate scans of each sub-plan.

mod block;
mod cursor;
mod errors;
mod explain;
mod global_planner;
mod master_plan;
mod optimizer;

pub use block::{ExecutionBlock, ExecutionBlockId, QueryId, Shuffle};
pub use cursor::ExecutionBlockCursor;
pub use errors::{PlannerError, PlannerErrorCode, PlannerResult, Severity};
pub use explain::{ExplainBlock, ExplainPlan};
pub use global_planner::GlobalPlanner;
pub use master_plan::MasterPlan;
pub use optimizer::{BroadcastJoin, GlobalOptimizer, PassThroughFusion, RewriteRule};
