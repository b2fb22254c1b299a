//! Logical query plans
//!
//! The input to global planning: a tree of logical operators with resolved
//! output schemas, as produced by an external analyzer or by the builders
//! here. Plans travel as versioned JSON.

mod codec;
mod errors;
mod expr;
mod node;

pub use codec::{decode_plan, encode_plan, PLAN_FORMAT_VERSION};
pub use errors::{LogicalError, LogicalResult};
pub use expr::{BinaryOp, Expr};
pub use node::{
    AggFunc, AggregateExpr, CreateTableNode, FilterNode, GroupByNode, JoinNode, JoinType,
    LogicalNode, ProjectionNode, RootNode, ScanNode, ScanSource, SortNode, Target,
};
