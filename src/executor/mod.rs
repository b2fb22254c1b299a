//! Block executor subsystem for tessera
//!
//! Turns the logical plan of one execution block into a tree of pull-based
//! physical operators and runs it on a worker.
//!
//! # Operators
//!
//! - Scans: `SeqScanExec` over row fragments, `IndexScanExec` over a
//!   two-level index and its data file
//! - Row operators: filter, project
//! - Blocking operators: sort, nested-loop join, hash aggregate
//!
//! # Invariants
//!
//! - Operators are deterministic: same inputs, same rows in the same order
//! - Every read of stored rows is checksum-verified
//! - Corruption surfaces as a FATAL error and is never skipped
//! - A cancelled task stops at the next row with TESSERA_EXEC_CANCELLED

mod aggregate;
mod context;
mod errors;
mod eval;
mod exec;
mod executor;
mod filters;
mod index_scan;
mod join;
mod physical_planner;
mod scan;
mod sorter;

pub use aggregate::HashAggregateExec;
pub use context::{CancelSignal, IndexBinding, TaskContext};
pub use errors::{ExecutorError, ExecutorErrorCode, ExecutorResult, Severity};
pub use eval::BoundExpr;
pub use exec::{collect_rows, PhysicalExec, Scanner};
pub use executor::{BlockExecutor, BlockOutput};
pub use filters::{FilterExec, ProjectExec, ValuesExec};
pub use index_scan::{IndexLookup, IndexScanExec};
pub use join::NestedLoopJoinExec;
pub use physical_planner::PhysicalPlanner;
pub use scan::SeqScanExec;
pub use sorter::SortExec;
