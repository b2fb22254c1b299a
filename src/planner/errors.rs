//! Planner error types
//!
//! Error codes:
//! - TESSERA_PLANNING_ERROR (REJECT)
//! - TESSERA_OPTIMIZATION_LIMIT_EXCEEDED (REJECT)
//!
//! Both abort the query before any execution block is dispatched.

use std::fmt;

use super::block::ExecutionBlockId;

/// Severity levels for planner errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Query rejected; nothing was dispatched
    Reject,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
        }
    }
}

/// Planner-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerErrorCode {
    /// Malformed logical tree or invalid execution block DAG
    TesseraPlanningError,
    /// Optimizer did not reach a fixpoint within the rewrite cap
    TesseraOptimizationLimitExceeded,
}

impl PlannerErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            PlannerErrorCode::TesseraPlanningError => "TESSERA_PLANNING_ERROR",
            PlannerErrorCode::TesseraOptimizationLimitExceeded => {
                "TESSERA_OPTIMIZATION_LIMIT_EXCEEDED"
            }
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Reject
    }
}

impl fmt::Display for PlannerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Planner error with the failing block when one is known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerError {
    code: PlannerErrorCode,
    message: String,
    block: Option<ExecutionBlockId>,
}

impl PlannerError {
    pub fn planning(reason: impl Into<String>) -> Self {
        Self {
            code: PlannerErrorCode::TesseraPlanningError,
            message: reason.into(),
            block: None,
        }
    }

    pub fn planning_at(block: ExecutionBlockId, reason: impl Into<String>) -> Self {
        Self {
            code: PlannerErrorCode::TesseraPlanningError,
            message: reason.into(),
            block: Some(block),
        }
    }

    pub fn optimization_limit(max_rewrites: usize, pending_rule: &str) -> Self {
        Self {
            code: PlannerErrorCode::TesseraOptimizationLimitExceeded,
            message: format!(
                "No fixpoint after {} rewrites; rule '{}' still applies",
                max_rewrites, pending_rule
            ),
            block: None,
        }
    }

    pub fn code(&self) -> PlannerErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn block(&self) -> Option<&ExecutionBlockId> {
        self.block.as_ref()
    }
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code.code(), self.message)?;
        if let Some(ref block) = self.block {
            write!(f, " (block: {})", block)?;
        }
        Ok(())
    }
}

impl std::error::Error for PlannerError {}

/// Result type for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;
