//! Logical plan errors

use thiserror::Error;

use crate::tuple::TupleError;

/// Result type for logical plan construction and decoding
pub type LogicalResult<T> = Result<T, LogicalError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LogicalError {
    /// Column resolution failed while building a node
    #[error(transparent)]
    Column(#[from] TupleError),

    /// An expression's operand types do not fit its operator
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Aggregate applied to an argument it cannot take
    #[error("Invalid aggregate: {0}")]
    InvalidAggregate(String),

    /// Plan envelope carries a version this build cannot read
    #[error("Unsupported plan version {found} (supported: {supported})")]
    UnsupportedVersion { found: u64, supported: u32 },

    /// Malformed plan JSON
    #[error("Plan codec error: {0}")]
    Codec(String),
}
