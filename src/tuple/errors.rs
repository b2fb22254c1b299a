//! Tuple-level errors (column resolution and codec failures)

use thiserror::Error;

/// Result type for tuple operations
pub type TupleResult<T> = Result<T, TupleError>;

/// Errors raised while resolving columns or decoding tuples
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TupleError {
    /// A sort key or expression names a column that is not in the schema
    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    /// A column name matches more than one column of the schema
    #[error("Ambiguous column '{0}'")]
    AmbiguousColumn(String),

    /// Input ended before a complete value could be read
    #[error("Truncated input: needed {needed} bytes at position {at}, {available} available")]
    Truncated {
        needed: usize,
        at: usize,
        available: usize,
    },

    /// Unknown datum or data type tag
    #[error("Invalid type tag {0}")]
    InvalidTag(u8),

    /// Text payload was not valid UTF-8
    #[error("Invalid UTF-8 in text value at position {0}")]
    InvalidUtf8(usize),
}
