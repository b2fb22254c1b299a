//! Executor error types
//!
//! Error codes:
//! - TESSERA_EXEC_CANCELLED (ERROR)
//! - TESSERA_EXEC_INVALID_PLAN (ERROR)
//! - TESSERA_EXEC_EVAL_ERROR (ERROR)
//! - TESSERA_EXEC_STORAGE (ERROR, FATAL on data corruption)
//! - TESSERA_EXEC_INDEX (ERROR, FATAL on index corruption)
//!
//! An execution error aborts only the block that raised it.

use std::fmt;

use crate::index::IndexError;
use crate::storage::StorageError;

/// Severity levels for executor errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The block failed; its inputs are still usable
    Error,
    /// Stored data can no longer be trusted
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Executor-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorErrorCode {
    /// The task's cancel signal fired
    TesseraExecCancelled,
    /// Sub-plan cannot be turned into operators (unknown table, DDL, bad column)
    TesseraExecInvalidPlan,
    /// Expression evaluation failed (type mismatch, overflow, division by zero)
    TesseraExecEvalError,
    /// Row storage failure
    TesseraExecStorage,
    /// Index lookup failure
    TesseraExecIndex,
}

impl ExecutorErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ExecutorErrorCode::TesseraExecCancelled => "TESSERA_EXEC_CANCELLED",
            ExecutorErrorCode::TesseraExecInvalidPlan => "TESSERA_EXEC_INVALID_PLAN",
            ExecutorErrorCode::TesseraExecEvalError => "TESSERA_EXEC_EVAL_ERROR",
            ExecutorErrorCode::TesseraExecStorage => "TESSERA_EXEC_STORAGE",
            ExecutorErrorCode::TesseraExecIndex => "TESSERA_EXEC_INDEX",
        }
    }
}

impl fmt::Display for ExecutorErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Executor error with code, severity and message
#[derive(Debug)]
pub struct ExecutorError {
    code: ExecutorErrorCode,
    severity: Severity,
    message: String,
}

impl ExecutorError {
    pub fn cancelled() -> Self {
        Self {
            code: ExecutorErrorCode::TesseraExecCancelled,
            severity: Severity::Error,
            message: "Execution cancelled".to_string(),
        }
    }

    pub fn invalid_plan(reason: impl Into<String>) -> Self {
        Self {
            code: ExecutorErrorCode::TesseraExecInvalidPlan,
            severity: Severity::Error,
            message: reason.into(),
        }
    }

    pub fn eval(reason: impl Into<String>) -> Self {
        Self {
            code: ExecutorErrorCode::TesseraExecEvalError,
            severity: Severity::Error,
            message: reason.into(),
        }
    }

    pub fn code(&self) -> ExecutorErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl From<StorageError> for ExecutorError {
    fn from(err: StorageError) -> Self {
        Self {
            code: ExecutorErrorCode::TesseraExecStorage,
            severity: if err.is_fatal() {
                Severity::Fatal
            } else {
                Severity::Error
            },
            message: err.to_string(),
        }
    }
}

impl From<IndexError> for ExecutorError {
    fn from(err: IndexError) -> Self {
        Self {
            code: ExecutorErrorCode::TesseraExecIndex,
            severity: if err.is_fatal() {
                Severity::Fatal
            } else {
                Severity::Error
            },
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.code.code(), self.message)
    }
}

impl std::error::Error for ExecutorError {}

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ExecutorErrorCode::TesseraExecCancelled.code(),
            "TESSERA_EXEC_CANCELLED"
        );
        assert_eq!(
            ExecutorErrorCode::TesseraExecInvalidPlan.code(),
            "TESSERA_EXEC_INVALID_PLAN"
        );
        assert_eq!(ExecutorErrorCode::TesseraExecIndex.code(), "TESSERA_EXEC_INDEX");
    }

    #[test]
    fn test_corruption_stays_fatal() {
        let err: ExecutorError = IndexError::corruption("top level checksum mismatch").into();
        assert_eq!(err.code(), ExecutorErrorCode::TesseraExecIndex);
        assert!(err.is_fatal());

        let err: ExecutorError = StorageError::corruption_at_offset(12, "bad crc").into();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("TESSERA_EXEC_STORAGE"));
    }

    #[test]
    fn test_eval_error_not_fatal() {
        let err = ExecutorError::eval("division by zero");
        assert!(!err.is_fatal());
        assert!(err.to_string().starts_with("[ERROR] TESSERA_EXEC_EVAL_ERROR"));
    }
}
