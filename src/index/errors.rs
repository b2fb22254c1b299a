//! Index error types
//!
//! Error codes:
//! - TESSERA_INDEX_CORRUPTION (FATAL)
//! - TESSERA_INDEX_ORDER_VIOLATION (ERROR)
//! - TESSERA_INDEX_INVALID_KEY (ERROR)
//! - TESSERA_INDEX_IO_ERROR (ERROR)

use std::fmt;
use std::io;

use crate::tuple::TupleError;

/// Severity levels for index errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The operation fails; the index file is still trustworthy
    Error,
    /// The index file cannot be trusted
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

/// Index-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexErrorCode {
    /// Bad magic, unknown version, checksum mismatch or inconsistent directory
    TesseraIndexCorruption,
    /// Writer received a key smaller than its predecessor
    TesseraIndexOrderViolation,
    /// Key does not match the index key schema, or sort specs do not resolve
    TesseraIndexInvalidKey,
    /// Disk I/O failure (surfaced, never retried)
    TesseraIndexIoError,
}

impl IndexErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            IndexErrorCode::TesseraIndexCorruption => "TESSERA_INDEX_CORRUPTION",
            IndexErrorCode::TesseraIndexOrderViolation => "TESSERA_INDEX_ORDER_VIOLATION",
            IndexErrorCode::TesseraIndexInvalidKey => "TESSERA_INDEX_INVALID_KEY",
            IndexErrorCode::TesseraIndexIoError => "TESSERA_INDEX_IO_ERROR",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            IndexErrorCode::TesseraIndexCorruption => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for IndexErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Index error with code, message and optional file offset or entry position
#[derive(Debug)]
pub struct IndexError {
    code: IndexErrorCode,
    message: String,
    offset: Option<u64>,
    source: Option<io::Error>,
}

impl IndexError {
    pub fn corruption(reason: impl Into<String>) -> Self {
        Self {
            code: IndexErrorCode::TesseraIndexCorruption,
            message: reason.into(),
            offset: None,
            source: None,
        }
    }

    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: IndexErrorCode::TesseraIndexCorruption,
            message: reason.into(),
            offset: Some(offset),
            source: None,
        }
    }

    /// Out-of-order key at entry `position`
    pub fn order_violation(position: u64, reason: impl Into<String>) -> Self {
        Self {
            code: IndexErrorCode::TesseraIndexOrderViolation,
            message: format!("entry {}: {}", position, reason.into()),
            offset: None,
            source: None,
        }
    }

    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self {
            code: IndexErrorCode::TesseraIndexInvalidKey,
            message: reason.into(),
            offset: None,
            source: None,
        }
    }

    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: IndexErrorCode::TesseraIndexIoError,
            message: message.into(),
            offset: None,
            source: Some(source),
        }
    }

    /// A tuple that fails to decode inside an index section is corruption
    pub(crate) fn from_decode(section: &str, offset: u64, err: TupleError) -> Self {
        Self::corruption_at_offset(offset, format!("{} section: {}", section, err))
    }

    pub fn code(&self) -> IndexErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code.code(), self.message)?;
        if let Some(offset) = self.offset {
            write!(f, " (byte_offset: {})", offset)?;
        }
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for IndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;
