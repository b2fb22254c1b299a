//! Storage error types
//!
//! Error codes:
//! - TESSERA_STORAGE_IO_ERROR (ERROR severity)
//! - TESSERA_DATA_CORRUPTION (FATAL severity)

use std::fmt;
use std::io;

/// Severity levels for storage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, caller decides
    Error,
    /// Data cannot be trusted
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

/// Storage-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// Disk I/O failure (surfaced, never retried)
    TesseraStorageIoError,
    /// Checksum or framing failure
    TesseraDataCorruption,
}

impl StorageErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            StorageErrorCode::TesseraStorageIoError => "TESSERA_STORAGE_IO_ERROR",
            StorageErrorCode::TesseraDataCorruption => "TESSERA_DATA_CORRUPTION",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            StorageErrorCode::TesseraStorageIoError => Severity::Error,
            StorageErrorCode::TesseraDataCorruption => Severity::Fatal,
        }
    }
}

impl fmt::Display for StorageErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Storage error with code, message and optional byte offset
#[derive(Debug)]
pub struct StorageError {
    code: StorageErrorCode,
    message: String,
    offset: Option<u64>,
    source: Option<io::Error>,
}

impl StorageError {
    /// I/O failure with its source
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StorageErrorCode::TesseraStorageIoError,
            message: message.into(),
            offset: None,
            source: Some(source),
        }
    }

    /// Corruption detected at a byte offset
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::TesseraDataCorruption,
            message: reason.into(),
            offset: Some(offset),
            source: None,
        }
    }

    pub fn code(&self) -> StorageErrorCode {
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

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(offset) = self.offset {
            write!(f, " (byte_offset: {})", offset)?;
        }
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            StorageErrorCode::TesseraStorageIoError.code(),
            "TESSERA_STORAGE_IO_ERROR"
        );
        assert_eq!(
            StorageErrorCode::TesseraDataCorruption.code(),
            "TESSERA_DATA_CORRUPTION"
        );
    }

    #[test]
    fn test_corruption_is_fatal_io_is_not() {
        assert!(StorageError::corruption_at_offset(0, "bad crc").is_fatal());
        let io = StorageError::io_error("read", io::Error::new(io::ErrorKind::Other, "disk"));
        assert!(!io.is_fatal());
    }

    #[test]
    fn test_display_includes_offset() {
        let err = StorageError::corruption_at_offset(1024, "checksum mismatch");
        let display = format!("{}", err);
        assert!(display.contains("TESSERA_DATA_CORRUPTION"));
        assert!(display.contains("FATAL"));
        assert!(display.contains("byte_offset: 1024"));
    }
}
