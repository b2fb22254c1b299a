//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit status.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::index::IndexError;
use crate::logical::LogicalError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file missing, malformed or invalid
    ConfigError,
    /// Plan file could not be decoded
    PlanError,
    /// Index file could not be opened
    IndexError,
    /// I/O error (files, stdout)
    IoError,
    /// The plan was rejected by the planner or optimizer
    Rejected,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "TESSERA_CLI_CONFIG_ERROR",
            Self::PlanError => "TESSERA_CLI_PLAN_ERROR",
            Self::IndexError => "TESSERA_CLI_INDEX_ERROR",
            Self::IoError => "TESSERA_CLI_IO_ERROR",
            Self::Rejected => "TESSERA_CLI_REJECTED",
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::Rejected, msg)
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::new(CliErrorCode::ConfigError, e.to_string())
    }
}

impl From<LogicalError> for CliError {
    fn from(e: LogicalError) -> Self {
        Self::new(CliErrorCode::PlanError, e.to_string())
    }
}

impl From<IndexError> for CliError {
    fn from(e: IndexError) -> Self {
        Self::new(CliErrorCode::IndexError, e.to_string())
    }
}

pub type CliResult<T> = Result<T, CliError>;
