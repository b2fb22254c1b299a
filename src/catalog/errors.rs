//! Catalog errors

use thiserror::Error;

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Table descriptor without a name
    #[error("Table name must not be empty")]
    EmptyTableName,

    #[error("Table already exists: {0}")]
    TableExists(String),

    #[error("No such table: {0}")]
    NoSuchTable(String),

    /// Index descriptor without a name
    #[error("Index name must not be empty")]
    EmptyIndexName,

    #[error("Index already exists: {0}")]
    IndexExists(String),

    #[error("No such index: {0}")]
    NoSuchIndex(String),

    /// Index on a column the table does not have
    #[error("Table {table} has no column {column}")]
    NoSuchColumn { table: String, column: String },

    /// Function descriptor without a name
    #[error("Function name must not be empty")]
    EmptyFunctionName,

    /// Same name and argument types as a registered function
    #[error("Function already exists: {0}")]
    FunctionExists(String),

    #[error("No such function: {0}")]
    NoSuchFunction(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
