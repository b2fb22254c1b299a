//! Coordinator errors

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::executor::ExecutorError;
use crate::index::IndexError;
use crate::planner::{ExecutionBlockId, PlannerError};
use crate::storage::StorageError;

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Rejected before any block was dispatched
    #[error(transparent)]
    Planning(#[from] PlannerError),

    /// First failure reported by a worker
    #[error("Block {block} failed: {source}")]
    Execution {
        block: ExecutionBlockId,
        #[source]
        source: ExecutorError,
    },

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Worker side of the dispatch queue is gone
    #[error("Dispatch queue closed")]
    QueueClosed,

    #[error("Block {0} was never dispatched")]
    NotDispatched(ExecutionBlockId),

    /// Block finished in a state that does not allow its consumers to run
    #[error("Block {block} ended as {state}")]
    BlockNotSucceeded { block: ExecutionBlockId, state: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoordinatorError {
    /// Corruption or other unrecoverable failure
    pub fn is_fatal(&self) -> bool {
        match self {
            CoordinatorError::Execution { source, .. } => source.is_fatal(),
            CoordinatorError::Index(e) => e.is_fatal(),
            CoordinatorError::Storage(e) => e.is_fatal(),
            _ => false,
        }
    }
}
