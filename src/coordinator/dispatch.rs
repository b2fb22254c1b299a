//! Block dispatch contract
//!
//! The scheduler hands ready blocks to a `BlockDispatcher` and later polls
//! their state. `ChannelDispatcher` queues requests on an unbounded tokio
//! channel; whoever owns the matching `DispatchQueue` executes them and
//! reports back through it.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::errors::{CoordinatorError, CoordinatorResult};
use crate::planner::{ExecutionBlock, ExecutionBlockId};

/// One block ready to run
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub block: ExecutionBlock,
    /// The terminal block produces the query result
    pub terminal: bool,
}

/// Receipt for a submitted block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchHandle {
    pub id: u64,
    pub block: ExecutionBlockId,
    pub submitted_at: DateTime<Utc>,
}

/// Lifecycle of a dispatched block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockState {
    Queued,
    Running,
    Succeeded { rows: u64 },
    Failed { reason: String, fatal: bool },
    /// The handle was not issued by this dispatcher
    Unknown,
}

impl BlockState {
    pub fn is_finished(&self) -> bool {
        matches!(self, BlockState::Succeeded { .. } | BlockState::Failed { .. })
    }
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockState::Queued => write!(f, "QUEUED"),
            BlockState::Running => write!(f, "RUNNING"),
            BlockState::Succeeded { rows } => write!(f, "SUCCEEDED ({} rows)", rows),
            BlockState::Failed { reason, .. } => write!(f, "FAILED ({})", reason),
            BlockState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

pub trait BlockDispatcher: Send + Sync {
    fn submit(&self, request: DispatchRequest) -> CoordinatorResult<DispatchHandle>;

    fn status(&self, handle: &DispatchHandle) -> BlockState;
}

type StateTable = Arc<RwLock<HashMap<u64, BlockState>>>;

/// A request as seen by the worker side
#[derive(Debug)]
pub struct Dispatched {
    pub handle: DispatchHandle,
    pub request: DispatchRequest,
}

/// Producer side: submits onto the channel and answers status queries
#[derive(Debug)]
pub struct ChannelDispatcher {
    sender: mpsc::UnboundedSender<Dispatched>,
    states: StateTable,
    next_id: AtomicU64,
}

/// Consumer side: yields queued requests and records their outcome
#[derive(Debug)]
pub struct DispatchQueue {
    receiver: mpsc::UnboundedReceiver<Dispatched>,
    states: StateTable,
}

impl ChannelDispatcher {
    pub fn new() -> (Self, DispatchQueue) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let states: StateTable = Arc::new(RwLock::new(HashMap::new()));
        (
            Self {
                sender,
                states: Arc::clone(&states),
                next_id: AtomicU64::new(1),
            },
            DispatchQueue { receiver, states },
        )
    }
}

impl BlockDispatcher for ChannelDispatcher {
    fn submit(&self, request: DispatchRequest) -> CoordinatorResult<DispatchHandle> {
        let handle = DispatchHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            block: request.block.id.clone(),
            submitted_at: Utc::now(),
        };
        if let Ok(mut states) = self.states.write() {
            states.insert(handle.id, BlockState::Queued);
        }
        self.sender
            .send(Dispatched {
                handle: handle.clone(),
                request,
            })
            .map_err(|_| CoordinatorError::QueueClosed)?;
        Ok(handle)
    }

    fn status(&self, handle: &DispatchHandle) -> BlockState {
        self.states
            .read()
            .ok()
            .and_then(|states| states.get(&handle.id).cloned())
            .unwrap_or(BlockState::Unknown)
    }
}

impl DispatchQueue {
    /// Next queued request without waiting
    pub fn try_next(&mut self) -> Option<Dispatched> {
        self.receiver.try_recv().ok()
    }

    /// Waits for the next request; `None` once every dispatcher is dropped
    /// and the queue is drained
    pub async fn next(&mut self) -> Option<Dispatched> {
        self.receiver.recv().await
    }

    pub fn report(&self, handle: &DispatchHandle, state: BlockState) {
        if let Ok(mut states) = self.states.write() {
            states.insert(handle.id, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::LogicalNode;
    use crate::planner::QueryId;
    use crate::tuple::{DataType, Schema};

    fn request(seq: u32) -> DispatchRequest {
        let plan = LogicalNode::scan_table("t", &Schema::empty().with_column("a", DataType::Int4));
        DispatchRequest {
            block: ExecutionBlock::new(ExecutionBlockId::new(QueryId::new(), seq), plan),
            terminal: false,
        }
    }

    #[test]
    fn test_submit_then_report() {
        let (dispatcher, mut queue) = ChannelDispatcher::new();
        let handle = dispatcher.submit(request(1)).unwrap();
        assert_eq!(dispatcher.status(&handle), BlockState::Queued);

        let dispatched = queue.try_next().unwrap();
        assert_eq!(dispatched.handle, handle);
        assert_eq!(dispatched.request.block.id.seq, 1);

        queue.report(&handle, BlockState::Succeeded { rows: 3 });
        assert_eq!(dispatcher.status(&handle), BlockState::Succeeded { rows: 3 });
        assert!(dispatcher.status(&handle).is_finished());
        assert!(queue.try_next().is_none());
    }

    #[test]
    fn test_handles_are_distinct() {
        let (dispatcher, _queue) = ChannelDispatcher::new();
        let a = dispatcher.submit(request(1)).unwrap();
        let b = dispatcher.submit(request(2)).unwrap();
        assert_ne!(a.id, b.id);
        assert!(b.submitted_at >= a.submitted_at);
    }

    #[test]
    fn test_submit_after_queue_dropped() {
        let (dispatcher, queue) = ChannelDispatcher::new();
        drop(queue);
        assert!(matches!(
            dispatcher.submit(request(1)),
            Err(CoordinatorError::QueueClosed)
        ));
    }

    #[tokio::test]
    async fn test_queue_ends_when_dispatcher_dropped() {
        let (dispatcher, mut queue) = ChannelDispatcher::new();
        dispatcher.submit(request(1)).unwrap();
        drop(dispatcher);

        assert!(queue.next().await.is_some());
        assert!(queue.next().await.is_none());
    }
}
