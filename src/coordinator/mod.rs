//! Query coordinator
//!
//! Accepts DDL and queries, plans them into execution blocks and drives the
//! blocks through a dispatcher in dependency order. A query is rejected
//! before any dispatch when planning or optimization fails, and stops at the
//! first failed block.

mod dispatch;
mod engine;
mod errors;
mod scheduler;
mod worker;

pub use dispatch::{
    BlockDispatcher, BlockState, ChannelDispatcher, DispatchHandle, DispatchQueue,
    DispatchRequest, Dispatched,
};
pub use engine::{QueryEngine, QueryResult};
pub use errors::{CoordinatorError, CoordinatorResult};
pub use scheduler::QueryScheduler;
pub use worker::LocalWorker;
