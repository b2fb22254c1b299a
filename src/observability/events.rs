//! Observability events for tessera
//!
//! Every lifecycle step of a query, from receipt through global planning,
//! optimization and block dispatch, plus index build and open, has one
//! explicit typed event.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Engine configuration loaded
    ConfigLoaded,

    // Catalog / DDL
    /// Table registered in the catalog
    TableCreated,
    /// Index registered in the catalog
    IndexRegistered,

    // Query lifecycle
    /// Query received by the coordinator
    QueryReceived,
    /// Query rejected before dispatch
    QueryRejected,
    /// All blocks of a query finished
    QueryCompleted,

    // Global planning
    /// Logical plan partitioned into execution blocks
    GlobalPlanBuilt,
    /// Global optimizer reached a fixpoint
    GlobalPlanOptimized,
    /// One optimizer rewrite applied
    RewriteApplied,

    // Scheduling
    /// Execution block handed to the dispatcher
    BlockDispatched,
    /// Execution block finished on a worker
    BlockCompleted,
    /// Execution block failed on a worker
    BlockFailed,

    // Index engine
    /// Two-level index file written and synced
    IndexBuilt,
    /// Two-level index file opened and verified
    IndexOpened,
    /// Index file failed verification (FATAL)
    IndexCorruption,

    // Storage
    /// Row data failed checksum or framing checks (FATAL)
    DataCorruption,

    // Explain
    /// Explain begins
    ExplainBegin,
    /// Explain complete
    ExplainComplete,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::TableCreated => "TABLE_CREATED",
            Event::IndexRegistered => "INDEX_REGISTERED",

            Event::QueryReceived => "QUERY_BEGIN",
            Event::QueryRejected => "QUERY_REJECTED",
            Event::QueryCompleted => "QUERY_COMPLETE",

            Event::GlobalPlanBuilt => "GLOBAL_PLAN_BUILT",
            Event::GlobalPlanOptimized => "GLOBAL_PLAN_OPTIMIZED",
            Event::RewriteApplied => "GLOBAL_PLAN_REWRITE",

            Event::BlockDispatched => "BLOCK_DISPATCHED",
            Event::BlockCompleted => "BLOCK_COMPLETE",
            Event::BlockFailed => "BLOCK_FAILED",

            Event::IndexBuilt => "INDEX_BUILT",
            Event::IndexOpened => "INDEX_OPENED",
            Event::IndexCorruption => "INDEX_CORRUPTION",

            Event::DataCorruption => "DATA_CORRUPTION",

            Event::ExplainBegin => "EXPLAIN_BEGIN",
            Event::ExplainComplete => "EXPLAIN_COMPLETE",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::IndexCorruption | Event::DataCorruption)
    }

    /// Returns true if this event reports a failure that is not fatal
    pub fn is_failure(&self) -> bool {
        matches!(self, Event::QueryRejected | Event::BlockFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
