//! tessera - distributed query planning over execution blocks
//!
//! A logical plan is split into a DAG of execution blocks, rewritten by
//! global rules and dispatched in dependency order. Blocks run physical
//! operators over row files, optionally through two-level sorted indexes.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod executor;
pub mod index;
pub mod logical;
pub mod observability;
pub mod planner;
pub mod storage;
pub mod tuple;
