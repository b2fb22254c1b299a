//! CLI module for tessera
//!
//! Provides command-line interface for:
//! - explain: plan, optimize and print a logical plan
//! - index-info: print a two-level index header

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{explain, index_info, index_info_json, render_index_info, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
