//! Sorted two-level index engine
//!
//! A bulk-built, immutable on-disk index mapping sort keys to row data
//! offsets. The top level samples the first key of every `load_factor`
//! entries and is held in memory; the bottom level holds every entry and is
//! read one block per lookup.
//!
//! # Invariants
//!
//! - Entries are non-decreasing under the index comparator; duplicates allowed
//! - An equality lookup returns the first entry with the key
//! - Every section is checksummed and verified on open
//! - Files are written once and never modified

mod errors;
mod format;
mod reader;
mod writer;

pub use errors::{IndexError, IndexErrorCode, IndexResult, Severity};
pub use format::{IndexHeader, MAGIC, VERSION};
pub use reader::{IndexEntry, IndexHit, IndexPosition, IndexScan, TwoLevelIndexReader};
pub use writer::{IndexSummary, TwoLevelIndexWriter};
