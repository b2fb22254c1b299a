//! Row storage for tessera
//!
//! Table data and materialized intermediate block outputs are stored as
//! append-only row files. Each record carries a CRC32 checksum and is
//! addressed by its byte offset, which is exactly what the two-level index
//! stores as the data offset of an entry.
//!
//! # Invariants
//!
//! - Append-only (no in-place updates)
//! - Checksum verified on every read
//! - Offsets returned by the appender are stable for the life of the file

mod checksum;
mod errors;
mod reader;
mod record;
mod writer;

pub use checksum::{compute_checksum, verify_checksum};
pub use errors::{StorageError, StorageErrorCode, StorageResult};
pub use reader::{Fragment, RowReader};
pub use record::{RowRecord, MIN_RECORD_SIZE};
pub use writer::RowAppender;
