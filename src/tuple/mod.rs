//! Tuple model for tessera
//!
//! Values, schemas, the row/key codec and the tuple comparator.
//!
//! The comparator is the single source of truth for ordering. It backs the
//! two-level index writer's ordering precondition, the index reader's
//! binary searches, and the sort operator.

mod codec;
mod comparator;
mod datum;
mod errors;
mod schema;
mod row;

pub use codec::{decode_tuple, encode_tuple, encoded_len, ByteReader};
pub(crate) use codec::put_string;
pub use comparator::{SortSpec, TupleComparator};
pub use datum::Datum;
pub use errors::{TupleError, TupleResult};
pub use schema::{Column, DataType, Schema};
pub use row::Tuple;
