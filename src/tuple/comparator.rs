//! Tuple comparator
//!
//! Total order over tuples derived from an ordered list of sort keys.
//!
//! Rules:
//! - Keys are compared left to right; the first non-equal key decides.
//! - Nulls are placed by the key's `nulls_first` flag, independent of
//!   the ascending/descending direction.
//! - Non-null values use `Datum::total_cmp`, reversed for descending keys.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::errors::TupleResult;
use super::row::Tuple;
use super::schema::Schema;

/// One sort key: column, direction and null placement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: String,
    pub ascending: bool,
    pub nulls_first: bool,
}

impl SortSpec {
    pub fn new(column: impl Into<String>, ascending: bool, nulls_first: bool) -> Self {
        Self {
            column: column.into(),
            ascending,
            nulls_first,
        }
    }

    /// Ascending, nulls last
    pub fn asc(column: impl Into<String>) -> Self {
        Self::new(column, true, false)
    }

    /// Descending, nulls last
    pub fn desc(column: impl Into<String>) -> Self {
        Self::new(column, false, false)
    }

    pub fn with_nulls_first(mut self, nulls_first: bool) -> Self {
        self.nulls_first = nulls_first;
        self
    }

    pub fn direction_str(&self) -> &'static str {
        if self.ascending {
            "ASC"
        } else {
            "DESC"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SortKey {
    position: usize,
    ascending: bool,
    nulls_first: bool,
}

/// Compares tuples of one schema under a fixed list of sort keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleComparator {
    keys: Vec<SortKey>,
    specs: Vec<SortSpec>,
}

impl TupleComparator {
    /// Resolves every spec's column against `schema`
    pub fn new(schema: &Schema, specs: &[SortSpec]) -> TupleResult<Self> {
        let keys = specs
            .iter()
            .map(|spec| {
                Ok(SortKey {
                    position: schema.index_of(&spec.column)?,
                    ascending: spec.ascending,
                    nulls_first: spec.nulls_first,
                })
            })
            .collect::<TupleResult<Vec<_>>>()?;

        Ok(Self {
            keys,
            specs: specs.to_vec(),
        })
    }

    pub fn specs(&self) -> &[SortSpec] {
        &self.specs
    }

    /// Column positions of the sort keys, in key order
    pub fn key_positions(&self) -> Vec<usize> {
        self.keys.iter().map(|k| k.position).collect()
    }

    pub fn compare(&self, a: &Tuple, b: &Tuple) -> Ordering {
        for key in &self.keys {
            let left = a.get(key.position);
            let right = b.get(key.position);
            let left_null = left.map_or(true, |d| d.is_null());
            let right_null = right.map_or(true, |d| d.is_null());

            let ordering = match (left_null, right_null, left, right) {
                (true, true, _, _) => Ordering::Equal,
                (true, false, _, _) => {
                    if key.nulls_first {
                        Ordering::Less
                    } else {
                        Ordering::Greater
                    }
                }
                (false, true, _, _) => {
                    if key.nulls_first {
                        Ordering::Greater
                    } else {
                        Ordering::Less
                    }
                }
                (false, false, Some(l), Some(r)) => {
                    let natural = l.total_cmp(r);
                    if key.ascending {
                        natural
                    } else {
                        natural.reverse()
                    }
                }
                // non-null implies present
                (false, false, _, _) => Ordering::Equal,
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Stable in-place sort
    pub fn sort(&self, tuples: &mut [Tuple]) {
        tuples.sort_by(|a, b| self.compare(a, b));
    }
}
