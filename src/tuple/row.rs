//! Row values

use std::fmt;

use serde::{Deserialize, Serialize};

use super::datum::Datum;

/// An ordered list of values, positionally matched to a [`Schema`](super::Schema).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    values: Vec<Datum>,
}

impl Tuple {
    pub fn new(values: Vec<Datum>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&Datum> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[Datum] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Datum> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Left ++ right, used by joins
    pub fn concat(&self, other: &Tuple) -> Tuple {
        let mut values = Vec::with_capacity(self.len() + other.len());
        values.extend(self.values.iter().cloned());
        values.extend(other.values.iter().cloned());
        Tuple { values }
    }

    /// Picks the given positions, in order
    pub fn project(&self, positions: &[usize]) -> Tuple {
        Tuple {
            values: positions
                .iter()
                .map(|&i| self.values.get(i).cloned().unwrap_or(Datum::Null))
                .collect(),
        }
    }

    /// A tuple of `n` nulls
    pub fn nulls(n: usize) -> Tuple {
        Tuple {
            values: vec![Datum::Null; n],
        }
    }
}

impl From<Vec<Datum>> for Tuple {
    fn from(values: Vec<Datum>) -> Self {
        Tuple { values }
    }
}

impl FromIterator<Datum> for Tuple {
    fn from_iter<I: IntoIterator<Item = Datum>>(iter: I) -> Self {
        Tuple {
            values: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}
