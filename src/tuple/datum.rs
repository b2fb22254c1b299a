//! Scalar values

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::schema::DataType;

/// A single typed value.
///
/// `Null` is untyped; every other variant maps to exactly one [`DataType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Datum {
    Null,
    Bool(bool),
    Int4(i32),
    Int8(i64),
    Float8(f64),
    Text(String),
}

impl Datum {
    /// Creates a text datum
    pub fn text(v: impl Into<String>) -> Self {
        Datum::Text(v.into())
    }

    /// Returns the data type, or `None` for `Null`
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Datum::Null => None,
            Datum::Bool(_) => Some(DataType::Bool),
            Datum::Int4(_) => Some(DataType::Int4),
            Datum::Int8(_) => Some(DataType::Int8),
            Datum::Float8(_) => Some(DataType::Float8),
            Datum::Text(_) => Some(DataType::Text),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view of Int4/Int8 values
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int4(v) => Some(i64::from(*v)),
            Datum::Int8(v) => Some(*v),
            _ => None,
        }
    }

    /// Floating view of any numeric value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Int4(v) => Some(f64::from(*v)),
            Datum::Int8(v) => Some(*v as f64),
            Datum::Float8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Datum::Int4(_) | Datum::Int8(_) | Datum::Float8(_))
    }

    /// Rank of the value class; values of different classes order by rank.
    fn class_rank(&self) -> u8 {
        match self {
            Datum::Null => 0,
            Datum::Bool(_) => 1,
            Datum::Int4(_) | Datum::Int8(_) | Datum::Float8(_) => 2,
            Datum::Text(_) => 3,
        }
    }

    /// Total order over values, ignoring SQL null placement.
    ///
    /// Integers of different widths compare numerically; any comparison
    /// involving a Float8 uses `f64::total_cmp`. `Null` sorts before all
    /// values here; callers that honour nulls-first/last handle nulls before
    /// reaching this method.
    pub fn total_cmp(&self, other: &Datum) -> Ordering {
        match (self, other) {
            (Datum::Null, Datum::Null) => Ordering::Equal,
            (Datum::Bool(a), Datum::Bool(b)) => a.cmp(b),
            (Datum::Text(a), Datum::Text(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = a.as_f64().unwrap_or(f64::NAN);
                    let y = b.as_f64().unwrap_or(f64::NAN);
                    x.total_cmp(&y)
                }
            },
            (a, b) => a.class_rank().cmp(&b.class_rank()),
        }
    }

    /// SQL equality: `None` when either side is null
    pub fn sql_eq(&self, other: &Datum) -> Option<bool> {
        if self.is_null() || other.is_null() {
            return None;
        }
        Some(self.total_cmp(other) == Ordering::Equal)
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Bool(b) => write!(f, "{}", b),
            Datum::Int4(v) => write!(f, "{}", v),
            Datum::Int8(v) => write!(f, "{}", v),
            Datum::Float8(v) => write!(f, "{}", v),
            Datum::Text(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<i32> for Datum {
    fn from(v: i32) -> Self {
        Datum::Int4(v)
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Int8(v)
    }
}

impl From<f64> for Datum {
    fn from(v: f64) -> Self {
        Datum::Float8(v)
    }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self {
        Datum::Bool(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::Text(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_widths_compare_numerically() {
        assert_eq!(Datum::Int4(7).total_cmp(&Datum::Int8(7)), Ordering::Equal);
        assert_eq!(Datum::Int4(7).total_cmp(&Datum::Int8(8)), Ordering::Less);
        assert_eq!(Datum::Float8(7.5).total_cmp(&Datum::Int4(7)), Ordering::Greater);
    }

    #[test]
    fn test_sql_eq_null() {
        assert_eq!(Datum::Null.sql_eq(&Datum::Int4(1)), None);
        assert_eq!(Datum::Int4(1).sql_eq(&Datum::Int8(1)), Some(true));
    }

    #[test]
    fn test_serde_tagging() {
        let json = serde_json::to_string(&Datum::Int4(3)).unwrap();
        assert_eq!(json, r#"{"type":"int4","value":3}"#);
        let back: Datum = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Datum::Int4(3));
    }
}
