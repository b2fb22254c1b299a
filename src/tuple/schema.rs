//! Column and schema definitions

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::{TupleError, TupleResult};

/// Column data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Bool,
    Int4,
    Int8,
    Float8,
    Text,
}

impl DataType {
    /// Stable on-disk tag
    pub fn tag(self) -> u8 {
        match self {
            DataType::Bool => 1,
            DataType::Int4 => 2,
            DataType::Int8 => 3,
            DataType::Float8 => 4,
            DataType::Text => 5,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(DataType::Bool),
            2 => Some(DataType::Int4),
            3 => Some(DataType::Int8),
            4 => Some(DataType::Float8),
            5 => Some(DataType::Text),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Bool => "BOOL",
            DataType::Int4 => "INT4",
            DataType::Int8 => "INT8",
            DataType::Float8 => "FLOAT8",
            DataType::Text => "TEXT",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Int4 | DataType::Int8 | DataType::Float8)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named, typed column.
///
/// Names may be qualified (`table.column`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    /// The unqualified part of the name
    pub fn simple_name(&self) -> &str {
        match self.name.rfind('.') {
            Some(pos) => &self.name[pos + 1..],
            None => &self.name,
        }
    }

    /// Returns a copy qualified with the given table name
    pub fn qualified(&self, table: &str) -> Self {
        Column::new(format!("{}.{}", table, self.simple_name()), self.data_type)
    }
}

/// Ordered list of columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Builder-style column append
    pub fn with_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.push(Column::new(name, data_type));
        self
    }

    pub fn add_column(&mut self, name: impl Into<String>, data_type: DataType) {
        self.columns.push(Column::new(name, data_type));
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Resolves a column name to its position.
    ///
    /// An exact match wins. Otherwise an unqualified name matches a single
    /// column with the same simple name; more than one such column is
    /// ambiguous.
    pub fn index_of(&self, name: &str) -> TupleResult<usize> {
        if let Some(pos) = self.columns.iter().position(|c| c.name == name) {
            return Ok(pos);
        }

        let simple = name.rsplit('.').next().unwrap_or(name);
        let dotted = format!(".{}", name);
        let mut found = None;
        for (i, col) in self.columns.iter().enumerate() {
            let qualifier_ok =
                simple == name || col.name == col.simple_name() || col.name.ends_with(&dotted);
            if col.simple_name() == simple && qualifier_ok {
                if found.is_some() {
                    return Err(TupleError::AmbiguousColumn(name.to_string()));
                }
                found = Some(i);
            }
        }
        found.ok_or_else(|| TupleError::UnknownColumn(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_ok()
    }

    /// Concatenation used for join outputs
    pub fn merge(left: &Schema, right: &Schema) -> Schema {
        let mut columns = left.columns.clone();
        columns.extend(right.columns.iter().cloned());
        Schema { columns }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", col.name, col.data_type)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nation() -> Schema {
        Schema::empty()
            .with_column("nation.n_nationkey", DataType::Int4)
            .with_column("nation.n_name", DataType::Text)
            .with_column("region.r_name", DataType::Text)
    }

    #[test]
    fn test_exact_and_simple_lookup() {
        let schema = nation();
        assert_eq!(schema.index_of("nation.n_name").unwrap(), 1);
        assert_eq!(schema.index_of("n_name").unwrap(), 1);
        assert_eq!(schema.index_of("r_name").unwrap(), 2);
    }

    #[test]
    fn test_unknown_column() {
        let schema = nation();
        assert_eq!(
            schema.index_of("p_size"),
            Err(TupleError::UnknownColumn("p_size".into()))
        );
    }

    #[test]
    fn test_ambiguous_column() {
        let schema = Schema::empty()
            .with_column("a.id", DataType::Int4)
            .with_column("b.id", DataType::Int4);
        assert!(matches!(schema.index_of("id"), Err(TupleError::AmbiguousColumn(_))));
        assert_eq!(schema.index_of("b.id").unwrap(), 1);
    }

    #[test]
    fn test_type_tags_roundtrip() {
        for ty in [
            DataType::Bool,
            DataType::Int4,
            DataType::Int8,
            DataType::Float8,
            DataType::Text,
        ] {
            assert_eq!(DataType::from_tag(ty.tag()), Some(ty));
        }
        assert_eq!(DataType::from_tag(0), None);
    }
}
