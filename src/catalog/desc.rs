//! Table, index and function descriptors

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::tuple::{DataType, Schema, SortSpec};

/// On-disk layout of a table's data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Checksummed append-only row file (see `storage`)
    RowFile,
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreType::RowFile => write!(f, "ROWFILE"),
        }
    }
}

/// Table statistics used for broadcast decisions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub num_rows: u64,
    pub num_bytes: u64,
}

/// Table metadata: schema, storage and options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    /// Unqualified column names
    pub schema: Schema,
    pub store_type: StoreType,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub stats: Option<TableStats>,
}

impl TableMeta {
    pub fn new(schema: Schema, store_type: StoreType) -> Self {
        Self {
            schema,
            store_type,
            options: BTreeMap::new(),
            stats: None,
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_stats(mut self, stats: TableStats) -> Self {
        self.stats = Some(stats);
        self
    }
}

/// A registered table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDesc {
    pub name: String,
    pub meta: TableMeta,
    /// Row data file
    pub path: PathBuf,
}

impl TableDesc {
    pub fn new(name: impl Into<String>, meta: TableMeta, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            meta,
            path: path.into(),
        }
    }

    /// Table schema with every column qualified by the table name
    pub fn qualified_schema(&self) -> Schema {
        Schema::new(
            self.meta
                .schema
                .columns()
                .iter()
                .map(|c| c.qualified(&self.name))
                .collect(),
        )
    }

    pub fn row_count(&self) -> Option<u64> {
        self.meta.stats.map(|s| s.num_rows)
    }
}

/// Index access method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMethod {
    /// Sorted two-level index (see `index`)
    TwoLevelBst,
}

impl fmt::Display for IndexMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexMethod::TwoLevelBst => write!(f, "TWO_LEVEL_BST"),
        }
    }
}

/// A registered single-column index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDesc {
    pub name: String,
    pub table: String,
    /// Unqualified column name
    pub column: String,
    pub method: IndexMethod,
    pub path: PathBuf,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub clustered: bool,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl IndexDesc {
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            column: column.into(),
            method: IndexMethod::TwoLevelBst,
            path: path.into(),
            unique: false,
            clustered: false,
            ascending: true,
        }
    }

    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    /// Sort key the index file is built with
    pub fn sort_spec(&self) -> SortSpec {
        SortSpec::new(self.column.clone(), self.ascending, false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    /// One value per input row
    General,
    /// One value per group
    Aggregate,
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKind::General => write!(f, "GENERAL"),
            FunctionKind::Aggregate => write!(f, "AGGREGATE"),
        }
    }
}

/// A registered function signature.
///
/// Functions are identified by name and argument types, so one name may
/// carry several overloads. Names compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDesc {
    pub name: String,
    pub kind: FunctionKind,
    pub return_type: DataType,
    pub arg_types: Vec<DataType>,
}

impl FunctionDesc {
    pub fn new(
        name: impl Into<String>,
        kind: FunctionKind,
        return_type: DataType,
        arg_types: Vec<DataType>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            return_type,
            arg_types,
        }
    }

    pub fn aggregate(name: impl Into<String>, return_type: DataType, arg_types: Vec<DataType>) -> Self {
        Self::new(name, FunctionKind::Aggregate, return_type, arg_types)
    }

    /// `name(t1, t2, ..)`, the form used in catalog errors
    pub fn signature(&self) -> String {
        signature(&self.name, &self.arg_types)
    }
}

pub(crate) fn signature(name: &str, arg_types: &[DataType]) -> String {
    let args: Vec<&str> = arg_types.iter().map(|t| t.as_str()).collect();
    format!("{}({})", name, args.join(", "))
}
