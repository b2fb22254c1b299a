//! Logical plan nodes
//!
//! A closed set of node kinds. Every node carries (or forwards) its output
//! schema. Trees are immutable values: builders consume their input and
//! return a new node, and planners produce new trees instead of editing.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::errors::{LogicalError, LogicalResult};
use super::expr::Expr;
use crate::catalog::{StoreType, TableDesc};
use crate::tuple::{Column, DataType, Schema, SortSpec};

/// What a scan reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanSource {
    /// A catalog table
    Table { table: String },
    /// Materialized output of execution block `seq` of the same query
    Intermediate { seq: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanNode {
    pub source: ScanSource,
    /// Output schema, qualified by table name for table scans
    pub schema: Schema,
    /// Predicate evaluated during the scan
    #[serde(default)]
    pub filter: Option<Expr>,
    /// Static row-count estimate used by broadcast decisions
    #[serde(default)]
    pub row_hint: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    LeftOuter,
    Cross,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER"),
            JoinType::LeftOuter => write!(f, "LEFT OUTER"),
            JoinType::Cross => write!(f, "CROSS"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinNode {
    pub join_type: JoinType,
    #[serde(default)]
    pub condition: Option<Expr>,
    pub left: Box<LogicalNode>,
    pub right: Box<LogicalNode>,
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterNode {
    pub predicate: Expr,
    pub input: Box<LogicalNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggFunc {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggFunc {
    pub fn name(self) -> &'static str {
        match self {
            AggFunc::Count => "count",
            AggFunc::Sum => "sum",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Avg => "avg",
        }
    }
}

/// One aggregate output column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateExpr {
    pub func: AggFunc,
    /// `None` only for `count(*)`
    #[serde(default)]
    pub arg: Option<Expr>,
    pub name: String,
}

impl AggregateExpr {
    pub fn new(func: AggFunc, arg: Expr, name: impl Into<String>) -> Self {
        Self {
            func,
            arg: Some(arg),
            name: name.into(),
        }
    }

    pub fn count_star(name: impl Into<String>) -> Self {
        Self {
            func: AggFunc::Count,
            arg: None,
            name: name.into(),
        }
    }

    /// Output type over the input schema
    pub fn data_type(&self, input: &Schema) -> LogicalResult<DataType> {
        let arg_type = match &self.arg {
            Some(arg) => Some(arg.data_type(input)?),
            None if self.func == AggFunc::Count => None,
            None => {
                return Err(LogicalError::InvalidAggregate(format!(
                    "{}(*) is not allowed",
                    self.func.name()
                )))
            }
        };
        match (self.func, arg_type) {
            (AggFunc::Count, _) => Ok(DataType::Int8),
            (AggFunc::Avg, Some(t)) if t.is_numeric() => Ok(DataType::Float8),
            (AggFunc::Sum, Some(DataType::Float8)) => Ok(DataType::Float8),
            (AggFunc::Sum, Some(t)) if t.is_numeric() => Ok(DataType::Int8),
            (AggFunc::Min | AggFunc::Max, Some(t)) => Ok(t),
            (func, t) => Err(LogicalError::InvalidAggregate(format!(
                "{} over {}",
                func.name(),
                t.map_or("nothing", DataType::as_str)
            ))),
        }
    }
}

impl fmt::Display for AggregateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{}({}) AS {}", self.func.name(), arg, self.name),
            None => write!(f, "{}(*) AS {}", self.func.name(), self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupByNode {
    /// Grouping columns; empty for a global aggregate
    pub keys: Vec<String>,
    pub aggregates: Vec<AggregateExpr>,
    pub input: Box<LogicalNode>,
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortNode {
    pub specs: Vec<SortSpec>,
    pub input: Box<LogicalNode>,
}

/// One projected output column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub expr: Expr,
    pub name: String,
    pub data_type: DataType,
}

impl Target {
    pub fn new(expr: Expr, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            expr,
            name: name.into(),
            data_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionNode {
    pub targets: Vec<Target>,
    pub input: Box<LogicalNode>,
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTableNode {
    pub table: String,
    pub schema: Schema,
    pub store_type: StoreType,
    /// Data file; defaults to `<data_dir>/<table>.rows`
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootNode {
    pub child: Box<LogicalNode>,
}

/// A node of the logical plan tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogicalNode {
    Root(RootNode),
    Scan(ScanNode),
    Join(JoinNode),
    Filter(FilterNode),
    GroupBy(GroupByNode),
    Sort(SortNode),
    Projection(ProjectionNode),
    CreateTable(CreateTableNode),
}

impl LogicalNode {
    /// Scan of a catalog table with a qualified output schema
    pub fn scan(desc: &TableDesc) -> Self {
        LogicalNode::Scan(ScanNode {
            source: ScanSource::Table {
                table: desc.name.clone(),
            },
            schema: desc.qualified_schema(),
            filter: None,
            row_hint: desc.row_count(),
        })
    }

    /// Scan of a table known only by name and unqualified schema
    pub fn scan_table(table: impl Into<String>, schema: &Schema) -> Self {
        let table = table.into();
        LogicalNode::Scan(ScanNode {
            schema: Schema::new(schema.columns().iter().map(|c| c.qualified(&table)).collect()),
            source: ScanSource::Table { table },
            filter: None,
            row_hint: None,
        })
    }

    /// Scan of another block's materialized output
    pub fn intermediate_scan(seq: u32, schema: Schema, row_hint: Option<u64>) -> Self {
        LogicalNode::Scan(ScanNode {
            source: ScanSource::Intermediate { seq },
            schema,
            filter: None,
            row_hint,
        })
    }

    /// Sets the row-count hint of a scan; other nodes are returned unchanged
    pub fn with_row_hint(mut self, rows: u64) -> Self {
        if let LogicalNode::Scan(scan) = &mut self {
            scan.row_hint = Some(rows);
        }
        self
    }

    pub fn filter(self, predicate: Expr) -> Self {
        LogicalNode::Filter(FilterNode {
            predicate,
            input: Box::new(self),
        })
    }

    pub fn join(self, right: LogicalNode, join_type: JoinType, condition: Option<Expr>) -> Self {
        let schema = Schema::merge(self.schema(), right.schema());
        LogicalNode::Join(JoinNode {
            join_type,
            condition,
            left: Box::new(self),
            right: Box::new(right),
            schema,
        })
    }

    pub fn inner_join(self, right: LogicalNode, condition: Expr) -> Self {
        self.join(right, JoinType::Inner, Some(condition))
    }

    pub fn group_by(self, keys: Vec<String>, aggregates: Vec<AggregateExpr>) -> LogicalResult<Self> {
        let input = self.schema();
        let mut columns = Vec::with_capacity(keys.len() + aggregates.len());
        for key in &keys {
            let pos = input.index_of(key)?;
            if let Some(col) = input.column(pos) {
                columns.push(col.clone());
            }
        }
        for agg in &aggregates {
            columns.push(Column::new(agg.name.clone(), agg.data_type(input)?));
        }
        Ok(LogicalNode::GroupBy(GroupByNode {
            keys,
            aggregates,
            schema: Schema::new(columns),
            input: Box::new(self),
        }))
    }

    pub fn sort(self, specs: Vec<SortSpec>) -> LogicalResult<Self> {
        for spec in &specs {
            self.schema().index_of(&spec.column)?;
        }
        Ok(LogicalNode::Sort(SortNode {
            specs,
            input: Box::new(self),
        }))
    }

    pub fn project(self, targets: Vec<Target>) -> Self {
        let schema = Schema::new(
            targets
                .iter()
                .map(|t| Column::new(t.name.clone(), t.data_type))
                .collect(),
        );
        LogicalNode::Projection(ProjectionNode {
            targets,
            input: Box::new(self),
            schema,
        })
    }

    /// Projection of existing columns, keeping their names and types
    pub fn project_columns(self, names: &[&str]) -> LogicalResult<Self> {
        let targets = names
            .iter()
            .map(|name| {
                let expr = Expr::col(*name);
                let data_type = expr.data_type(self.schema())?;
                Ok(Target::new(expr, *name, data_type))
            })
            .collect::<LogicalResult<Vec<_>>>()?;
        Ok(self.project(targets))
    }

    pub fn root(child: LogicalNode) -> Self {
        LogicalNode::Root(RootNode {
            child: Box::new(child),
        })
    }

    pub fn create_table(table: impl Into<String>, schema: Schema) -> Self {
        LogicalNode::CreateTable(CreateTableNode {
            table: table.into(),
            schema,
            store_type: StoreType::RowFile,
            path: None,
        })
    }

    /// Output schema
    pub fn schema(&self) -> &Schema {
        match self {
            LogicalNode::Root(n) => n.child.schema(),
            LogicalNode::Scan(n) => &n.schema,
            LogicalNode::Join(n) => &n.schema,
            LogicalNode::Filter(n) => n.input.schema(),
            LogicalNode::GroupBy(n) => &n.schema,
            LogicalNode::Sort(n) => n.input.schema(),
            LogicalNode::Projection(n) => &n.schema,
            LogicalNode::CreateTable(n) => &n.schema,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            LogicalNode::Root(_) => "ROOT",
            LogicalNode::Scan(_) => "SCAN",
            LogicalNode::Join(_) => "JOIN",
            LogicalNode::Filter(_) => "FILTER",
            LogicalNode::GroupBy(_) => "GROUP_BY",
            LogicalNode::Sort(_) => "SORT",
            LogicalNode::Projection(_) => "PROJECTION",
            LogicalNode::CreateTable(_) => "CREATE_TABLE",
        }
    }

    /// Join, sort and grouping need all of their input before producing
    /// output; their inputs are separated by a shuffle boundary
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            LogicalNode::Join(_) | LogicalNode::Sort(_) | LogicalNode::GroupBy(_)
        )
    }

    pub fn children(&self) -> Vec<&LogicalNode> {
        match self {
            LogicalNode::Root(n) => vec![n.child.as_ref()],
            LogicalNode::Scan(_) | LogicalNode::CreateTable(_) => Vec::new(),
            LogicalNode::Join(n) => vec![n.left.as_ref(), n.right.as_ref()],
            LogicalNode::Filter(n) => vec![n.input.as_ref()],
            LogicalNode::GroupBy(n) => vec![n.input.as_ref()],
            LogicalNode::Sort(n) => vec![n.input.as_ref()],
            LogicalNode::Projection(n) => vec![n.input.as_ref()],
        }
    }

    /// Number of scan leaves in the subtree
    pub fn scan_count(&self) -> usize {
        match self {
            LogicalNode::Scan(_) => 1,
            other => other.children().iter().map(|c| c.scan_count()).sum(),
        }
    }

    /// Number of blocking operators in the subtree
    pub fn blocking_count(&self) -> usize {
        let own = usize::from(self.is_blocking());
        own + self
            .children()
            .iter()
            .map(|c| c.blocking_count())
            .sum::<usize>()
    }

    /// One-line description without children
    pub fn describe(&self) -> String {
        match self {
            LogicalNode::Root(_) => "ROOT".to_string(),
            LogicalNode::Scan(n) => {
                let source = match &n.source {
                    ScanSource::Table { table } => format!("SCAN {}", table),
                    ScanSource::Intermediate { seq } => format!("SCAN block #{}", seq),
                };
                match &n.filter {
                    Some(filter) => format!("{} WHERE {}", source, filter),
                    None => source,
                }
            }
            LogicalNode::Join(n) => match &n.condition {
                Some(cond) => format!("{} JOIN ON {}", n.join_type, cond),
                None => format!("{} JOIN", n.join_type),
            },
            LogicalNode::Filter(n) => format!("FILTER {}", n.predicate),
            LogicalNode::GroupBy(n) => {
                let aggs: Vec<String> = n.aggregates.iter().map(|a| a.to_string()).collect();
                format!("GROUP BY [{}] {}", n.keys.join(", "), aggs.join(", "))
            }
            LogicalNode::Sort(n) => {
                let specs: Vec<String> = n
                    .specs
                    .iter()
                    .map(|s| format!("{} {}", s.column, s.direction_str()))
                    .collect();
                format!("SORT {}", specs.join(", "))
            }
            LogicalNode::Projection(n) => {
                let targets: Vec<String> = n
                    .targets
                    .iter()
                    .map(|t| match &t.expr {
                        Expr::Column { name } if *name == t.name => t.name.clone(),
                        expr => format!("{} AS {}", expr, t.name),
                    })
                    .collect();
                format!("PROJECT {}", targets.join(", "))
            }
            LogicalNode::CreateTable(n) => format!("CREATE TABLE {} {}", n.table, n.schema),
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{:indent$}{}", "", self.describe(), indent = depth * 2)?;
        for child in self.children() {
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for LogicalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
