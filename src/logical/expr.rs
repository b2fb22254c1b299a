//! Scalar expressions
//!
//! Expressions refer to columns by (qualified or unqualified) name and are
//! bound to positions by the executor. Serialized with an explicit `kind`
//! tag per node.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::{LogicalError, LogicalResult};
use crate::tuple::{DataType, Datum, Schema};

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_arithmetic(self) -> bool {
        !self.is_comparison() && !self.is_logical()
    }

    /// The operator with its operands swapped (`a < b` == `b > a`)
    pub fn flipped(self) -> BinaryOp {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::LtEq => BinaryOp::GtEq,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::GtEq => BinaryOp::LtEq,
            other => other,
        }
    }
}

/// Scalar expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Column {
        name: String,
    },
    Literal {
        value: Datum,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not {
        expr: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        #[serde(default)]
        negated: bool,
    },
    /// SQL LIKE with `%` and `_` wildcards
    Like {
        expr: Box<Expr>,
        pattern: String,
        #[serde(default)]
        negated: bool,
    },
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column { name: name.into() }
    }

    pub fn lit(value: impl Into<Datum>) -> Self {
        Expr::Literal {
            value: value.into(),
        }
    }

    pub fn binary(self, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    pub fn eq(self, right: Expr) -> Self {
        self.binary(BinaryOp::Eq, right)
    }

    pub fn lt(self, right: Expr) -> Self {
        self.binary(BinaryOp::Lt, right)
    }

    pub fn lt_eq(self, right: Expr) -> Self {
        self.binary(BinaryOp::LtEq, right)
    }

    pub fn gt(self, right: Expr) -> Self {
        self.binary(BinaryOp::Gt, right)
    }

    pub fn gt_eq(self, right: Expr) -> Self {
        self.binary(BinaryOp::GtEq, right)
    }

    pub fn and(self, right: Expr) -> Self {
        self.binary(BinaryOp::And, right)
    }

    pub fn or(self, right: Expr) -> Self {
        self.binary(BinaryOp::Or, right)
    }

    pub fn not(self) -> Self {
        Expr::Not {
            expr: Box::new(self),
        }
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn like(self, pattern: impl Into<String>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: pattern.into(),
            negated: false,
        }
    }

    /// AND of all `exprs`, or `None` when empty
    pub fn conjunction(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        exprs.into_iter().reduce(Expr::and)
    }

    /// Top-level AND operands
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let mut out = left.conjuncts();
                out.extend(right.conjuncts());
                out
            }
            other => vec![other],
        }
    }

    /// Names of every referenced column, in first-seen order
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Column { name } => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Literal { .. } => {}
            Expr::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Not { expr } | Expr::IsNull { expr, .. } | Expr::Like { expr, .. } => {
                expr.collect_columns(out)
            }
        }
    }

    /// Result type of this expression over `schema`
    pub fn data_type(&self, schema: &Schema) -> LogicalResult<DataType> {
        match self {
            Expr::Column { name } => {
                let pos = schema.index_of(name)?;
                schema
                    .column(pos)
                    .map(|c| c.data_type)
                    .ok_or_else(|| LogicalError::TypeMismatch(format!("column {}", name)))
            }
            // Untyped null literals default to Text
            Expr::Literal { value } => Ok(value.data_type().unwrap_or(DataType::Text)),
            Expr::Binary { op, left, right } => {
                let l = left.data_type(schema)?;
                let r = right.data_type(schema)?;
                if op.is_comparison() || op.is_logical() {
                    return Ok(DataType::Bool);
                }
                if !l.is_numeric() || !r.is_numeric() {
                    return Err(LogicalError::TypeMismatch(format!(
                        "{} {} {} needs numeric operands",
                        l,
                        op.symbol(),
                        r
                    )));
                }
                Ok(wider_numeric(l, r))
            }
            Expr::Not { .. } | Expr::IsNull { .. } | Expr::Like { .. } => Ok(DataType::Bool),
        }
    }

    /// `(column, op, literal)` for a simple column-vs-constant comparison,
    /// normalised so the column is on the left
    pub fn as_column_comparison(&self) -> Option<(&str, BinaryOp, &Datum)> {
        match self {
            Expr::Binary { op, left, right } if op.is_comparison() => {
                match (left.as_ref(), right.as_ref()) {
                    (Expr::Column { name }, Expr::Literal { value }) => Some((name, *op, value)),
                    (Expr::Literal { value }, Expr::Column { name }) => {
                        Some((name, op.flipped(), value))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Equi-join column pairs `(left column, right column)` from the
    /// conjuncts of a join condition
    pub fn equi_join_keys(&self, left: &Schema, right: &Schema) -> Vec<(String, String)> {
        self.conjuncts()
            .into_iter()
            .filter_map(|c| match c {
                Expr::Binary {
                    op: BinaryOp::Eq,
                    left: l,
                    right: r,
                } => match (l.as_ref(), r.as_ref()) {
                    (Expr::Column { name: a }, Expr::Column { name: b }) => {
                        if left.contains(a) && right.contains(b) {
                            Some((a.clone(), b.clone()))
                        } else if left.contains(b) && right.contains(a) {
                            Some((b.clone(), a.clone()))
                        } else {
                            None
                        }
                    }
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }
}

fn wider_numeric(l: DataType, r: DataType) -> DataType {
    match (l, r) {
        (DataType::Float8, _) | (_, DataType::Float8) => DataType::Float8,
        (DataType::Int8, _) | (_, DataType::Int8) => DataType::Int8,
        _ => DataType::Int4,
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column { name } => write!(f, "{}", name),
            Expr::Literal { value } => write!(f, "{}", value),
            Expr::Binary { op, left, right } if op.is_logical() => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expr::Binary { op, left, right } => write!(f, "{} {} {}", left, op.symbol(), right),
            Expr::Not { expr } => write!(f, "NOT {}", expr),
            Expr::IsNull { expr, negated } => {
                write!(f, "{} IS {}NULL", expr, if *negated { "NOT " } else { "" })
            }
            Expr::Like {
                expr,
                pattern,
                negated,
            } => write!(
                f,
                "{} {}LIKE '{}'",
                expr,
                if *negated { "NOT " } else { "" },
                pattern
            ),
        }
    }
}
