//! Expression evaluation
//!
//! Expressions are bound once against an input schema (column names become
//! positions, LIKE patterns become compiled regexes) and then evaluated per
//! row. Nulls follow SQL three-valued logic; a predicate that evaluates to
//! NULL rejects the row.

use std::cmp::Ordering;

use regex::Regex;

use super::errors::{ExecutorError, ExecutorResult};
use crate::logical::{BinaryOp, Expr};
use crate::tuple::{Datum, Schema, Tuple};

/// Expression resolved against a fixed input schema
#[derive(Debug, Clone)]
pub enum BoundExpr {
    Column {
        position: usize,
        name: String,
    },
    Literal(Datum),
    Binary {
        op: BinaryOp,
        left: Box<BoundExpr>,
        right: Box<BoundExpr>,
    },
    Not(Box<BoundExpr>),
    IsNull {
        expr: Box<BoundExpr>,
        negated: bool,
    },
    Like {
        expr: Box<BoundExpr>,
        regex: Regex,
        negated: bool,
    },
}

impl BoundExpr {
    pub fn bind(expr: &Expr, schema: &Schema) -> ExecutorResult<Self> {
        Ok(match expr {
            Expr::Column { name } => BoundExpr::Column {
                position: schema.index_of(name).map_err(|e| {
                    ExecutorError::invalid_plan(format!("{} in {}", e, schema))
                })?,
                name: name.clone(),
            },
            Expr::Literal { value } => BoundExpr::Literal(value.clone()),
            Expr::Binary { op, left, right } => BoundExpr::Binary {
                op: *op,
                left: Box::new(Self::bind(left, schema)?),
                right: Box::new(Self::bind(right, schema)?),
            },
            Expr::Not { expr } => BoundExpr::Not(Box::new(Self::bind(expr, schema)?)),
            Expr::IsNull { expr, negated } => BoundExpr::IsNull {
                expr: Box::new(Self::bind(expr, schema)?),
                negated: *negated,
            },
            Expr::Like {
                expr,
                pattern,
                negated,
            } => BoundExpr::Like {
                expr: Box::new(Self::bind(expr, schema)?),
                regex: like_regex(pattern)?,
                negated: *negated,
            },
        })
    }

    pub fn eval(&self, row: &Tuple) -> ExecutorResult<Datum> {
        match self {
            BoundExpr::Column { position, name } => row.get(*position).cloned().ok_or_else(|| {
                ExecutorError::eval(format!(
                    "Column {} at position {} missing from row of {} values",
                    name,
                    position,
                    row.len()
                ))
            }),
            BoundExpr::Literal(value) => Ok(value.clone()),
            BoundExpr::Binary { op, left, right } => {
                let l = left.eval(row)?;
                // AND/OR need the right side only when the left does not decide
                match (op, l.as_bool()) {
                    (BinaryOp::And, Some(false)) => return Ok(Datum::Bool(false)),
                    (BinaryOp::Or, Some(true)) => return Ok(Datum::Bool(true)),
                    _ => {}
                }
                let r = right.eval(row)?;
                eval_binary(*op, &l, &r)
            }
            BoundExpr::Not(inner) => match inner.eval(row)? {
                Datum::Bool(b) => Ok(Datum::Bool(!b)),
                Datum::Null => Ok(Datum::Null),
                other => Err(ExecutorError::eval(format!("NOT requires bool, got {}", other))),
            },
            BoundExpr::IsNull { expr, negated } => {
                let null = expr.eval(row)?.is_null();
                Ok(Datum::Bool(null != *negated))
            }
            BoundExpr::Like {
                expr,
                regex,
                negated,
            } => match expr.eval(row)? {
                Datum::Text(s) => Ok(Datum::Bool(regex.is_match(&s) != *negated)),
                Datum::Null => Ok(Datum::Null),
                other => Err(ExecutorError::eval(format!("LIKE requires text, got {}", other))),
            },
        }
    }

    /// Evaluates as a filter: true keeps the row, false or NULL drops it
    pub fn eval_predicate(&self, row: &Tuple) -> ExecutorResult<bool> {
        match self.eval(row)? {
            Datum::Bool(b) => Ok(b),
            Datum::Null => Ok(false),
            other => Err(ExecutorError::eval(format!(
                "Predicate evaluated to non-boolean {}",
                other
            ))),
        }
    }
}

fn eval_binary(op: BinaryOp, l: &Datum, r: &Datum) -> ExecutorResult<Datum> {
    if op.is_logical() {
        return eval_logical(op, l, r);
    }
    if l.is_null() || r.is_null() {
        return Ok(Datum::Null);
    }
    if op.is_comparison() {
        let comparable = (l.is_numeric() && r.is_numeric())
            || matches!((l, r), (Datum::Text(_), Datum::Text(_)) | (Datum::Bool(_), Datum::Bool(_)));
        if !comparable {
            return Err(ExecutorError::eval(format!(
                "Cannot compare {} {} {}",
                l,
                op.symbol(),
                r
            )));
        }
        let ord = l.total_cmp(r);
        let result = match op {
            BinaryOp::Eq => ord == Ordering::Equal,
            BinaryOp::NotEq => ord != Ordering::Equal,
            BinaryOp::Lt => ord == Ordering::Less,
            BinaryOp::LtEq => ord != Ordering::Greater,
            BinaryOp::Gt => ord == Ordering::Greater,
            _ => ord != Ordering::Less,
        };
        return Ok(Datum::Bool(result));
    }
    eval_arithmetic(op, l, r)
}

fn eval_logical(op: BinaryOp, l: &Datum, r: &Datum) -> ExecutorResult<Datum> {
    let as_logic = |d: &Datum| match d {
        Datum::Bool(b) => Ok(Some(*b)),
        Datum::Null => Ok(None),
        other => Err(ExecutorError::eval(format!(
            "{} requires bool operands, got {}",
            op.symbol(),
            other
        ))),
    };
    let (l, r) = (as_logic(l)?, as_logic(r)?);
    let result = match op {
        BinaryOp::And => match (l, r) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        _ => match (l, r) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
    };
    Ok(result.map_or(Datum::Null, Datum::Bool))
}

fn eval_arithmetic(op: BinaryOp, l: &Datum, r: &Datum) -> ExecutorResult<Datum> {
    let overflow = || ExecutorError::eval(format!("Overflow in {} {} {}", l, op.symbol(), r));
    let div_zero = || ExecutorError::eval(format!("Division by zero in {} {} {}", l, op.symbol(), r));

    match (l, r) {
        (Datum::Int4(a), Datum::Int4(b)) => {
            let (a, b) = (*a, *b);
            let v = match op {
                BinaryOp::Plus => a.checked_add(b),
                BinaryOp::Minus => a.checked_sub(b),
                BinaryOp::Multiply => a.checked_mul(b),
                BinaryOp::Divide | BinaryOp::Modulo if b == 0 => return Err(div_zero()),
                BinaryOp::Divide => a.checked_div(b),
                _ => a.checked_rem(b),
            };
            v.map(Datum::Int4).ok_or_else(overflow)
        }
        _ if matches!(l, Datum::Float8(_)) || matches!(r, Datum::Float8(_)) => {
            let (a, b) = match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(non_numeric(op, l, r)),
            };
            let v = match op {
                BinaryOp::Plus => a + b,
                BinaryOp::Minus => a - b,
                BinaryOp::Multiply => a * b,
                BinaryOp::Divide | BinaryOp::Modulo if b == 0.0 => return Err(div_zero()),
                BinaryOp::Divide => a / b,
                _ => a % b,
            };
            Ok(Datum::Float8(v))
        }
        _ => {
            let (a, b) = match (l.as_i64(), r.as_i64()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(non_numeric(op, l, r)),
            };
            let v = match op {
                BinaryOp::Plus => a.checked_add(b),
                BinaryOp::Minus => a.checked_sub(b),
                BinaryOp::Multiply => a.checked_mul(b),
                BinaryOp::Divide | BinaryOp::Modulo if b == 0 => return Err(div_zero()),
                BinaryOp::Divide => a.checked_div(b),
                _ => a.checked_rem(b),
            };
            v.map(Datum::Int8).ok_or_else(overflow)
        }
    }
}

fn non_numeric(op: BinaryOp, l: &Datum, r: &Datum) -> ExecutorError {
    ExecutorError::eval(format!("{} {} {} needs numeric operands", l, op.symbol(), r))
}

/// Compiles a SQL LIKE pattern (`%` any run, `_` one character)
fn like_regex(pattern: &str) -> ExecutorResult<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?s)^");
    let mut literal = String::new();
    for ch in pattern.chars() {
        match ch {
            '%' | '_' => {
                re.push_str(&regex::escape(&literal));
                literal.clear();
                re.push_str(if ch == '%' { ".*" } else { "." });
            }
            c => literal.push(c),
        }
    }
    re.push_str(&regex::escape(&literal));
    re.push('$');
    Regex::new(&re).map_err(|e| ExecutorError::eval(format!("Bad LIKE pattern '{}': {}", pattern, e)))
}
