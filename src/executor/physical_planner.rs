//! Logical sub-plan to operator tree
//!
//! Scans of tables with a usable index and a comparison against a constant
//! become index scans. Index choice, in order:
//!
//! 1. An equality lookup beats a range lookup
//! 2. Among lookups of the same kind, the lexicographically smallest
//!    column wins
//!
//! Index scans are always wrapped in a filter carrying the full scan
//! predicate, so the lookup only has to return a superset of the result.

use std::ops::Bound;

use super::aggregate::HashAggregateExec;
use super::context::{IndexBinding, TaskContext};
use super::errors::{ExecutorError, ExecutorResult};
use super::exec::{PhysicalExec, Scanner};
use super::filters::{FilterExec, ProjectExec};
use super::index_scan::{IndexLookup, IndexScanExec};
use super::join::NestedLoopJoinExec;
use super::scan::SeqScanExec;
use super::sorter::SortExec;
use crate::logical::{BinaryOp, Expr, LogicalNode, ScanNode, ScanSource};
use crate::tuple::{DataType, Datum, Tuple};

/// Turns block plans into operator trees
pub struct PhysicalPlanner;

impl PhysicalPlanner {
    pub fn create_exec(
        plan: &LogicalNode,
        ctx: &TaskContext,
    ) -> ExecutorResult<Box<dyn PhysicalExec>> {
        let cancel = ctx.cancel_signal().clone();
        match plan {
            LogicalNode::Root(root) => Self::create_exec(&root.child, ctx),
            LogicalNode::Scan(scan) => Self::create_scan(scan, None, ctx),
            LogicalNode::Filter(filter) => match filter.input.as_ref() {
                LogicalNode::Scan(scan) => Self::create_scan(scan, Some(&filter.predicate), ctx),
                input => {
                    let child = Self::create_exec(input, ctx)?;
                    Ok(Box::new(FilterExec::new(child, &filter.predicate)?.with_cancel(cancel)))
                }
            },
            LogicalNode::Join(join) => {
                let left = Self::create_exec(&join.left, ctx)?;
                let right = Self::create_exec(&join.right, ctx)?;
                Ok(Box::new(
                    NestedLoopJoinExec::new(join.join_type, left, right, join.condition.as_ref())?
                        .with_cancel(cancel),
                ))
            }
            LogicalNode::GroupBy(group) => {
                let child = Self::create_exec(&group.input, ctx)?;
                Ok(Box::new(
                    HashAggregateExec::new(child, &group.keys, &group.aggregates, group.schema.clone())?
                        .with_cancel(cancel),
                ))
            }
            LogicalNode::Sort(sort) => {
                let child = Self::create_exec(&sort.input, ctx)?;
                Ok(Box::new(SortExec::new(child, &sort.specs)?.with_cancel(cancel)))
            }
            LogicalNode::Projection(projection) => {
                let child = Self::create_exec(&projection.input, ctx)?;
                Ok(Box::new(ProjectExec::new(child, &projection.targets)?.with_cancel(cancel)))
            }
            LogicalNode::CreateTable(create) => Err(ExecutorError::invalid_plan(format!(
                "CREATE TABLE {} is not executable",
                create.table
            ))),
        }
    }

    /// Scan with its own filter and, when it sits directly under a filter,
    /// that filter's predicate
    fn create_scan(
        scan: &ScanNode,
        outer: Option<&Expr>,
        ctx: &TaskContext,
    ) -> ExecutorResult<Box<dyn PhysicalExec>> {
        let predicate = Expr::conjunction(scan.filter.iter().chain(outer).cloned());

        let fragments = match &scan.source {
            ScanSource::Intermediate { seq } => ctx.intermediate_fragments(*seq)?.to_vec(),
            ScanSource::Table { table } => {
                if let Some(pred) = &predicate {
                    if let Some((binding, lookup)) = choose_index(scan, table, pred, ctx) {
                        let exec = IndexScanExec::new(
                            scan.schema.clone(),
                            binding.data.clone(),
                            binding.reader.clone(),
                            lookup,
                            ctx,
                        );
                        let filter = FilterExec::new(Box::new(exec), pred)?
                            .with_cancel(ctx.cancel_signal().clone());
                        return Ok(Box::new(filter));
                    }
                }
                ctx.table_fragments(table)?.to_vec()
            }
        };

        let mut exec = SeqScanExec::new(scan.schema.clone(), fragments, ctx);
        if let Some(pred) = &predicate {
            exec.set_search_condition(pred)?;
        }
        Ok(Box::new(exec))
    }
}

struct Candidate<'c> {
    binding: &'c IndexBinding,
    lookup: IndexLookup,
}

impl Candidate<'_> {
    fn is_equality(&self) -> bool {
        matches!(self.lookup, IndexLookup::Eq(_))
    }
}

fn choose_index<'c>(
    scan: &ScanNode,
    table: &str,
    predicate: &Expr,
    ctx: &'c TaskContext,
) -> Option<(&'c IndexBinding, IndexLookup)> {
    let comparisons: Vec<(&str, BinaryOp, &Datum, DataType)> = predicate
        .conjuncts()
        .into_iter()
        .filter_map(|c| c.as_column_comparison())
        .filter_map(|(name, op, value)| {
            let pos = scan.schema.index_of(name).ok()?;
            let column = scan.schema.column(pos)?;
            Some((column.simple_name(), op, value, column.data_type))
        })
        .filter(|(_, _, value, data_type)| key_compatible(*data_type, value))
        .collect();

    let mut candidates: Vec<Candidate<'c>> = ctx
        .indexes_for(table)
        .into_iter()
        .filter_map(|binding| {
            let on_column: Vec<_> = comparisons
                .iter()
                .filter(|(name, ..)| *name == binding.column)
                .collect();

            if let Some((_, _, value, _)) = on_column.iter().find(|(_, op, ..)| *op == BinaryOp::Eq) {
                return Some(Candidate {
                    binding,
                    lookup: IndexLookup::Eq(key(value)),
                });
            }

            let mut lower = Bound::Unbounded;
            let mut upper = Bound::Unbounded;
            for (_, op, value, _) in &on_column {
                match op {
                    BinaryOp::Gt if lower == Bound::Unbounded => lower = Bound::Excluded(key(value)),
                    BinaryOp::GtEq if lower == Bound::Unbounded => {
                        lower = Bound::Included(key(value))
                    }
                    BinaryOp::Lt if upper == Bound::Unbounded => upper = Bound::Excluded(key(value)),
                    BinaryOp::LtEq if upper == Bound::Unbounded => {
                        upper = Bound::Included(key(value))
                    }
                    _ => {}
                }
            }
            if lower == Bound::Unbounded && upper == Bound::Unbounded {
                return None;
            }
            // a descending index stores larger keys first
            let ascending = binding
                .reader
                .sort_specs()
                .first()
                .map_or(true, |spec| spec.ascending);
            let (lower, upper) = if ascending { (lower, upper) } else { (upper, lower) };
            Some(Candidate {
                binding,
                lookup: IndexLookup::Range { lower, upper },
            })
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.is_equality()
            .cmp(&a.is_equality())
            .then_with(|| a.binding.column.cmp(&b.binding.column))
    });
    candidates
        .into_iter()
        .next()
        .map(|c| (c.binding, c.lookup))
}

fn key(value: &Datum) -> Tuple {
    Tuple::new(vec![value.clone()])
}

/// Whether an index on a column of `data_type` can be searched for `value`
/// with the same result as evaluating the comparison
fn key_compatible(data_type: DataType, value: &Datum) -> bool {
    match value {
        Datum::Null => false,
        Datum::Bool(_) => data_type == DataType::Bool,
        Datum::Text(_) => data_type == DataType::Text,
        Datum::Int4(_) | Datum::Int8(_) | Datum::Float8(_) => data_type.is_numeric(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::executor::{collect_rows, ExecutorErrorCode};
    use crate::index::{TwoLevelIndexReader, TwoLevelIndexWriter};
    use crate::logical::{AggFunc, AggregateExpr};
    use crate::observability::MetricsRegistry;
    use crate::storage::{Fragment, RowAppender};
    use crate::tuple::{Schema, SortSpec};
    use tempfile::TempDir;

    fn table_schema() -> Schema {
        Schema::empty()
            .with_column("id", DataType::Int4)
            .with_column("dept", DataType::Int4)
    }

    fn scan() -> LogicalNode {
        LogicalNode::scan_table("emp", &table_schema())
    }

    /// 100 rows (`dept = id % 10`) plus one ascending index per column,
    /// `dept` descending when `dept_desc` is set
    fn setup(dir: &TempDir, dept_desc: bool) -> TaskContext {
        let data_path = dir.path().join("emp.rows");
        let mut out = RowAppender::create(&data_path).unwrap();
        let mut by_id = Vec::new();
        let mut by_dept = Vec::new();
        for id in 0..100 {
            let offset = out
                .append(&Tuple::new(vec![Datum::Int4(id), Datum::Int4(id % 10)]))
                .unwrap();
            by_id.push((id, offset));
            by_dept.push((id % 10, offset));
        }
        out.close().unwrap();
        by_dept.sort_by_key(|(d, _)| *d);
        if dept_desc {
            by_dept.reverse();
        }

        let data = Fragment::new("emp", data_path);
        let mut ctx = TaskContext::new(Arc::new(MetricsRegistry::new()));
        ctx.add_table_fragment("emp", data.clone());

        let specs = [
            ("id", SortSpec::asc("id"), by_id),
            (
                "dept",
                if dept_desc { SortSpec::desc("dept") } else { SortSpec::asc("dept") },
                by_dept,
            ),
        ];
        for (column, spec, entries) in specs {
            let path = dir.path().join(format!("emp_{}.idx", column));
            let mut writer = TwoLevelIndexWriter::create(
                &path,
                Schema::empty().with_column(column, DataType::Int4),
                vec![spec],
                16,
            )
            .unwrap();
            for (k, offset) in entries {
                writer.write(&Tuple::new(vec![Datum::Int4(k)]), offset).unwrap();
            }
            writer.close().unwrap();
            ctx.add_index(IndexBinding {
                table: "emp".to_string(),
                column: column.to_string(),
                data: data.clone(),
                reader: Arc::new(TwoLevelIndexReader::open(&path).unwrap()),
            });
        }
        ctx
    }

    fn chosen(pred: Expr, ctx: &TaskContext) -> Option<(String, IndexLookup)> {
        let node = scan();
        let scan = match &node {
            LogicalNode::Scan(s) => s,
            _ => unreachable!(),
        };
        choose_index(scan, "emp", &pred, ctx).map(|(b, l)| (b.column.clone(), l))
    }

    #[test]
    fn test_equality_preferred_over_range() {
        let dir = TempDir::new().unwrap();
        let ctx = setup(&dir, false);

        let pred = Expr::col("id").lt(Expr::lit(50)).and(Expr::col("emp.dept").eq(Expr::lit(3)));
        let (column, lookup) = chosen(pred, &ctx).unwrap();
        assert_eq!(column, "dept");
        assert!(matches!(lookup, IndexLookup::Eq(_)));
    }

    #[test]
    fn test_ties_broken_by_column_name() {
        let dir = TempDir::new().unwrap();
        let ctx = setup(&dir, false);

        let pred = Expr::col("id").eq(Expr::lit(5)).and(Expr::col("dept").eq(Expr::lit(5)));
        assert_eq!(chosen(pred, &ctx).unwrap().0, "dept");

        let pred = Expr::col("id").gt(Expr::lit(5)).and(Expr::col("dept").lt(Expr::lit(5)));
        assert_eq!(chosen(pred, &ctx).unwrap().0, "dept");
    }

    #[test]
    fn test_no_index_for_incompatible_or_missing_comparison() {
        let dir = TempDir::new().unwrap();
        let ctx = setup(&dir, false);

        assert!(chosen(Expr::col("id").eq(Expr::lit("x")), &ctx).is_none());
        assert!(chosen(Expr::col("id").is_null(), &ctx).is_none());
    }

    #[test]
    fn test_index_scan_results_match_seq_scan() {
        let dir = TempDir::new().unwrap();
        let ctx = setup(&dir, false);
        let pred = Expr::col("dept").eq(Expr::lit(4)).and(Expr::col("id").gt(Expr::lit(40)));

        let mut exec = PhysicalPlanner::create_exec(&scan().filter(pred.clone()), &ctx).unwrap();
        let mut rows = collect_rows(exec.as_mut()).unwrap();
        rows.sort_by(|a, b| a.get(0).unwrap().total_cmp(b.get(0).unwrap()));
        let ids: Vec<i64> = rows.iter().map(|r| r.get(0).unwrap().as_i64().unwrap()).collect();

        assert_eq!(ids, vec![44, 54, 64, 74, 84, 94]);
        assert_eq!(ctx.metrics().snapshot().index_lookups, 1);
    }

    #[test]
    fn test_descending_index_range() {
        let dir = TempDir::new().unwrap();
        let ctx = setup(&dir, true);
        let pred = Expr::col("dept").gt_eq(Expr::lit(8));

        // the id index cannot serve this predicate
        let (column, lookup) = chosen(pred.clone(), &ctx).unwrap();
        assert_eq!(column, "dept");
        assert!(matches!(
            lookup,
            IndexLookup::Range { lower: Bound::Unbounded, upper: Bound::Included(_) }
        ));

        let mut exec = PhysicalPlanner::create_exec(&scan().filter(pred), &ctx).unwrap();
        let rows = collect_rows(exec.as_mut()).unwrap();
        assert_eq!(rows.len(), 20);
        assert_eq!(rows[0].get(1), Some(&Datum::Int4(9)));
    }

    #[test]
    fn test_group_sort_project_pipeline() {
        let dir = TempDir::new().unwrap();
        let ctx = setup(&dir, false);
        let plan = LogicalNode::root(
            scan()
                .filter(Expr::col("id").lt(Expr::lit(30)))
                .group_by(
                    vec!["dept".to_string()],
                    vec![AggregateExpr::new(AggFunc::Sum, Expr::col("id"), "total")],
                )
                .unwrap()
                .sort(vec![SortSpec::desc("total")])
                .unwrap()
                .project_columns(&["dept"])
                .unwrap(),
        );

        let mut exec = PhysicalPlanner::create_exec(&plan, &ctx).unwrap();
        let rows = collect_rows(exec.as_mut()).unwrap();
        assert_eq!(rows.len(), 10);
        // dept 9 has the largest sum: 9 + 19 + 29
        assert_eq!(rows[0], Tuple::new(vec![Datum::Int4(9)]));
    }

    #[test]
    fn test_cancel_reaches_every_operator() {
        let dir = TempDir::new().unwrap();
        let ctx = setup(&dir, false);
        let grouped = scan()
            .group_by(
                vec!["dept".to_string()],
                vec![AggregateExpr::new(AggFunc::Sum, Expr::col("id"), "total")],
            )
            .unwrap();
        let sorted = scan().sort(vec![SortSpec::asc("id")]).unwrap();
        let plans = [
            sorted.clone(),
            grouped.clone(),
            grouped.filter(Expr::col("total").gt(Expr::lit(0))),
            sorted.project_columns(&["id"]).unwrap(),
        ];

        for plan in plans {
            let signal = crate::executor::CancelSignal::new();
            let mut ctx = TaskContext::new(Arc::clone(ctx.metrics()))
                .with_cancel_signal(signal.clone());
            ctx.add_table_fragment("emp", Fragment::new("emp", dir.path().join("emp.rows")));

            let mut exec = PhysicalPlanner::create_exec(&plan, &ctx).unwrap();
            exec.init().unwrap();
            assert!(exec.next().unwrap().is_some());
            signal.cancel();
            let err = exec.next().err().unwrap();
            assert_eq!(err.code(), ExecutorErrorCode::TesseraExecCancelled, "{}", exec.name());
            exec.close().unwrap();
        }
    }

    #[test]
    fn test_create_table_not_executable() {
        let ctx = TaskContext::new(Arc::new(MetricsRegistry::new()));
        let err = PhysicalPlanner::create_exec(&LogicalNode::create_table("t", table_schema()), &ctx)
            .err()
            .unwrap();
        assert_eq!(err.code(), ExecutorErrorCode::TesseraExecInvalidPlan);
    }

    #[test]
    fn test_missing_intermediate_is_invalid_plan() {
        let ctx = TaskContext::new(Arc::new(MetricsRegistry::new()));
        let plan = LogicalNode::intermediate_scan(7, table_schema(), None);
        assert!(PhysicalPlanner::create_exec(&plan, &ctx).is_err());
    }
}
