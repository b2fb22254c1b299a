//! Global planner
//!
//! Partitions a logical plan into execution blocks. The walk is post-order
//! with a fragment accumulator: scans open a fragment, filters and
//! projections extend the fragment of their input, and blocking operators
//! (join, sort, group by) close their input fragments into blocks and open a
//! new fragment that reads those blocks through intermediate scans.
//!
//! With a catalog, scanned tables must be registered and every aggregate
//! must resolve to a registered aggregate function of the same result type.
//!
//! Filters and projections left above the topmost blocking operator become a
//! separate terminal store block, so one join of two scans plans to three
//! blocks and `PROJECT(J(J(J(J(a, b), c), d), e))` to ten.

use super::block::{ExecutionBlock, ExecutionBlockId, QueryId, Shuffle};
use super::errors::{PlannerError, PlannerResult};
use super::master_plan::MasterPlan;
use crate::catalog::{Catalog, FunctionKind};
use crate::logical::{
    FilterNode, GroupByNode, JoinNode, LogicalNode, ProjectionNode, ScanSource, SortNode,
};
use crate::observability::{log_event_with_fields, Event};

/// Builds the raw (unoptimized) execution block DAG of a query
pub struct GlobalPlanner<'a> {
    catalog: Option<&'a dyn Catalog>,
}

/// An open block: sub-plan accumulated so far plus the blocks it reads
struct Fragment {
    plan: LogicalNode,
    inputs: Vec<ExecutionBlockId>,
    row_hint: Option<u64>,
}

struct BuildContext<'a> {
    query_id: QueryId,
    catalog: Option<&'a dyn Catalog>,
    next_seq: u32,
    blocks: Vec<ExecutionBlock>,
}

impl<'a> GlobalPlanner<'a> {
    /// Planner that trusts the tables and row hints in the plan
    pub fn new() -> Self {
        Self { catalog: None }
    }

    /// Planner that checks scanned tables against `catalog` and fills
    /// missing scan row hints from table statistics
    pub fn with_catalog(catalog: &'a dyn Catalog) -> Self {
        Self {
            catalog: Some(catalog),
        }
    }

    pub fn build(&self, query_id: QueryId, root: &LogicalNode) -> PlannerResult<MasterPlan> {
        let child = match root {
            LogicalNode::Root(node) => node.child.as_ref(),
            other => {
                return Err(PlannerError::planning(format!(
                    "Plan must start at ROOT, found {}",
                    other.kind_name()
                )))
            }
        };
        if let LogicalNode::CreateTable(node) = child {
            return Err(PlannerError::planning(format!(
                "CREATE TABLE {} is not a query; execute it through the coordinator",
                node.table
            )));
        }
        if child.scan_count() == 0 {
            return Err(PlannerError::planning("Plan has no scan leaf"));
        }

        let mut ctx = BuildContext {
            query_id,
            catalog: self.catalog,
            next_seq: 1,
            blocks: Vec::new(),
        };
        let top = ctx.visit(child)?;
        let terminal = ctx.finish(top);

        let plan = MasterPlan::new(query_id, ctx.blocks, terminal)?;
        log_event_with_fields(
            Event::GlobalPlanBuilt,
            &[
                ("query_id", &query_id.to_string()),
                ("blocks", &plan.len().to_string()),
                ("edges", &plan.edge_count().to_string()),
            ],
        );
        Ok(plan)
    }
}

impl Default for GlobalPlanner<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildContext<'_> {
    fn visit(&mut self, node: &LogicalNode) -> PlannerResult<Fragment> {
        match node {
            LogicalNode::Scan(scan) => {
                let table = match &scan.source {
                    ScanSource::Table { table } => table,
                    ScanSource::Intermediate { seq } => {
                        return Err(PlannerError::planning(format!(
                            "Query plans cannot read intermediate block #{}",
                            seq
                        )))
                    }
                };
                let mut row_hint = scan.row_hint;
                if let Some(catalog) = self.catalog {
                    let desc = catalog
                        .get_table(table)
                        .map_err(|e| PlannerError::planning(e.to_string()))?;
                    row_hint = row_hint.or_else(|| desc.row_count());
                }
                let mut scan = scan.clone();
                scan.row_hint = row_hint;
                Ok(Fragment {
                    plan: LogicalNode::Scan(scan),
                    inputs: Vec::new(),
                    row_hint,
                })
            }

            LogicalNode::Filter(filter) => {
                let mut fragment = self.visit(&filter.input)?;
                fragment.plan = LogicalNode::Filter(FilterNode {
                    predicate: filter.predicate.clone(),
                    input: Box::new(fragment.plan),
                });
                Ok(fragment)
            }

            LogicalNode::Projection(proj) => {
                let mut fragment = self.visit(&proj.input)?;
                fragment.plan = LogicalNode::Projection(ProjectionNode {
                    targets: proj.targets.clone(),
                    input: Box::new(fragment.plan),
                    schema: proj.schema.clone(),
                });
                Ok(fragment)
            }

            LogicalNode::Join(join) => {
                let keys = join
                    .condition
                    .as_ref()
                    .map(|c| c.equi_join_keys(join.left.schema(), join.right.schema()))
                    .unwrap_or_default();
                let (left_keys, right_keys): (Vec<String>, Vec<String>) = keys.into_iter().unzip();

                let left = self.visit(&join.left)?;
                let left_hint = left.row_hint;
                let (left_id, left_scan) = self.close(left, Shuffle::Hash { keys: left_keys });
                let right = self.visit(&join.right)?;
                let right_hint = right.row_hint;
                let (right_id, right_scan) = self.close(right, Shuffle::Hash { keys: right_keys });

                Ok(Fragment {
                    plan: LogicalNode::Join(JoinNode {
                        join_type: join.join_type,
                        condition: join.condition.clone(),
                        left: Box::new(left_scan),
                        right: Box::new(right_scan),
                        schema: join.schema.clone(),
                    }),
                    inputs: vec![left_id, right_id],
                    row_hint: match (left_hint, right_hint) {
                        (Some(l), Some(r)) => Some(l.max(r)),
                        _ => None,
                    },
                })
            }

            LogicalNode::Sort(sort) => {
                let input = self.visit(&sort.input)?;
                let row_hint = input.row_hint;
                let (id, scan) = self.close(
                    input,
                    Shuffle::Range {
                        specs: sort.specs.clone(),
                    },
                );
                Ok(Fragment {
                    plan: LogicalNode::Sort(SortNode {
                        specs: sort.specs.clone(),
                        input: Box::new(scan),
                    }),
                    inputs: vec![id],
                    row_hint,
                })
            }

            LogicalNode::GroupBy(group) => {
                if let Some(catalog) = self.catalog {
                    resolve_aggregates(catalog, group)?;
                }
                let input = self.visit(&group.input)?;
                let row_hint = input.row_hint;
                let (id, scan) = self.close(
                    input,
                    Shuffle::Hash {
                        keys: group.keys.clone(),
                    },
                );
                Ok(Fragment {
                    plan: LogicalNode::GroupBy(GroupByNode {
                        keys: group.keys.clone(),
                        aggregates: group.aggregates.clone(),
                        input: Box::new(scan),
                        schema: group.schema.clone(),
                    }),
                    inputs: vec![id],
                    row_hint,
                })
            }

            LogicalNode::Root(_) => Err(PlannerError::planning("ROOT may only appear at the top")),

            LogicalNode::CreateTable(node) => Err(PlannerError::planning(format!(
                "CREATE TABLE {} cannot appear inside a query",
                node.table
            ))),
        }
    }

    fn next_id(&mut self) -> ExecutionBlockId {
        let id = ExecutionBlockId::new(self.query_id, self.next_seq);
        self.next_seq += 1;
        id
    }

    /// Seals `fragment` into a block and returns the scan that reads it
    fn close(&mut self, fragment: Fragment, output: Shuffle) -> (ExecutionBlockId, LogicalNode) {
        let id = self.next_id();
        let scan = LogicalNode::intermediate_scan(
            id.seq,
            fragment.plan.schema().clone(),
            fragment.row_hint,
        );
        self.blocks.push(
            ExecutionBlock::new(id.clone(), fragment.plan)
                .with_inputs(fragment.inputs)
                .with_output(output)
                .with_row_hint(fragment.row_hint),
        );
        (id, scan)
    }

    /// Seals the top fragment as the terminal block, splitting off a store
    /// block when filters or projections sit above a blocking operator
    fn finish(&mut self, top: Fragment) -> ExecutionBlockId {
        if top.plan.is_blocking() {
            return self.seal_terminal(top);
        }

        let seq = self.next_seq;
        match detach_blocking(top.plan, seq, top.row_hint) {
            Ok((store, blocking)) => {
                let output = match &blocking {
                    LogicalNode::Sort(sort) => Shuffle::Range {
                        specs: sort.specs.clone(),
                    },
                    _ => Shuffle::Hash { keys: Vec::new() },
                };
                let (id, _) = self.close(
                    Fragment {
                        plan: blocking,
                        inputs: top.inputs,
                        row_hint: top.row_hint,
                    },
                    output,
                );
                self.seal_terminal(Fragment {
                    plan: store,
                    inputs: vec![id],
                    row_hint: top.row_hint,
                })
            }
            Err(plan) => self.seal_terminal(Fragment {
                plan,
                inputs: top.inputs,
                row_hint: top.row_hint,
            }),
        }
    }

    fn seal_terminal(&mut self, fragment: Fragment) -> ExecutionBlockId {
        let id = self.next_id();
        self.blocks.push(
            ExecutionBlock::new(id.clone(), fragment.plan)
                .with_inputs(fragment.inputs)
                .with_row_hint(fragment.row_hint),
        );
        id
    }
}

/// Detaches the topmost blocking operator under a chain of filters and
/// projections, leaving a scan of block `seq` in its place.
///
/// Returns the plan unchanged when the chain reaches a scan first.
fn detach_blocking(
    plan: LogicalNode,
    seq: u32,
    row_hint: Option<u64>,
) -> Result<(LogicalNode, LogicalNode), LogicalNode> {
    match plan {
        LogicalNode::Filter(FilterNode { predicate, input }) => {
            match detach_blocking(*input, seq, row_hint) {
                Ok((upper, lower)) => Ok((
                    LogicalNode::Filter(FilterNode {
                        predicate,
                        input: Box::new(upper),
                    }),
                    lower,
                )),
                Err(input) => Err(LogicalNode::Filter(FilterNode {
                    predicate,
                    input: Box::new(input),
                })),
            }
        }
        LogicalNode::Projection(ProjectionNode {
            targets,
            input,
            schema,
        }) => match detach_blocking(*input, seq, row_hint) {
            Ok((upper, lower)) => Ok((
                LogicalNode::Projection(ProjectionNode {
                    targets,
                    input: Box::new(upper),
                    schema,
                }),
                lower,
            )),
            Err(input) => Err(LogicalNode::Projection(ProjectionNode {
                targets,
                input: Box::new(input),
                schema,
            })),
        },
        node if node.is_blocking() => {
            let scan = LogicalNode::intermediate_scan(seq, node.schema().clone(), row_hint);
            Ok((scan, node))
        }
        other => Err(other),
    }
}

/// Looks every aggregate of `group` up in the function registry
fn resolve_aggregates(catalog: &dyn Catalog, group: &GroupByNode) -> PlannerResult<()> {
    let input = group.input.schema();
    let outputs = group.schema.columns().get(group.keys.len()..).unwrap_or(&[]);
    for (agg, output) in group.aggregates.iter().zip(outputs) {
        let arg_types = match &agg.arg {
            Some(arg) => vec![arg
                .data_type(input)
                .map_err(|e| PlannerError::planning(e.to_string()))?],
            None => Vec::new(),
        };
        let func = catalog
            .get_function(agg.func.name(), &arg_types)
            .map_err(|e| PlannerError::planning(e.to_string()))?;
        if func.kind != FunctionKind::Aggregate || func.return_type != output.data_type {
            return Err(PlannerError::planning(format!(
                "{} is a {} function returning {}, {} expects {}",
                func.signature(),
                func.kind,
                func.return_type.as_str(),
                agg.name,
                output.data_type.as_str()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MemCatalog, StoreType, TableDesc, TableMeta, TableStats};
    use crate::logical::{AggFunc, AggregateExpr, Expr, JoinType};
    use crate::planner::PlannerErrorCode;
    use crate::tuple::{DataType, Schema, SortSpec};

    fn table(name: &str) -> LogicalNode {
        LogicalNode::scan_table(
            name,
            &Schema::empty()
                .with_column("id", DataType::Int4)
                .with_column("name", DataType::Text),
        )
    }

    fn on(left: &str, right: &str) -> Expr {
        Expr::col(format!("{}.id", left)).eq(Expr::col(format!("{}.id", right)))
    }

    #[test]
    fn test_single_join_plans_three_blocks() {
        let root = LogicalNode::root(table("a").inner_join(table("b"), on("a", "b")));
        let plan = GlobalPlanner::new().build(QueryId::new(), &root).unwrap();

        assert_eq!(plan.len(), 3);
        let terminal = plan.terminal();
        assert_eq!(terminal.inputs.len(), 2);
        assert_eq!(terminal.plan.kind_name(), "JOIN");
        for leaf in plan.leaves() {
            assert!(matches!(&leaf.output, Shuffle::Hash { keys } if keys.len() == 1));
        }
    }

    #[test]
    fn test_projection_over_joins_gets_store_block() {
        let joined = table("a")
            .inner_join(table("b"), on("a", "b"))
            .inner_join(table("c"), on("b", "c"))
            .inner_join(table("d"), on("c", "d"))
            .inner_join(table("e"), on("d", "e"));
        let root = LogicalNode::root(joined.project_columns(&["a.name", "e.name"]).unwrap());
        let plan = GlobalPlanner::new().build(QueryId::new(), &root).unwrap();

        assert_eq!(plan.len(), 10);
        let terminal = plan.terminal();
        assert_eq!(terminal.plan.kind_name(), "PROJECTION");
        assert_eq!(terminal.inputs.len(), 1);
        let below = plan.block(&terminal.inputs[0]).unwrap();
        assert_eq!(below.plan.kind_name(), "JOIN");
        assert_eq!(below.output, Shuffle::Hash { keys: vec![] });
    }

    #[test]
    fn test_filter_over_scan_is_single_block() {
        let root = LogicalNode::root(
            table("a")
                .filter(Expr::col("a.id").gt(Expr::lit(5)))
                .project_columns(&["a.name"])
                .unwrap(),
        );
        let plan = GlobalPlanner::new().build(QueryId::new(), &root).unwrap();
        assert_eq!(plan.len(), 1);
        assert!(plan.terminal().is_leaf());
    }

    #[test]
    fn test_sort_and_group_by_shuffles() {
        let grouped = table("a")
            .group_by(vec!["a.name".into()], vec![AggregateExpr::count_star("n")])
            .unwrap();
        let root = LogicalNode::root(grouped.sort(vec![SortSpec::desc("n")]).unwrap());
        let plan = GlobalPlanner::new().build(QueryId::new(), &root).unwrap();

        assert_eq!(plan.len(), 3);
        let outputs: Vec<&Shuffle> = plan.blocks().map(|b| &b.output).collect();
        assert_eq!(
            outputs,
            vec![
                &Shuffle::Hash {
                    keys: vec!["a.name".into()]
                },
                &Shuffle::Range {
                    specs: vec![SortSpec::desc("n")]
                },
                &Shuffle::None,
            ]
        );
    }

    #[test]
    fn test_cross_join_single_partition() {
        let root = LogicalNode::root(table("a").join(table("b"), JoinType::Cross, None));
        let plan = GlobalPlanner::new().build(QueryId::new(), &root).unwrap();
        for leaf in plan.leaves() {
            assert_eq!(leaf.output, Shuffle::Hash { keys: vec![] });
        }
    }

    #[test]
    fn test_rejects_non_queries() {
        let planner = GlobalPlanner::new();
        let ddl = LogicalNode::root(LogicalNode::create_table(
            "t",
            Schema::empty().with_column("id", DataType::Int4),
        ));
        let err = planner.build(QueryId::new(), &ddl).unwrap_err();
        assert_eq!(err.code(), PlannerErrorCode::TesseraPlanningError);

        let nested = LogicalNode::root(LogicalNode::root(table("a")));
        assert!(planner.build(QueryId::new(), &nested).is_err());

        assert!(planner.build(QueryId::new(), &table("a")).is_err());
    }

    #[test]
    fn test_catalog_fills_row_hints() {
        let catalog = MemCatalog::new();
        let schema = Schema::empty().with_column("id", DataType::Int4);
        catalog
            .add_table(TableDesc::new(
                "a",
                TableMeta::new(schema.clone(), StoreType::RowFile).with_stats(TableStats {
                    num_rows: 42,
                    num_bytes: 1024,
                }),
                "/tmp/a.rows",
            ))
            .unwrap();

        let root = LogicalNode::root(LogicalNode::scan_table("a", &schema));
        let plan = GlobalPlanner::with_catalog(&catalog)
            .build(QueryId::new(), &root)
            .unwrap();
        assert_eq!(plan.terminal().row_hint, Some(42));

        let missing = LogicalNode::root(LogicalNode::scan_table("zz", &schema));
        assert!(GlobalPlanner::with_catalog(&catalog)
            .build(QueryId::new(), &missing)
            .is_err());
    }

    #[test]
    fn test_aggregates_resolved_through_catalog() {
        let catalog = MemCatalog::new();
        let schema = Schema::empty()
            .with_column("dept", DataType::Int4)
            .with_column("salary", DataType::Int8);
        catalog
            .add_table(TableDesc::new(
                "emp",
                TableMeta::new(schema.clone(), StoreType::RowFile),
                "/tmp/emp.rows",
            ))
            .unwrap();
        let root = LogicalNode::root(
            LogicalNode::scan_table("emp", &schema)
                .group_by(
                    vec!["dept".to_string()],
                    vec![
                        AggregateExpr::count_star("n"),
                        AggregateExpr::new(AggFunc::Sum, Expr::col("salary"), "total"),
                    ],
                )
                .unwrap(),
        );
        assert!(GlobalPlanner::with_catalog(&catalog).build(QueryId::new(), &root).is_ok());

        catalog.unregister_function("sum", &[DataType::Int8]).unwrap();
        let err = GlobalPlanner::with_catalog(&catalog)
            .build(QueryId::new(), &root)
            .unwrap_err();
        assert!(err.message().contains("sum(INT8)"), "{}", err.message());

        // without a catalog nothing is looked up
        assert!(GlobalPlanner::new().build(QueryId::new(), &root).is_ok());
    }
}
