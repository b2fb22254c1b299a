//! Global optimizer
//!
//! Rule-based rewrites of the execution block DAG, applied in a fixed order
//! until none applies. Each rewrite assembles a fresh `MasterPlan`, so every
//! intermediate plan is validated; operator semantics never change.

use super::block::{ExecutionBlock, ExecutionBlockId, Shuffle};
use super::errors::{PlannerError, PlannerResult};
use super::master_plan::MasterPlan;
use crate::logical::{
    FilterNode, GroupByNode, JoinNode, JoinType, LogicalNode, ProjectionNode, RootNode, ScanNode,
    ScanSource, SortNode,
};
use crate::observability::{log_event_with_fields, Event};

/// One DAG rewrite
pub trait RewriteRule {
    fn name(&self) -> &'static str;

    /// The plan after a single application, or `None` when the rule does not
    /// apply anywhere
    fn rewrite(&self, plan: &MasterPlan) -> PlannerResult<Option<MasterPlan>>;
}

/// Applies rewrite rules to a fixpoint under a rewrite cap
pub struct GlobalOptimizer {
    max_rewrites: usize,
    rules: Vec<Box<dyn RewriteRule>>,
}

impl GlobalOptimizer {
    /// Optimizer with the standard rules: pass-through fusion, then
    /// broadcast join
    pub fn new(max_rewrites: usize, broadcast_threshold_rows: u64) -> Self {
        Self {
            max_rewrites,
            rules: vec![
                Box::new(PassThroughFusion),
                Box::new(BroadcastJoin {
                    threshold_rows: broadcast_threshold_rows,
                }),
            ],
        }
    }

    /// Optimizer with a custom rule list, tried in order
    pub fn with_rules(max_rewrites: usize, rules: Vec<Box<dyn RewriteRule>>) -> Self {
        Self {
            max_rewrites,
            rules,
        }
    }

    pub fn optimize(&self, plan: MasterPlan) -> PlannerResult<MasterPlan> {
        self.optimize_counted(plan).map(|(plan, _)| plan)
    }

    /// Optimizes and reports how many rewrites were applied.
    ///
    /// Fails with `TESSERA_OPTIMIZATION_LIMIT_EXCEEDED` when `max_rewrites`
    /// rewrites have been applied and a rule still applies.
    pub fn optimize_counted(&self, plan: MasterPlan) -> PlannerResult<(MasterPlan, usize)> {
        let mut plan = plan;
        let mut applied = 0usize;
        let before = plan.len();

        'fixpoint: loop {
            for rule in &self.rules {
                if let Some(next) = rule.rewrite(&plan)? {
                    if applied >= self.max_rewrites {
                        return Err(PlannerError::optimization_limit(self.max_rewrites, rule.name()));
                    }
                    applied += 1;
                    log_event_with_fields(
                        Event::RewriteApplied,
                        &[
                            ("query_id", &plan.query_id().to_string()),
                            ("rule", rule.name()),
                            ("blocks", &next.len().to_string()),
                        ],
                    );
                    plan = next;
                    continue 'fixpoint;
                }
            }
            break;
        }

        log_event_with_fields(
            Event::GlobalPlanOptimized,
            &[
                ("query_id", &plan.query_id().to_string()),
                ("rewrites", &applied.to_string()),
                ("blocks_before", &before.to_string()),
                ("blocks_after", &plan.len().to_string()),
            ],
        );
        Ok((plan, applied))
    }
}

/// Fuses a block that only filters or projects its single input into that
/// input. The input block takes over the operators, the output shuffle and
/// the consumers (or terminal status) of the fused block.
pub struct PassThroughFusion;

impl RewriteRule for PassThroughFusion {
    fn name(&self) -> &'static str {
        "pass_through_fusion"
    }

    fn rewrite(&self, plan: &MasterPlan) -> PlannerResult<Option<MasterPlan>> {
        let candidate = plan.blocks().find(|parent| {
            parent.inputs.len() == 1
                && is_pass_through(&parent.plan)
                && plan.consumers(&parent.inputs[0]).len() == 1
        });
        let parent = match candidate {
            Some(parent) => parent,
            None => return Ok(None),
        };
        let parent_id = parent.id.clone();
        let child_id = parent.inputs[0].clone();
        let child = plan.block(&child_id).ok_or_else(|| {
            PlannerError::planning_at(parent_id.clone(), format!("Input {} missing", child_id))
        })?;

        let mut child_plan = Some(child.plan.clone());
        let fused_plan = map_scans(parent.plan.clone(), &mut |scan| {
            let reads_child = scan.source == (ScanSource::Intermediate { seq: child_id.seq });
            match child_plan.take() {
                Some(inner) if reads_child => match scan.filter {
                    Some(predicate) => LogicalNode::Filter(FilterNode {
                        predicate,
                        input: Box::new(inner),
                    }),
                    None => inner,
                },
                other => {
                    child_plan = other;
                    LogicalNode::Scan(scan)
                }
            }
        });
        let fused = ExecutionBlock::new(child_id.clone(), fused_plan)
            .with_inputs(child.inputs.clone())
            .with_output(parent.output.clone())
            .with_row_hint(parent.row_hint.or(child.row_hint));

        let (query_id, blocks, terminal) = plan.clone().into_parts();
        let mut rewritten = Vec::with_capacity(blocks.len() - 1);
        for block in blocks {
            if block.id == parent_id {
                continue;
            }
            if block.id == child_id {
                rewritten.push(fused.clone());
                continue;
            }
            if block.inputs.contains(&parent_id) {
                rewritten.push(redirect_input(block, &parent_id, &child_id));
            } else {
                rewritten.push(block);
            }
        }
        let terminal = if terminal == parent_id {
            child_id
        } else {
            terminal
        };

        MasterPlan::new(query_id, rewritten, terminal).map(Some)
    }
}

/// Marks the smaller input of a join block `Shuffle::Broadcast` when its row
/// hint is at most `threshold_rows`. At most one side of a join is
/// broadcast, and never the preserved side of a left outer join.
pub struct BroadcastJoin {
    pub threshold_rows: u64,
}

impl RewriteRule for BroadcastJoin {
    fn name(&self) -> &'static str {
        "broadcast_join"
    }

    fn rewrite(&self, plan: &MasterPlan) -> PlannerResult<Option<MasterPlan>> {
        for block in plan.blocks() {
            let (join_type, left_seq, right_seq) = match find_block_join(&block.plan) {
                Some(found) => found,
                None => continue,
            };
            let (left, right) = match (plan.block_by_seq(left_seq), plan.block_by_seq(right_seq)) {
                (Some(l), Some(r)) => (l, r),
                _ => continue,
            };
            if left.output.is_broadcast() || right.output.is_broadcast() {
                continue;
            }

            let sides = match join_type {
                JoinType::LeftOuter => vec![right],
                JoinType::Inner | JoinType::Cross => vec![left, right],
            };
            // ties go to the right input
            let chosen = sides
                .iter()
                .filter(|side| plan.consumers(&side.id).len() == 1)
                .filter_map(|side| side.row_hint.map(|rows| (rows, *side)))
                .filter(|(rows, _)| *rows <= self.threshold_rows)
                .min_by(|(a, x), (b, y)| a.cmp(b).then(y.id.seq.cmp(&x.id.seq)))
                .map(|(_, side)| side.id.clone());

            if let Some(target) = chosen {
                let (query_id, blocks, terminal) = plan.clone().into_parts();
                let blocks = blocks
                    .into_iter()
                    .map(|b| {
                        if b.id == target {
                            b.with_output(Shuffle::Broadcast)
                        } else {
                            b
                        }
                    })
                    .collect();
                return MasterPlan::new(query_id, blocks, terminal).map(Some);
            }
        }
        Ok(None)
    }
}

/// Whether `plan` is only filters and projections over one intermediate scan
fn is_pass_through(plan: &LogicalNode) -> bool {
    match plan {
        LogicalNode::Filter(n) => is_pass_through(&n.input),
        LogicalNode::Projection(n) => is_pass_through(&n.input),
        LogicalNode::Scan(n) => matches!(n.source, ScanSource::Intermediate { .. }),
        _ => false,
    }
}

/// The join reading two intermediate scans directly, if the block has one
fn find_block_join(plan: &LogicalNode) -> Option<(JoinType, u32, u32)> {
    if let LogicalNode::Join(join) = plan {
        if let (LogicalNode::Scan(l), LogicalNode::Scan(r)) = (join.left.as_ref(), join.right.as_ref())
        {
            if let (ScanSource::Intermediate { seq: ls }, ScanSource::Intermediate { seq: rs }) =
                (&l.source, &r.source)
            {
                return Some((join.join_type, *ls, *rs));
            }
        }
    }
    plan.children().into_iter().find_map(find_block_join)
}

fn redirect_input(
    block: ExecutionBlock,
    from: &ExecutionBlockId,
    to: &ExecutionBlockId,
) -> ExecutionBlock {
    let inputs = block
        .inputs
        .iter()
        .map(|id| if id == from { to.clone() } else { id.clone() })
        .collect();
    let plan = map_scans(block.plan, &mut |mut scan| {
        if scan.source == (ScanSource::Intermediate { seq: from.seq }) {
            scan.source = ScanSource::Intermediate { seq: to.seq };
        }
        LogicalNode::Scan(scan)
    });
    ExecutionBlock {
        inputs,
        plan,
        ..block
    }
}

/// Rebuilds `node` with every scan replaced by `f(scan)`
fn map_scans(node: LogicalNode, f: &mut dyn FnMut(ScanNode) -> LogicalNode) -> LogicalNode {
    match node {
        LogicalNode::Scan(scan) => f(scan),
        LogicalNode::Root(n) => LogicalNode::Root(RootNode {
            child: Box::new(map_scans(*n.child, f)),
        }),
        LogicalNode::Join(n) => LogicalNode::Join(JoinNode {
            left: Box::new(map_scans(*n.left, f)),
            right: Box::new(map_scans(*n.right, f)),
            ..n
        }),
        LogicalNode::Filter(n) => LogicalNode::Filter(FilterNode {
            input: Box::new(map_scans(*n.input, f)),
            ..n
        }),
        LogicalNode::GroupBy(n) => LogicalNode::GroupBy(GroupByNode {
            input: Box::new(map_scans(*n.input, f)),
            ..n
        }),
        LogicalNode::Sort(n) => LogicalNode::Sort(SortNode {
            input: Box::new(map_scans(*n.input, f)),
            ..n
        }),
        LogicalNode::Projection(n) => LogicalNode::Projection(ProjectionNode {
            input: Box::new(map_scans(*n.input, f)),
            ..n
        }),
        ddl @ LogicalNode::CreateTable(_) => ddl,
    }
}
