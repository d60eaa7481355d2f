use super::plan::PlanNode;

/// Collapses a Limit sitting directly above a Sort into a single TopN
/// node. Children are rewritten bottom-up first, so the pattern also fires
/// under other operators.
pub fn optimize_sort_limit_as_topn(plan: PlanNode) -> PlanNode {
    let plan = match plan {
        PlanNode::SeqScan { .. } => plan,
        PlanNode::Sort { order_by, child } => PlanNode::Sort {
            order_by,
            child: Box::new(optimize_sort_limit_as_topn(*child)),
        },
        PlanNode::Limit { limit, child } => PlanNode::Limit {
            limit,
            child: Box::new(optimize_sort_limit_as_topn(*child)),
        },
        PlanNode::TopN { order_by, n, child } => PlanNode::TopN {
            order_by,
            n,
            child: Box::new(optimize_sort_limit_as_topn(*child)),
        },
    };

    match plan {
        PlanNode::Limit { limit, child } => match *child {
            PlanNode::Sort {
                order_by,
                child: sort_child,
            } => PlanNode::TopN {
                order_by,
                n: limit,
                child: sort_child,
            },
            other => PlanNode::Limit {
                limit,
                child: Box::new(other),
            },
        },
        other => other,
    }
}
