//! Plan Metrics - derived timing and estimate figures
//!
//! Exclusive time is computed per node as soon as its children exist. The
//! remaining metrics need the plan-wide execution time and are filled in by
//! [`annotate`] once the whole tree has been built.

use crate::explain::plan::PlanNode;

/// Share of execution time above which a node is flagged as a bottleneck
pub const BOTTLENECK_THRESHOLD_PERCENT: f64 = 30.0;

/// Time attributable to `node` alone, in milliseconds
///
/// Subtracts each direct child's `total × loops` from the node's own
/// `total × loops`, clamped at zero. Returns `None` when the node has no
/// actual timing.
pub fn exclusive_time(node: &PlanNode) -> Option<f64> {
    let own = node.inclusive_time_ms()?;
    let children: f64 = node
        .children
        .iter()
        .filter_map(PlanNode::inclusive_time_ms)
        .sum();
    Some((own - children).max(0.0))
}

/// Stores the exclusive time of a node whose children are complete
pub(crate) fn compute_exclusive_time(node: &mut PlanNode) {
    node.metrics.exclusive_time_ms = exclusive_time(node);
}

/// Actual rows divided by the estimate, guarding against a zero estimate
pub fn rows_estimate_ratio(node: &PlanNode) -> Option<f64> {
    node.actual_rows.map(|actual| actual / node.rows.max(1.0))
}

/// Fills ratio, percentage and bottleneck metrics for the whole tree
///
/// Percentages are only computed when `execution_time_ms` is positive;
/// otherwise they stay undefined and no node is flagged.
pub fn annotate(root: &mut PlanNode, execution_time_ms: f64) {
    let total = (execution_time_ms > 0.0).then_some(execution_time_ms);
    annotate_node(root, total);
}

fn annotate_node(node: &mut PlanNode, total: Option<f64>) {
    node.metrics.rows_estimate_ratio = rows_estimate_ratio(node);
    node.metrics.time_percentage = match (node.metrics.exclusive_time_ms, total) {
        (Some(exclusive), Some(total)) => Some(exclusive / total * 100.0),
        _ => None,
    };
    node.metrics.is_bottleneck = node
        .metrics
        .time_percentage
        .is_some_and(|pct| pct > BOTTLENECK_THRESHOLD_PERCENT);

    for child in &mut node.children {
        annotate_node(child, total);
    }
}
