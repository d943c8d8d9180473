//! PostgreSQL JSON EXPLAIN Transformer
//!
//! Converts `EXPLAIN (ANALYZE, FORMAT JSON)` output into the plan model.
//!
//! # Examples
//!
//! ```
//! use planlens_analyzer::explain::json::parse_json_explain;
//!
//! let json_output = r#"[
//!   {
//!     "Plan": {
//!       "Node Type": "Seq Scan",
//!       "Relation Name": "users",
//!       "Startup Cost": 0.0,
//!       "Total Cost": 10.0,
//!       "Plan Rows": 100,
//!       "Plan Width": 36
//!     }
//!   }
//! ]"#;
//!
//! let plan = parse_json_explain(json_output).unwrap();
//! assert_eq!(plan.root.node_type, "Seq Scan");
//! assert_eq!(plan.root.relation.as_deref(), Some("users"));
//! ```

use crate::explain::error::{ExplainError, Result};
use crate::explain::format::PlanFormat;
use crate::explain::metrics;
use crate::explain::plan::{
    ActualTime, MAX_PLAN_DEPTH, NodeCost, NodeIdGen, ParseResult, PlanNode,
};
use serde_json::Value;

/// Operator name given to node objects that lack a `Node Type`
pub const UNKNOWN_NODE_TYPE: &str = "Unknown";

/// Parses PostgreSQL EXPLAIN (FORMAT JSON) output
///
/// Text surrounding the document (a psql header, a trailing row count) is
/// tolerated: if the input does not parse as a whole, the first well-formed
/// array or object inside it is used instead.
pub fn parse_json_explain(json: &str) -> Result<ParseResult> {
    let document = parse_document(json)?;
    transform_document(&document)
}

/// Transforms an already deserialized EXPLAIN document
///
/// PostgreSQL wraps the plan in a one-element array; a bare object is
/// accepted as well.
pub fn transform_document(document: &Value) -> Result<ParseResult> {
    let top = match document {
        Value::Array(items) => items.first().ok_or(ExplainError::MissingRoot)?,
        other => other,
    };
    let plan_obj = top
        .get("Plan")
        .filter(|plan| plan.is_object())
        .ok_or(ExplainError::MissingRoot)?;

    let mut ids = NodeIdGen::new();
    let mut root = transform_node(plan_obj, &mut ids, 1)?;

    // Servers before 9.4 report "Total Runtime" instead of "Execution Time"
    let execution_time = top
        .get("Execution Time")
        .or_else(|| top.get("Total Runtime"))
        .and_then(Value::as_f64);
    let planning_time = top.get("Planning Time").and_then(Value::as_f64);

    let execution_time = execution_time.unwrap_or(0.0);
    metrics::annotate(&mut root, execution_time);

    let mut plan = ParseResult::new(root, PlanFormat::Structured).with_execution_time(execution_time);
    if let Some(ms) = planning_time {
        plan = plan.with_planning_time(ms);
    }
    Ok(plan)
}

fn parse_document(input: &str) -> Result<Value> {
    match serde_json::from_str::<Value>(input) {
        Ok(value) => Ok(value),
        Err(err) => match recover_document(input) {
            Some(value) => Ok(value),
            None => Err(ExplainError::InvalidDocumentFormat(err)),
        },
    }
}

/// Finds the first array or object in `input` that parses on its own
fn recover_document(input: &str) -> Option<Value> {
    input
        .char_indices()
        .filter(|(_, c)| matches!(c, '[' | '{'))
        .find_map(|(offset, _)| {
            let mut stream = serde_json::Deserializer::from_str(&input[offset..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value)) if value.is_array() || value.is_object() => {
                    tracing::debug!(offset, "recovered JSON document from surrounding text");
                    Some(value)
                }
                _ => None,
            }
        })
}

/// Transforms one node object and, recursively, its `Plans`
///
/// `level` is 1 for the root node.
fn transform_node(value: &Value, ids: &mut NodeIdGen, level: usize) -> Result<PlanNode> {
    if level > MAX_PLAN_DEPTH {
        return Err(ExplainError::PlanTooDeep {
            limit: MAX_PLAN_DEPTH,
        });
    }

    let mut node = PlanNode::new(ids.next_id(), UNKNOWN_NODE_TYPE);
    let Some(obj) = value.as_object() else {
        return Ok(node);
    };

    let mut node_type = None;
    let mut startup_cost = None;
    let mut total_cost = None;
    let mut plan_rows = None;
    let mut plan_width = None;
    let mut actual_startup = None;
    let mut actual_total = None;

    for (key, val) in obj {
        let handled = match key.as_str() {
            "Node Type" => set(&mut node_type, as_string(val)),
            "Relation Name" => set(&mut node.relation, as_string(val)),
            "Alias" => set(&mut node.alias, as_string(val)),
            "Schema" => set(&mut node.schema, as_string(val)),
            "Index Name" => set(&mut node.index_name, as_string(val)),

            "Startup Cost" => set(&mut startup_cost, val.as_f64()),
            "Total Cost" => set(&mut total_cost, val.as_f64()),
            "Plan Rows" => set(&mut plan_rows, val.as_f64()),
            "Plan Width" => set(&mut plan_width, as_u64(val).and_then(|w| u32::try_from(w).ok())),

            "Actual Startup Time" => set(&mut actual_startup, val.as_f64()),
            "Actual Total Time" => set(&mut actual_total, val.as_f64()),
            "Actual Rows" => set(&mut node.actual_rows, val.as_f64()),
            "Actual Loops" => set(&mut node.actual_loops, as_u64(val)),

            "Shared Hit Blocks" => set(&mut node.buffers.shared_hit, as_u64(val)),
            "Shared Read Blocks" => set(&mut node.buffers.shared_read, as_u64(val)),
            "Shared Dirtied Blocks" => set(&mut node.buffers.shared_dirtied, as_u64(val)),
            "Shared Written Blocks" => set(&mut node.buffers.shared_written, as_u64(val)),
            "Temp Read Blocks" => set(&mut node.buffers.temp_read, as_u64(val)),
            "Temp Written Blocks" => set(&mut node.buffers.temp_written, as_u64(val)),

            "Filter" => set(&mut node.filter, as_string(val)),
            "Rows Removed by Filter" => set(&mut node.rows_removed_by_filter, as_u64(val)),
            "Index Cond" => set(&mut node.index_cond, as_string(val)),
            "Join Type" => set(&mut node.join_type, as_string(val)),
            "Hash Cond" => set(&mut node.hash_cond, as_string(val)),
            "Merge Cond" => set(&mut node.merge_cond, as_string(val)),
            "Join Filter" => set(&mut node.join_filter, as_string(val)),

            "Sort Key" => match string_list(val) {
                Some(keys) => {
                    node.sort_keys = keys;
                    true
                }
                None => false,
            },
            "Sort Method" => set(&mut node.sort_method, as_string(val)),
            "Sort Space Used" => set(&mut node.sort_space_used, as_u64(val)),
            "Sort Space Type" => set(&mut node.sort_space_type, as_string(val)),

            "Plans" => val.is_array(),
            _ => false,
        };

        if !handled {
            node.extra.insert(key.clone(), val.clone());
        }
    }

    match node_type {
        Some(node_type) => node.node_type = node_type,
        None => tracing::warn!(id = %node.id, "plan node has no Node Type"),
    }
    node.cost = NodeCost::new(startup_cost.unwrap_or(0.0), total_cost.unwrap_or(0.0));
    node.rows = plan_rows.unwrap_or(0.0);
    node.width = plan_width.unwrap_or(0);
    if let Some(total) = actual_total {
        node.actual_time = Some(ActualTime::new(actual_startup.unwrap_or(0.0), total));
    }

    if let Some(plans) = obj.get("Plans").and_then(Value::as_array) {
        for child in plans {
            if child.is_object() {
                node.children.push(transform_node(child, ids, level + 1)?);
            } else {
                tracing::debug!(parent = %node.id, "ignoring non-object entry in Plans");
            }
        }
    }

    metrics::compute_exclusive_time(&mut node);
    tracing::trace!(id = %node.id, node_type = %node.node_type, "transformed plan node");
    Ok(node)
}

fn set<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    match value {
        Some(value) => {
            *slot = Some(value);
            true
        }
        None => false,
    }
}

fn as_string(value: &Value) -> Option<String> {
    value.as_str().map(String::from)
}

/// Reads a non-negative integer, rounding floats like `12.0`
fn as_u64(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f.round() as u64)
    })
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| item.as_str().map(String::from))
                .collect(),
        ),
        Value::String(s) => Some(vec![s.clone()]),
        _ => None,
    }
}
