//! Tests for the PostgreSQL text EXPLAIN parser

use super::*;
use crate::explain::plan::NodeId;
use indoc::indoc;
use pretty_assertions::assert_eq;

fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("value should be defined");
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

const HASH_JOIN_PLAN: &str = indoc! {"
    Hash Join  (cost=3.25..24.51 rows=10 width=72) (actual time=0.080..0.310 rows=9 loops=1)
      Hash Cond: (o.user_id = u.id)
      ->  Seq Scan on orders o  (cost=0.00..18.50 rows=850 width=36) (actual time=0.010..0.090 rows=850 loops=1)
            Filter: (status = 'open'::text)
            Rows Removed by Filter: 150
      ->  Hash  (cost=2.00..2.00 rows=100 width=36) (actual time=0.050..0.050 rows=100 loops=1)
            Buckets: 1024  Batches: 1  Memory Usage: 14kB
            ->  Seq Scan on users u  (cost=0.00..2.00 rows=100 width=36) (actual time=0.010..0.020 rows=100 loops=1)
    Planning Time: 0.210 ms
    Execution Time: 0.400 ms
"};

#[test]
fn test_parse_single_seq_scan_line() {
    let plan = parse_text_explain(
        "Seq Scan on users  (cost=0.00..1.01 rows=1 width=36) (actual time=0.012..0.013 rows=1 loops=1)",
    )
    .expect("parse failed");

    let root = &plan.root;
    assert_eq!(root.node_type, "Seq Scan");
    assert_eq!(root.relation.as_deref(), Some("users"));
    assert_eq!(root.alias, None);
    assert_eq!(root.cost, NodeCost::new(0.0, 1.01));
    assert_eq!(root.rows, 1.0);
    assert_eq!(root.width, 36);
    assert_eq!(root.actual_time, Some(ActualTime::new(0.012, 0.013)));
    assert_eq!(root.actual_rows, Some(1.0));
    assert_eq!(root.actual_loops, Some(1));
    assert_eq!(plan.format, PlanFormat::Text);
    assert_eq!(plan.execution_time_ms, 0.0);
    assert_eq!(root.metrics.time_percentage, None);
}

#[test]
fn test_parse_nested_plan() {
    let plan = parse_text_explain(HASH_JOIN_PLAN).expect("parse failed");
    let root = &plan.root;

    assert_eq!(root.node_type, "Hash Join");
    assert_eq!(root.join_type.as_deref(), Some("Inner"));
    assert_eq!(root.hash_cond.as_deref(), Some("(o.user_id = u.id)"));
    assert_eq!(root.children.len(), 2);

    let orders = &root.children[0];
    assert_eq!(orders.node_type, "Seq Scan");
    assert_eq!(orders.relation.as_deref(), Some("orders"));
    assert_eq!(orders.alias.as_deref(), Some("o"));
    assert_eq!(orders.filter.as_deref(), Some("(status = 'open'::text)"));
    assert_eq!(orders.rows_removed_by_filter, Some(150));
    assert!(orders.is_leaf());

    let hash = &root.children[1];
    assert_eq!(hash.node_type, "Hash");
    assert_eq!(hash.join_type, None);
    assert_eq!(
        hash.extra.get("Buckets"),
        Some(&Value::from("1024  Batches: 1  Memory Usage: 14kB"))
    );
    assert_eq!(hash.children.len(), 1);
    assert_eq!(hash.children[0].relation.as_deref(), Some("users"));

    let ids: Vec<NodeId> = plan.iter_nodes().map(|n| n.id).collect();
    assert_eq!(ids, vec![NodeId(0), NodeId(1), NodeId(2), NodeId(3)]);

    assert_eq!(plan.planning_time_ms, Some(0.21));
    assert_eq!(plan.execution_time_ms, 0.4);
    assert!(plan.warnings.is_empty());
}

#[test]
fn test_text_metrics() {
    let plan = parse_text_explain(HASH_JOIN_PLAN).expect("parse failed");
    let root = &plan.root;

    assert_close(root.metrics.exclusive_time_ms, 0.17);
    assert_close(root.children[0].metrics.exclusive_time_ms, 0.09);
    assert_close(root.children[1].metrics.exclusive_time_ms, 0.03);
    assert_close(root.children[1].children[0].metrics.exclusive_time_ms, 0.02);

    assert_close(root.metrics.time_percentage, 42.5);
    assert_close(root.children[0].metrics.time_percentage, 22.5);
    assert!(root.metrics.is_bottleneck);
    assert!(!root.children[0].metrics.is_bottleneck);

    assert_close(root.metrics.rows_estimate_ratio, 0.9);
    assert_close(root.children[0].metrics.rows_estimate_ratio, 1.0);
}

#[test]
fn test_siblings_after_deep_subtree() {
    let text = indoc! {"
        Append  (cost=0.00..3.00 rows=3 width=4)
          ->  Nested Loop  (cost=0.00..1.00 rows=1 width=4)
                ->  Seq Scan on a  (cost=0.00..0.50 rows=1 width=4)
                ->  Materialize  (cost=0.00..0.50 rows=1 width=4)
                      ->  Seq Scan on b  (cost=0.00..0.50 rows=1 width=4)
          ->  Seq Scan on c  (cost=0.00..1.00 rows=1 width=4)
          ->  Result  (cost=0.00..1.00 rows=1 width=4)
    "};

    let plan = parse_text_explain(text).expect("parse failed");
    let root = &plan.root;

    let top: Vec<&str> = root.children.iter().map(|c| c.node_type.as_str()).collect();
    assert_eq!(top, vec!["Nested Loop", "Seq Scan", "Result"]);
    assert_eq!(root.children[0].children.len(), 2);
    assert_eq!(root.children[0].children[1].children[0].relation.as_deref(), Some("b"));
    assert_eq!(root.node_count(), 7);
    assert_eq!(root.depth(), 4);
}

#[test]
fn test_marker_bonus_aligns_unmarked_siblings() {
    // The second child has no marker; its text starts in the same column as
    // the first child's operator text.
    let text = indoc! {"
        Append  (cost=0.00..2.00 rows=2 width=4)
          ->  Seq Scan on a  (cost=0.00..1.00 rows=1 width=4)
              Seq Scan on b  (cost=0.00..1.00 rows=1 width=4)
    "};

    let plan = parse_text_explain(text).expect("parse failed");

    assert_eq!(plan.root.children.len(), 2);
    assert!(plan.root.children[0].is_leaf());
    assert_eq!(plan.root.children[1].relation.as_deref(), Some("b"));
    assert_eq!(effective_depth(2, true), effective_depth(6, false));
}

#[test]
fn test_psql_framing_is_skipped() {
    let text = indoc! {"
                                 QUERY PLAN
        ------------------------------------------------------------
         Sort  (cost=1.00..1.01 rows=3 width=8) (actual time=0.040..0.041 rows=3 loops=1)
           Sort Key: created_at DESC, id
           Sort Method: quicksort  Memory: 25kB
           ->  Seq Scan on public.events e  (cost=0.00..1.00 rows=3 width=8) (actual time=0.005..0.010 rows=3 loops=1)
                 Buffers: shared hit=1 read=2
         Planning Time: 0.050 ms
         Execution Time: 0.100 ms
        (7 rows)
    "};

    let plan = parse_text_explain_with(text, &ParseOptions::default().strict(true))
        .expect("parse failed");
    let root = &plan.root;

    assert_eq!(root.node_type, "Sort");
    assert_eq!(root.sort_keys, vec!["created_at DESC", "id"]);
    assert_eq!(root.sort_method.as_deref(), Some("quicksort"));
    assert_eq!(root.sort_space_type.as_deref(), Some("Memory"));
    assert_eq!(root.sort_space_used, Some(25));

    let scan = &root.children[0];
    assert_eq!(scan.schema.as_deref(), Some("public"));
    assert_eq!(scan.relation.as_deref(), Some("events"));
    assert_eq!(scan.alias.as_deref(), Some("e"));
    assert_eq!(scan.buffers.shared_hit, Some(1));
    assert_eq!(scan.buffers.shared_read, Some(2));
    assert!(!scan.extra.contains_key("Buffers"));

    let skipped: Vec<usize> = plan.warnings.iter().map(|w| w.line_number).collect();
    assert_eq!(skipped, vec![1, 2, 10]);
    assert_eq!(plan.warnings[2].text, "(7 rows)");
    assert_eq!(plan.execution_time_ms, 0.1);
}

#[test]
fn test_unrecognized_lines_are_skipped_silently_by_default() {
    let text = indoc! {"
        Aggregate  (cost=1.00..1.01 rows=1 width=8)
          InitPlan 1 (returns $0)
            ->  Result  (cost=0.00..0.01 rows=1 width=4)
          ->  Seq Scan on t  (cost=0.00..1.00 rows=10 width=0)
    "};

    let plan = parse_text_explain(text).expect("parse failed");

    assert_eq!(plan.root.children.len(), 2);
    assert_eq!(plan.root.children[0].node_type, "Result");
    assert!(plan.warnings.is_empty());

    let strict = parse_text_explain_with(text, &ParseOptions::default().strict(true))
        .expect("parse failed");
    assert_eq!(
        strict.warnings,
        vec![SkippedLine {
            line_number: 2,
            text: "InitPlan 1 (returns $0)".to_string(),
        }]
    );
}

#[test]
fn test_index_scan_shapes() {
    let text = indoc! {"
        Nested Loop Left Join  (cost=0.42..16.90 rows=1 width=72)
          ->  Index Scan using users_pkey on users u  (cost=0.29..8.30 rows=1 width=36)
                Index Cond: (id = 42)
          ->  Index Only Scan Backward using orders_created_idx on orders  (cost=0.13..8.58 rows=1 width=36)
          ->  Bitmap Heap Scan on items i  (cost=4.18..12.64 rows=4 width=36)
                Recheck Cond: (order_id = 7)
                ->  Bitmap Index Scan on items_order_idx  (cost=0.00..4.18 rows=4 width=0)
                      Index Cond: (order_id = 7)
          ->  Parallel Seq Scan on logs  (cost=0.00..10.00 rows=100 width=8)
    "};

    let plan = parse_text_explain(text).expect("parse failed");
    let root = &plan.root;

    assert_eq!(root.node_type, "Nested Loop");
    assert_eq!(root.join_type.as_deref(), Some("Left"));
    assert!(root.is_join());

    let users = &root.children[0];
    assert_eq!(users.node_type, "Index Scan");
    assert_eq!(users.index_name.as_deref(), Some("users_pkey"));
    assert_eq!(users.relation.as_deref(), Some("users"));
    assert_eq!(users.alias.as_deref(), Some("u"));
    assert_eq!(users.index_cond.as_deref(), Some("(id = 42)"));

    let orders = &root.children[1];
    assert_eq!(orders.node_type, "Index Only Scan");
    assert_eq!(orders.index_name.as_deref(), Some("orders_created_idx"));
    assert_eq!(orders.relation.as_deref(), Some("orders"));
    assert_eq!(orders.alias, None);
    assert_eq!(orders.extra.get("Scan Direction"), Some(&Value::from("Backward")));

    let heap = &root.children[2];
    assert_eq!(heap.node_type, "Bitmap Heap Scan");
    assert_eq!(heap.relation.as_deref(), Some("items"));
    assert_eq!(heap.extra.get("Recheck Cond"), Some(&Value::from("(order_id = 7)")));
    let bitmap = &heap.children[0];
    assert_eq!(bitmap.node_type, "Bitmap Index Scan");
    assert_eq!(bitmap.index_name.as_deref(), Some("items_order_idx"));
    assert_eq!(bitmap.relation, None);

    let logs = &root.children[3];
    assert_eq!(logs.node_type, "Seq Scan");
    assert_eq!(logs.extra.get("Parallel Aware"), Some(&Value::Bool(true)));
}

#[test]
fn test_join_descriptions() {
    let cases = [
        ("Hash Join", "Hash Join", Some("Inner")),
        ("Hash Anti Join", "Hash Join", Some("Anti")),
        ("Merge Right Semi Join", "Merge Join", Some("Right Semi")),
        ("Nested Loop", "Nested Loop", Some("Inner")),
        ("Hash", "Hash", None),
        ("HashAggregate", "HashAggregate", None),
        ("Merge Append", "Merge Append", None),
    ];

    for (desc, node_type, join_type) in cases {
        let line = format!("{desc}  (cost=0.00..1.00 rows=1 width=4)");
        let plan = parse_text_explain(&line).expect("parse failed");
        assert_eq!(plan.root.node_type, node_type, "description {desc:?}");
        assert_eq!(plan.root.join_type.as_deref(), join_type, "description {desc:?}");
    }
}

#[test]
fn test_actual_clause_variants() {
    let text = indoc! {"
        Append  (cost=0.00..2.00 rows=2 width=4) (actual rows=1 loops=1)
          ->  Seq Scan on a  (cost=0.00..1.00 rows=1 width=4) (never executed)
          ->  Seq Scan on b  (cost=0.00..1.00 rows=1 width=4) (actual time=0.010..0.020 rows=0.50 loops=2)
    "};

    let plan = parse_text_explain(text).expect("parse failed");
    let root = &plan.root;

    assert_eq!(root.actual_time, None);
    assert_eq!(root.actual_rows, Some(1.0));
    assert_eq!(root.metrics.exclusive_time_ms, None);

    let never = &root.children[0];
    assert_eq!(never.actual_loops, Some(0));
    assert_eq!(never.actual_rows, Some(0.0));
    assert_eq!(never.metrics.exclusive_time_ms, Some(0.0));

    let fractional = &root.children[1];
    assert_eq!(fractional.actual_rows, Some(0.5));
    assert_close(fractional.metrics.exclusive_time_ms, 0.04);
}

#[test]
fn test_unknown_property_goes_to_extra() {
    let text = indoc! {"
        Gather  (cost=1000.00..2000.00 rows=100 width=4)
          Workers Planned: 2
          Output: id, name
          ->  Seq Scan on t  (cost=0.00..10.00 rows=40 width=4)
    "};

    let plan = parse_text_explain(text).expect("parse failed");

    assert_eq!(plan.root.extra.get("Workers Planned"), Some(&Value::from("2")));
    assert_eq!(plan.root.extra.get("Output"), Some(&Value::from("id, name")));
    assert_eq!(plan.root.children.len(), 1);
}

#[test]
fn test_extra_root_is_reported() {
    let text = indoc! {"
        Result  (cost=0.00..0.01 rows=1 width=4)
        Result  (cost=0.00..0.01 rows=1 width=4)
    "};

    let plan = parse_text_explain_with(text, &ParseOptions::default().strict(true))
        .expect("parse failed");

    assert_eq!(plan.root.node_count(), 1);
    assert_eq!(plan.warnings.len(), 1);
    assert_eq!(plan.warnings[0].line_number, 2);
}

#[test]
fn test_total_runtime_summary() {
    let text = indoc! {"
        Result  (cost=0.00..0.01 rows=1 width=4) (actual time=0.001..0.002 rows=1 loops=1)
        Total runtime: 0.004 ms
    "};

    let plan = parse_text_explain(text).expect("parse failed");
    assert_eq!(plan.execution_time_ms, 0.004);
    assert_close(plan.root.metrics.time_percentage, 50.0);
}

#[test]
fn test_no_header_lines() {
    let err = parse_text_explain("Planning Time: 0.1 ms\nsomething else").unwrap_err();
    assert!(matches!(err, ExplainError::NoParsableNode));
}

#[test]
fn test_split_list_respects_parentheses() {
    assert_eq!(
        split_list("lower(name), coalesce(a, b) DESC, id"),
        vec!["lower(name)", "coalesce(a, b) DESC", "id"]
    );
}

#[test]
fn test_apply_buffers_keeps_unknown_scopes() {
    let mut buffers = BufferUsage::default();
    assert!(apply_buffers(&mut buffers, "shared hit=4 dirtied=1 written=2, temp read=10 written=11"));
    assert_eq!(buffers.shared_hit, Some(4));
    assert_eq!(buffers.shared_dirtied, Some(1));
    assert_eq!(buffers.temp_written, Some(11));

    assert!(!apply_buffers(&mut buffers, "local hit=3"));
}

#[test]
fn test_blank_line_inside_property_block() {
    let text = indoc! {"
        Seq Scan on t  (cost=0.00..1.00 rows=10 width=4) (actual time=0.010..0.020 rows=3 loops=1)
          Filter: (a = 1)

          Rows Removed by Filter: 7
        Execution Time: 0.050 ms
    "};

    let plan = parse_text_explain_with(text, &ParseOptions::default().strict(true))
        .expect("parse failed");

    assert_eq!(plan.root.filter.as_deref(), Some("(a = 1)"));
    assert_eq!(plan.root.rows_removed_by_filter, Some(7));
    assert!(plan.warnings.is_empty());
}

#[test]
fn test_trigger_lines_stay_outside_the_plan() {
    let text = indoc! {"
        Seq Scan on t  (cost=0.00..1.00 rows=10 width=4) (actual time=0.010..0.020 rows=3 loops=1)
          Filter: (a = 1)
        Planning Time: 0.030 ms
        Trigger RI_ConstraintTrigger_a_16404 for constraint t_fk: time=0.120 calls=1
        Execution Time: 0.050 ms
    "};

    let plan = parse_text_explain_with(text, &ParseOptions::default().strict(true))
        .expect("parse failed");

    assert!(plan.root.extra.is_empty());
    assert_eq!(plan.warnings.len(), 1);
    assert_eq!(plan.warnings[0].line_number, 4);
}

#[test]
fn test_hyphenated_property_labels() {
    let text = indoc! {"
        Incremental Sort  (cost=0.47..75.22 rows=1000 width=12) (actual time=0.070..1.000 rows=1000 loops=1)
          Sort Key: a, b
          Presorted Key: a
          Full-sort Groups: 32  Sort Method: quicksort  Average Memory: 27kB  Peak Memory: 27kB
          Pre-sorted Groups: 4  Sort Method: quicksort  Average Memory: 26kB  Peak Memory: 26kB
          ->  Index Scan using t_a_idx on t  (cost=0.28..36.27 rows=1000 width=12) (actual time=0.010..0.400 rows=1000 loops=1)
    "};

    let plan = parse_text_explain_with(text, &ParseOptions::default().strict(true))
        .expect("parse failed");
    let root = &plan.root;

    assert!(plan.warnings.is_empty());
    assert_eq!(root.sort_keys, vec!["a", "b"]);
    assert_eq!(
        root.extra.get("Full-sort Groups"),
        Some(&Value::from(
            "32  Sort Method: quicksort  Average Memory: 27kB  Peak Memory: 27kB"
        ))
    );
    assert!(root.extra.contains_key("Pre-sorted Groups"));
    assert_eq!(root.children.len(), 1);
}

fn nested_results(levels: usize) -> String {
    let mut text = String::from("Result  (cost=0.00..1.00 rows=1 width=4)\n");
    for i in 1..levels {
        text.push_str(&" ".repeat(i));
        text.push_str("->  Result  (cost=0.00..1.00 rows=1 width=4)\n");
    }
    text
}

#[test]
fn test_nesting_up_to_the_limit_parses() {
    let plan = parse_text_explain(&nested_results(MAX_PLAN_DEPTH)).expect("parse failed");

    assert_eq!(plan.root.node_count(), MAX_PLAN_DEPTH);
    assert_eq!(plan.root.depth(), MAX_PLAN_DEPTH);
}

#[test]
fn test_deeply_nested_text_is_rejected() {
    let err = parse_text_explain(&nested_results(3000)).unwrap_err();

    assert!(matches!(err, ExplainError::PlanTooDeep { limit } if limit == MAX_PLAN_DEPTH));
    assert_eq!(err.kind(), "plan_too_deep");
}
