//! Query EXPLAIN Parser Module
//!
//! Parses PostgreSQL `EXPLAIN ANALYZE` output into an annotated plan tree:
//! - JSON format (`EXPLAIN (ANALYZE, FORMAT JSON)`)
//! - Text format (default `EXPLAIN ANALYZE`)
//!
//! Both formats produce the same [`ParseResult`], with exclusive time,
//! rows-estimate ratio, time percentage and bottleneck flag computed for
//! every node.
//!
//! # Example
//!
//! ```
//! use planlens_analyzer::explain::{parse_explain, FormatHint};
//!
//! let text = "\
//! Sort  (cost=1.00..1.01 rows=3 width=8) (actual time=0.040..0.050 rows=3 loops=1)
//!   Sort Key: id
//!   ->  Seq Scan on users  (cost=0.00..1.00 rows=3 width=8) (actual time=0.005..0.010 rows=3 loops=1)
//! Execution Time: 0.100 ms";
//!
//! let plan = parse_explain(text, FormatHint::Auto).unwrap();
//! assert_eq!(plan.root.children[0].relation.as_deref(), Some("users"));
//! assert!(plan.root.metrics.is_bottleneck);
//! ```

pub mod error;
pub mod format;
pub mod json;
pub mod metrics;
pub mod options;
pub mod parser;
pub mod plan;
pub mod text;

pub use error::{ExplainError, Result};
pub use format::{FormatHint, PlanFormat, detect_format};
pub use json::{parse_json_explain, transform_document};
pub use metrics::{BOTTLENECK_THRESHOLD_PERCENT, exclusive_time, rows_estimate_ratio};
pub use options::ParseOptions;
pub use parser::{parse_explain, parse_explain_with};
pub use plan::{
    ActualTime, BufferUsage, MAX_PLAN_DEPTH, NodeCost, NodeId, NodeRef, ParseResult, PlanMetrics,
    PlanNode, PlanNodeIterator, PlanSummary, SkippedLine,
};
pub use text::{effective_depth, parse_text_explain, parse_text_explain_with};
