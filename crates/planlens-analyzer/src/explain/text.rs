//! PostgreSQL Text EXPLAIN Parser
//!
//! Parses the default `EXPLAIN ANALYZE` text report. Nesting is conveyed only
//! by indentation:
//!
//! ```text
//! Hash Join  (cost=3.25..24.51 rows=10 width=72) (actual time=0.08..0.31 rows=9 loops=1)
//!   Hash Cond: (o.user_id = u.id)
//!   ->  Seq Scan on orders o  (cost=0.00..18.50 rows=850 width=36) (actual time=0.01..0.09 rows=850 loops=1)
//!   ->  Hash  (cost=2.00..2.00 rows=100 width=36) (actual time=0.05..0.05 rows=100 loops=1)
//!         ->  Seq Scan on users u  (cost=0.00..2.00 rows=100 width=36) (actual time=0.01..0.02 rows=100 loops=1)
//! Planning Time: 0.210 ms
//! Execution Time: 0.402 ms
//! ```
//!
//! Input is first split into classified lines, then a single forward cursor
//! rebuilds the tree by recursive descent: each level collects the headers
//! whose depth is at least its threshold. Property lines directly after a
//! header belong to that header's node.
//!
//! # Examples
//!
//! ```
//! use planlens_analyzer::explain::text::parse_text_explain;
//!
//! let plan = parse_text_explain(
//!     "Seq Scan on users  (cost=0.00..1.01 rows=1 width=36) (actual time=0.012..0.013 rows=1 loops=1)",
//! )
//! .unwrap();
//! assert_eq!(plan.root.node_type, "Seq Scan");
//! assert_eq!(plan.root.relation.as_deref(), Some("users"));
//! ```

use crate::explain::error::{ExplainError, Result};
use crate::explain::format::PlanFormat;
use crate::explain::metrics;
use crate::explain::options::ParseOptions;
use crate::explain::plan::{
    ActualTime, BufferUsage, MAX_PLAN_DEPTH, NodeCost, NodeIdGen, ParseResult, PlanNode,
    SkippedLine,
};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Columns added to a node's depth when its line carries the `->` marker
///
/// The marker is rendered as `->  `, so the operator text of a marked line
/// starts four columns after its leading whitespace.
pub const MARKER_INDENT_BONUS: usize = 4;

/// Depth used to compare header lines
pub fn effective_depth(raw_indent: usize, has_marker: bool) -> usize {
    if has_marker {
        raw_indent + MARKER_INDENT_BONUS
    } else {
        raw_indent
    }
}

static HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<indent>\s*)(?P<marker>->\s+)?(?P<desc>\S.*?)\s+\(cost=(?P<startup>\d+(?:\.\d+)?)\.\.(?P<total>\d+(?:\.\d+)?) rows=(?P<rows>\d+(?:\.\d+)?) width=(?P<width>\d+)\)(?:\s+(?P<actual>\(actual[^)]*\)|\(never executed\)))?\s*$",
    )
    .expect("valid regex")
});

static ACTUAL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\(actual(?: time=(?P<startup>\d+(?:\.\d+)?)\.\.(?P<total>\d+(?:\.\d+)?))? rows=(?P<rows>\d+(?:\.\d+)?) loops=(?P<loops>\d+)\)$",
    )
    .expect("valid regex")
});

static SUMMARY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?P<label>planning time|execution time|total runtime):\s*(?P<ms>\d+(?:\.\d+)?)\s*ms\s*$")
        .expect("valid regex")
});

static PROPERTY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<label>[A-Za-z][A-Za-z0-9 _-]*?):\s+(?P<value>.*\S)\s*$").expect("valid regex")
});

static INDEX_SCAN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<op>Index Only Scan|Index Scan)(?P<backward> Backward)? using (?P<index>\S+) on (?P<rel>\S+)(?: (?P<alias>\S+))?$",
    )
    .expect("valid regex")
});

static BITMAP_INDEX_SCAN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Bitmap Index Scan on (?P<index>\S+)$").expect("valid regex"));

// Also covers "Bitmap Heap Scan on rel"
static RELATION_SCAN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<op>[A-Za-z][A-Za-z ]*Scan) on (?P<rel>\S+)(?: (?P<alias>\S+))?$")
        .expect("valid regex")
});

static JOIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<op>Hash|Merge|Nested Loop)(?: (?P<kind>Left|Right|Full|Semi|Anti|Right Semi|Right Anti))?(?: Join)?$",
    )
    .expect("valid regex")
});

static SORT_METHOD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<method>.+?)\s+(?P<space>Memory|Disk):\s*(?P<kb>\d+)kB$").expect("valid regex")
});

/// Parses PostgreSQL text-format EXPLAIN output
///
/// Unrecognized lines are skipped; use [`parse_text_explain_with`] in strict
/// mode to get them back as warnings.
pub fn parse_text_explain(text: &str) -> Result<ParseResult> {
    parse_text_explain_with(text, &ParseOptions::default())
}

/// Parses PostgreSQL text-format EXPLAIN output with explicit options
pub fn parse_text_explain_with(text: &str, options: &ParseOptions) -> Result<ParseResult> {
    let lines: Vec<Line<'_>> = text.lines().map(classify).collect();
    let mut parser = TextParser {
        lines: &lines,
        pos: 0,
        ids: NodeIdGen::new(),
        source: text.lines().collect(),
        strict: options.strict,
        skipped: Vec::new(),
    };

    let mut root = parser.parse_root()?.ok_or(ExplainError::NoParsableNode)?;
    parser.skip_rest();

    let (planning_time, execution_time) = summary_times(&lines);
    let execution_time = execution_time.unwrap_or(0.0);
    metrics::annotate(&mut root, execution_time);

    let mut plan = ParseResult::new(root, PlanFormat::Text).with_execution_time(execution_time);
    if let Some(ms) = planning_time {
        plan = plan.with_planning_time(ms);
    }
    plan.warnings = parser.skipped;
    Ok(plan)
}

/// One input line after classification
#[derive(Debug, Clone, Copy, PartialEq)]
enum Line<'a> {
    Blank,
    Summary(Summary),
    Header(Header<'a>),
    Property { label: &'a str, value: &'a str },
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Summary {
    Planning(f64),
    Execution(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Header<'a> {
    depth: usize,
    description: &'a str,
    cost: NodeCost,
    rows: f64,
    width: u32,
    actual: Option<ActualClause>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ActualClause {
    time: Option<ActualTime>,
    rows: f64,
    loops: u64,
}

fn classify(line: &str) -> Line<'_> {
    if line.trim().is_empty() {
        return Line::Blank;
    }
    if let Some(summary) = parse_summary(line) {
        return Line::Summary(summary);
    }
    if let Some(header) = parse_header(line) {
        return Line::Header(header);
    }
    if let Some(caps) = PROPERTY_REGEX.captures(line)
        && let (Some(label), Some(value)) = (caps.name("label"), caps.name("value"))
    {
        return Line::Property {
            label: label.as_str(),
            value: value.as_str(),
        };
    }
    Line::Other
}

fn parse_summary(line: &str) -> Option<Summary> {
    let caps = SUMMARY_REGEX.captures(line)?;
    let ms = caps.name("ms")?.as_str().parse().ok()?;
    if caps.name("label")?.as_str().eq_ignore_ascii_case("planning time") {
        Some(Summary::Planning(ms))
    } else {
        Some(Summary::Execution(ms))
    }
}

fn parse_header(line: &str) -> Option<Header<'_>> {
    let caps = HEADER_REGEX.captures(line)?;
    let raw_indent = caps.name("indent")?.as_str().chars().count();
    let depth = effective_depth(raw_indent, caps.name("marker").is_some());

    let actual = match caps.name("actual") {
        Some(clause) => Some(parse_actual(clause.as_str())?),
        None => None,
    };

    Some(Header {
        depth,
        description: caps.name("desc")?.as_str(),
        cost: NodeCost::new(
            caps.name("startup")?.as_str().parse().ok()?,
            caps.name("total")?.as_str().parse().ok()?,
        ),
        rows: caps.name("rows")?.as_str().parse().ok()?,
        width: caps.name("width")?.as_str().parse().ok()?,
        actual,
    })
}

fn parse_actual(clause: &str) -> Option<ActualClause> {
    if clause == "(never executed)" {
        return Some(ActualClause {
            time: Some(ActualTime::new(0.0, 0.0)),
            rows: 0.0,
            loops: 0,
        });
    }

    let caps = ACTUAL_REGEX.captures(clause)?;
    let time = match (caps.name("startup"), caps.name("total")) {
        (Some(startup), Some(total)) => Some(ActualTime::new(
            startup.as_str().parse().ok()?,
            total.as_str().parse().ok()?,
        )),
        _ => None,
    };

    Some(ActualClause {
        time,
        rows: caps.name("rows")?.as_str().parse().ok()?,
        loops: caps.name("loops")?.as_str().parse().ok()?,
    })
}

/// Returns the first planning and execution time found in the input
fn summary_times(lines: &[Line<'_>]) -> (Option<f64>, Option<f64>) {
    let mut planning = None;
    let mut execution = None;
    for line in lines {
        match line {
            Line::Summary(Summary::Planning(ms)) if planning.is_none() => planning = Some(*ms),
            Line::Summary(Summary::Execution(ms)) if execution.is_none() => execution = Some(*ms),
            _ => {}
        }
    }
    (planning, execution)
}

struct TextParser<'a, 'b> {
    lines: &'b [Line<'a>],
    pos: usize,
    ids: NodeIdGen,
    source: Vec<&'a str>,
    strict: bool,
    skipped: Vec<SkippedLine>,
}

impl<'a> TextParser<'a, '_> {
    fn peek(&self) -> Option<Line<'a>> {
        self.lines.get(self.pos).copied()
    }

    /// Parses the first header line in the input and everything below it
    fn parse_root(&mut self) -> Result<Option<PlanNode>> {
        while let Some(line) = self.peek() {
            match line {
                Line::Header(header) => {
                    self.pos += 1;
                    return self.parse_node(header, 1).map(Some);
                }
                Line::Blank | Line::Summary(_) => self.pos += 1,
                Line::Property { .. } | Line::Other => self.skip_current(),
            }
        }
        Ok(None)
    }

    /// Collects sibling nodes whose depth is at least `min_depth`
    ///
    /// `level` is the tree level of the collected nodes, 1 for the root.
    fn parse_level(&mut self, min_depth: usize, level: usize) -> Result<Vec<PlanNode>> {
        let mut nodes = Vec::new();
        while let Some(line) = self.peek() {
            match line {
                Line::Header(header) => {
                    if header.depth < min_depth {
                        break;
                    }
                    self.pos += 1;
                    nodes.push(self.parse_node(header, level)?);
                }
                Line::Blank | Line::Summary(_) => self.pos += 1,
                Line::Property { .. } | Line::Other => self.skip_current(),
            }
        }
        Ok(nodes)
    }

    fn parse_node(&mut self, header: Header<'a>, level: usize) -> Result<PlanNode> {
        if level > MAX_PLAN_DEPTH {
            return Err(ExplainError::PlanTooDeep {
                limit: MAX_PLAN_DEPTH,
            });
        }

        let mut node = PlanNode::new(self.ids.next_id(), header.description);
        apply_description(&mut node, header.description);
        node.cost = header.cost;
        node.rows = header.rows;
        node.width = header.width;
        if let Some(actual) = header.actual {
            node.actual_time = actual.time;
            node.actual_rows = Some(actual.rows);
            node.actual_loops = Some(actual.loops);
        }

        // A blank line does not end the property block
        while let Some(line) = self.peek() {
            match line {
                Line::Property { label, value } => apply_property(&mut node, label, value),
                Line::Blank => {}
                Line::Header(_) | Line::Summary(_) | Line::Other => break,
            }
            self.pos += 1;
        }

        node.children = self.parse_level(header.depth + 1, level + 1)?;
        metrics::compute_exclusive_time(&mut node);
        tracing::trace!(id = %node.id, node_type = %node.node_type, depth = header.depth, "parsed plan node");
        Ok(node)
    }

    fn skip_current(&mut self) {
        let line_number = self.pos + 1;
        let text = self.source.get(self.pos).map(|l| l.trim()).unwrap_or_default();
        tracing::debug!(line_number, text, "skipping unrecognized EXPLAIN line");
        if self.strict {
            self.skipped.push(SkippedLine {
                line_number,
                text: text.to_string(),
            });
        }
        self.pos += 1;
    }

    /// Skips whatever follows the root node's subtree
    fn skip_rest(&mut self) {
        while let Some(line) = self.peek() {
            match line {
                Line::Blank | Line::Summary(_) => self.pos += 1,
                _ => self.skip_current(),
            }
        }
    }
}

/// Splits an operator description into operator, relation, index and alias
fn apply_description(node: &mut PlanNode, description: &str) {
    let mut desc = description;
    if let Some(rest) = desc.strip_prefix("Parallel ") {
        desc = rest;
        node.extra.insert("Parallel Aware".into(), Value::Bool(true));
    }
    node.node_type = desc.to_string();

    if let Some(caps) = INDEX_SCAN_REGEX.captures(desc) {
        node.node_type = caps["op"].to_string();
        node.index_name = Some(caps["index"].to_string());
        set_relation(node, &caps["rel"]);
        node.alias = caps.name("alias").map(|m| m.as_str().to_string());
        if caps.name("backward").is_some() {
            node.extra.insert("Scan Direction".into(), Value::from("Backward"));
        }
    } else if let Some(caps) = BITMAP_INDEX_SCAN_REGEX.captures(desc) {
        node.node_type = "Bitmap Index Scan".to_string();
        node.index_name = Some(caps["index"].to_string());
    } else if let Some(caps) = RELATION_SCAN_REGEX.captures(desc) {
        node.node_type = caps["op"].to_string();
        set_relation(node, &caps["rel"]);
        node.alias = caps.name("alias").map(|m| m.as_str().to_string());
    } else if let Some(caps) = JOIN_REGEX.captures(desc) {
        let op = &caps["op"];
        // "Hash" and "Merge" alone are not joins; "Hash" is the hash-build node
        if op == "Nested Loop" || desc.ends_with(" Join") {
            node.node_type = if op == "Nested Loop" {
                op.to_string()
            } else {
                format!("{op} Join")
            };
            let kind = caps.name("kind").map_or("Inner", |m| m.as_str());
            node.join_type = Some(kind.to_string());
        }
    }
}

fn set_relation(node: &mut PlanNode, relation: &str) {
    match relation.split_once('.') {
        Some((schema, name)) if !schema.is_empty() && !name.is_empty() => {
            node.schema = Some(schema.to_string());
            node.relation = Some(name.to_string());
        }
        _ => node.relation = Some(relation.to_string()),
    }
}

/// Stores one `Label: value` line on the node
fn apply_property(node: &mut PlanNode, label: &str, value: &str) {
    let handled = match label {
        "Filter" => set_text(&mut node.filter, value),
        "Index Cond" => set_text(&mut node.index_cond, value),
        "Index Name" => set_text(&mut node.index_name, value),
        "Hash Cond" => set_text(&mut node.hash_cond, value),
        "Merge Cond" => set_text(&mut node.merge_cond, value),
        "Join Filter" => set_text(&mut node.join_filter, value),
        "Sort Key" => {
            node.sort_keys = split_list(value);
            true
        }
        "Sort Method" => {
            apply_sort_method(node, value);
            true
        }
        "Sort Space Used" => match leading_integer(value) {
            Some(kb) => {
                node.sort_space_used = Some(kb);
                true
            }
            None => false,
        },
        "Sort Space Type" => set_text(&mut node.sort_space_type, value),
        "Rows Removed by Filter" => match value.parse::<f64>() {
            Ok(rows) if rows >= 0.0 => {
                node.rows_removed_by_filter = Some(rows.round() as u64);
                true
            }
            _ => false,
        },
        "Buffers" => apply_buffers(&mut node.buffers, value),
        _ => false,
    };

    if !handled {
        node.extra.insert(label.to_string(), Value::from(value));
    }
}

fn set_text(slot: &mut Option<String>, value: &str) -> bool {
    *slot = Some(value.to_string());
    true
}

/// Handles both `quicksort` and `quicksort  Memory: 25kB`
fn apply_sort_method(node: &mut PlanNode, value: &str) {
    match SORT_METHOD_REGEX.captures(value) {
        Some(caps) => {
            node.sort_method = Some(caps["method"].to_string());
            node.sort_space_type = Some(caps["space"].to_string());
            node.sort_space_used = caps["kb"].parse().ok();
        }
        None => node.sort_method = Some(value.to_string()),
    }
}

/// Parses `shared hit=4 read=2, temp read=10 written=10`
///
/// Returns false when some counter was not understood, so the raw line is
/// kept as well.
fn apply_buffers(buffers: &mut BufferUsage, value: &str) -> bool {
    let mut understood = true;
    for segment in value.split(',') {
        let mut words = segment.split_whitespace();
        let Some(scope) = words.next() else {
            continue;
        };
        for pair in words {
            let Some((key, count)) = pair.split_once('=') else {
                understood = false;
                continue;
            };
            let Ok(count) = count.parse::<u64>() else {
                understood = false;
                continue;
            };
            let slot = match (scope, key) {
                ("shared", "hit") => &mut buffers.shared_hit,
                ("shared", "read") => &mut buffers.shared_read,
                ("shared", "dirtied") => &mut buffers.shared_dirtied,
                ("shared", "written") => &mut buffers.shared_written,
                ("temp", "read") => &mut buffers.temp_read,
                ("temp", "written") => &mut buffers.temp_written,
                _ => {
                    understood = false;
                    continue;
                }
            };
            *slot = Some(count);
        }
    }
    understood
}

fn leading_integer(value: &str) -> Option<u64> {
    let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Splits a comma-separated list, ignoring commas inside parentheses
fn split_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, c) in value.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(value[start..idx].trim().to_string());
                start = idx + 1;
            }
            _ => {}
        }
    }
    items.push(value[start..].trim().to_string());
    items.retain(|item| !item.is_empty());
    items
}

#[cfg(test)]
mod tests;
