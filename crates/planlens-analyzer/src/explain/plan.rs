//! Plan Model - Data structures for annotated execution plans
//!
//! Both the JSON transformer and the text parser produce the types defined
//! here. A [`ParseResult`] owns the root [`PlanNode`] and is read-only once
//! returned to the caller.

use crate::explain::format::PlanFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a node, unique within one [`ParseResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out node ids in pre-order for a single parse call
#[derive(Debug, Default)]
pub(crate) struct NodeIdGen {
    next: usize,
}

impl NodeIdGen {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}

/// A parsed and annotated EXPLAIN plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParseResult {
    /// Root node of the plan tree
    pub root: PlanNode,
    /// Execution time in milliseconds, 0 when the output did not report it
    pub execution_time_ms: f64,
    /// Planning time in milliseconds (if available)
    pub planning_time_ms: Option<f64>,
    /// Format the plan was parsed from
    pub format: PlanFormat,
    /// Lines the text parser skipped (strict mode only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<SkippedLine>,
}

impl ParseResult {
    /// Creates a result for the given root node
    pub fn new(root: PlanNode, format: PlanFormat) -> Self {
        Self {
            root,
            execution_time_ms: 0.0,
            planning_time_ms: None,
            format,
            warnings: Vec::new(),
        }
    }

    /// Sets the planning time
    pub fn with_planning_time(mut self, ms: f64) -> Self {
        self.planning_time_ms = Some(ms);
        self
    }

    /// Sets the execution time
    pub fn with_execution_time(mut self, ms: f64) -> Self {
        self.execution_time_ms = ms;
        self
    }

    /// Returns an iterator over all nodes in the plan (depth-first)
    pub fn iter_nodes(&self) -> PlanNodeIterator<'_> {
        self.root.iter()
    }

    /// Looks up a node by id
    pub fn find_node(&self, id: NodeId) -> Option<&PlanNode> {
        self.iter_nodes().find(|n| n.id == id)
    }

    /// Returns all nodes flagged as bottlenecks, in depth-first order
    pub fn bottlenecks(&self) -> Vec<&PlanNode> {
        self.iter_nodes().filter(|n| n.metrics.is_bottleneck).collect()
    }

    /// Builds a compact summary of the plan for downstream consumers
    pub fn summary(&self) -> PlanSummary {
        let slowest_node = self
            .iter_nodes()
            .filter(|n| n.metrics.exclusive_time_ms.is_some())
            .max_by(|a, b| {
                let a = a.metrics.exclusive_time_ms.unwrap_or_default();
                let b = b.metrics.exclusive_time_ms.unwrap_or_default();
                a.total_cmp(&b)
            })
            .map(NodeRef::from);

        let worst_estimate = self
            .iter_nodes()
            .filter_map(|n| n.misestimate_factor().map(|f| (n, f)))
            .filter(|(_, f)| *f > 1.0)
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(n, _)| NodeRef::from(n));

        PlanSummary {
            node_count: self.root.node_count(),
            max_depth: self.root.depth(),
            execution_time_ms: self.execution_time_ms,
            planning_time_ms: self.planning_time_ms,
            bottlenecks: self.bottlenecks().into_iter().map(NodeRef::from).collect(),
            slowest_node,
            worst_estimate,
        }
    }
}

/// Deepest node nesting accepted from either input format
///
/// Matches the recursion limit `serde_json` applies to JSON documents.
pub const MAX_PLAN_DEPTH: usize = 128;

/// A line the text parser could not interpret
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number in the input
    pub line_number: usize,
    /// The line with surrounding whitespace removed
    pub text: String,
}

/// Represents a single operator in the plan tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanNode {
    /// Identifier assigned by the parser
    pub id: NodeId,
    /// Operator name as reported by the server, e.g. `Seq Scan`
    pub node_type: String,
    /// Relation/table name (if applicable)
    pub relation: Option<String>,
    /// Alias used in the query (if applicable)
    pub alias: Option<String>,
    /// Schema name (if applicable)
    pub schema: Option<String>,
    /// Index name used (for index scans)
    pub index_name: Option<String>,
    /// Planner cost estimate
    pub cost: NodeCost,
    /// Estimated number of rows
    pub rows: f64,
    /// Estimated width of each row in bytes
    pub width: u32,
    /// Actual timing in milliseconds (from EXPLAIN ANALYZE)
    pub actual_time: Option<ActualTime>,
    /// Actual rows returned per loop (from EXPLAIN ANALYZE)
    pub actual_rows: Option<f64>,
    /// Number of times the node was executed
    pub actual_loops: Option<u64>,
    /// Buffer counters (from EXPLAIN (ANALYZE, BUFFERS))
    pub buffers: BufferUsage,
    /// Filter condition applied
    pub filter: Option<String>,
    /// Rows removed by filter (from EXPLAIN ANALYZE)
    pub rows_removed_by_filter: Option<u64>,
    /// Index condition (for index scans)
    pub index_cond: Option<String>,
    /// Join type (for joins), e.g. `Inner` or `Left`
    pub join_type: Option<String>,
    /// Hash join condition
    pub hash_cond: Option<String>,
    /// Merge join condition
    pub merge_cond: Option<String>,
    /// Join filter evaluated after the join condition
    pub join_filter: Option<String>,
    /// Sort keys (for sort operations)
    pub sort_keys: Vec<String>,
    /// Sort method used (from EXPLAIN ANALYZE)
    pub sort_method: Option<String>,
    /// Sort space used in kB
    pub sort_space_used: Option<u64>,
    /// Where the sort happened, `Memory` or `Disk`
    pub sort_space_type: Option<String>,
    /// Properties not captured by specific fields
    pub extra: BTreeMap<String, serde_json::Value>,
    /// Child nodes, in source order
    pub children: Vec<PlanNode>,
    /// Metrics derived after parsing
    pub metrics: PlanMetrics,
}

impl PlanNode {
    /// Creates a new plan node with the given id and operator name
    pub fn new(id: NodeId, node_type: impl Into<String>) -> Self {
        Self {
            id,
            node_type: node_type.into(),
            relation: None,
            alias: None,
            schema: None,
            index_name: None,
            cost: NodeCost::default(),
            rows: 0.0,
            width: 0,
            actual_time: None,
            actual_rows: None,
            actual_loops: None,
            buffers: BufferUsage::default(),
            filter: None,
            rows_removed_by_filter: None,
            index_cond: None,
            join_type: None,
            hash_cond: None,
            merge_cond: None,
            join_filter: None,
            sort_keys: Vec::new(),
            sort_method: None,
            sort_space_used: None,
            sort_space_type: None,
            extra: BTreeMap::new(),
            children: Vec::new(),
            metrics: PlanMetrics::default(),
        }
    }

    /// Sets the relation/table name
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    /// Sets the cost information
    pub fn with_cost(mut self, startup: f64, total: f64) -> Self {
        self.cost = NodeCost { startup, total };
        self
    }

    /// Sets the estimated rows
    pub fn with_rows(mut self, rows: f64) -> Self {
        self.rows = rows;
        self
    }

    /// Sets the actual timing, rows and loops
    pub fn with_actual(mut self, startup: f64, total: f64, rows: f64, loops: u64) -> Self {
        self.actual_time = Some(ActualTime::new(startup, total));
        self.actual_rows = Some(rows);
        self.actual_loops = Some(loops);
        self
    }

    /// Adds a child node
    pub fn with_child(mut self, child: PlanNode) -> Self {
        self.children.push(child);
        self
    }

    /// Sets the index name
    pub fn with_index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    /// Sets the filter condition
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Returns the loop count used in time arithmetic
    ///
    /// Formats that report timing without a loop count imply a single loop.
    pub fn effective_loops(&self) -> f64 {
        self.actual_loops.unwrap_or(1) as f64
    }

    /// Total time spent in this subtree across all loops
    pub fn inclusive_time_ms(&self) -> Option<f64> {
        self.actual_time.map(|t| t.total * self.effective_loops())
    }

    /// How far the row estimate was off, as a factor of at least 1
    pub fn misestimate_factor(&self) -> Option<f64> {
        let actual = self.actual_rows?.max(1.0);
        let estimated = self.rows.max(1.0);
        Some(if actual >= estimated {
            actual / estimated
        } else {
            estimated / actual
        })
    }

    /// Returns the total number of nodes in this subtree (including self)
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }

    /// Returns the maximum depth of this subtree
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(|c| c.depth()).max().unwrap_or(0)
    }

    /// Returns true if this is a leaf node (no children)
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns true if this node represents a scan operation
    pub fn is_scan(&self) -> bool {
        self.node_type.ends_with("Scan")
    }

    /// Returns true if this node represents a join operation
    pub fn is_join(&self) -> bool {
        self.node_type.ends_with("Join") || self.node_type == "Nested Loop"
    }

    /// Returns an iterator over this subtree (depth-first, pre-order)
    pub fn iter(&self) -> PlanNodeIterator<'_> {
        PlanNodeIterator::new(self)
    }
}

/// Cost information for a plan node
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeCost {
    /// Startup cost (cost to return first row)
    pub startup: f64,
    /// Total cost (cost to return all rows)
    pub total: f64,
}

impl NodeCost {
    /// Creates a new cost with startup and total values
    pub fn new(startup: f64, total: f64) -> Self {
        Self { startup, total }
    }
}

/// Actual timing information from EXPLAIN ANALYZE, per loop
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ActualTime {
    /// Time to return first row
    pub startup: f64,
    /// Time to return all rows
    pub total: f64,
}

impl ActualTime {
    /// Creates new actual timing
    pub fn new(startup: f64, total: f64) -> Self {
        Self { startup, total }
    }
}

/// Block counters reported with the BUFFERS option
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BufferUsage {
    pub shared_hit: Option<u64>,
    pub shared_read: Option<u64>,
    pub shared_dirtied: Option<u64>,
    pub shared_written: Option<u64>,
    pub temp_read: Option<u64>,
    pub temp_written: Option<u64>,
}

impl BufferUsage {
    /// Returns true if no counter was reported
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Metrics computed from the finished tree
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanMetrics {
    /// Time spent in this node alone, children excluded
    pub exclusive_time_ms: Option<f64>,
    /// Actual rows divided by estimated rows
    pub rows_estimate_ratio: Option<f64>,
    /// Share of total execution time spent in this node
    pub time_percentage: Option<f64>,
    /// Whether this node dominates the runtime
    pub is_bottleneck: bool,
}

/// Compact description of one node inside a [`PlanSummary`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRef {
    pub id: NodeId,
    pub node_type: String,
    pub relation: Option<String>,
    pub exclusive_time_ms: Option<f64>,
    pub time_percentage: Option<f64>,
    pub rows_estimate_ratio: Option<f64>,
}

impl From<&PlanNode> for NodeRef {
    fn from(node: &PlanNode) -> Self {
        Self {
            id: node.id,
            node_type: node.node_type.clone(),
            relation: node.relation.clone(),
            exclusive_time_ms: node.metrics.exclusive_time_ms,
            time_percentage: node.metrics.time_percentage,
            rows_estimate_ratio: node.metrics.rows_estimate_ratio,
        }
    }
}

/// Plan overview used by reporting and explanation layers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanSummary {
    pub node_count: usize,
    pub max_depth: usize,
    pub execution_time_ms: f64,
    pub planning_time_ms: Option<f64>,
    pub bottlenecks: Vec<NodeRef>,
    /// Node with the largest exclusive time
    pub slowest_node: Option<NodeRef>,
    /// Node whose row estimate is furthest from the actual count
    pub worst_estimate: Option<NodeRef>,
}

/// Iterator for traversing plan nodes depth-first
pub struct PlanNodeIterator<'a> {
    stack: Vec<&'a PlanNode>,
}

impl<'a> PlanNodeIterator<'a> {
    fn new(root: &'a PlanNode) -> Self {
        Self { stack: vec![root] }
    }
}

impl<'a> Iterator for PlanNodeIterator<'a> {
    type Item = &'a PlanNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // Push children in reverse order so we visit them in order
        for child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}
