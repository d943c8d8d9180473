//! Output formatting for parsed plans.

use anyhow::Result;
use comfy_table::{Cell, ContentArrangement, Table};
use planlens_analyzer::explain::{ParseResult, PlanNode};
use serde::Deserialize;

/// Output format for parse results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One table row per plan node
    #[default]
    Table,
    /// The full annotated plan as JSON
    Json,
    /// Plan summary as JSON
    Summary,
}

/// Format a parse result according to the specified format.
pub fn render(plan: &ParseResult, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(format_as_table(plan)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(plan)?),
        OutputFormat::Summary => Ok(serde_json::to_string_pretty(&plan.summary())?),
    }
}

fn format_as_table(plan: &ParseResult) -> String {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        [
            "id",
            "operator",
            "relation",
            "actual ms",
            "exclusive ms",
            "%",
            "rows ratio",
            "bottleneck",
        ]
        .map(Cell::new),
    );

    let mut rows = Vec::new();
    collect_rows(&plan.root, 0, &mut rows);
    for (depth, node) in rows {
        table.add_row(vec![
            Cell::new(node.id.0),
            Cell::new(operator_label(node, depth)),
            Cell::new(relation_label(node)),
            Cell::new(format_ms(node.actual_time.map(|t| t.total))),
            Cell::new(format_ms(node.metrics.exclusive_time_ms)),
            Cell::new(format_percentage(node.metrics.time_percentage)),
            Cell::new(format_ratio(node.metrics.rows_estimate_ratio)),
            Cell::new(if node.metrics.is_bottleneck { "yes" } else { "" }),
        ]);
    }

    let mut out = table.to_string();
    out.push('\n');
    if let Some(ms) = plan.planning_time_ms {
        out.push_str(&format!("Planning Time: {ms:.3} ms\n"));
    }
    out.push_str(&format!("Execution Time: {:.3} ms", plan.execution_time_ms));

    if !plan.warnings.is_empty() {
        out.push_str("\nWarnings:");
        for warning in &plan.warnings {
            out.push_str(&format!("\n  line {}: {}", warning.line_number, warning.text));
        }
    }
    out
}

fn collect_rows<'a>(node: &'a PlanNode, depth: usize, rows: &mut Vec<(usize, &'a PlanNode)>) {
    rows.push((depth, node));
    for child in &node.children {
        collect_rows(child, depth + 1, rows);
    }
}

pub(crate) fn operator_label(node: &PlanNode, depth: usize) -> String {
    match depth {
        0 => node.node_type.clone(),
        _ => format!("{}-> {}", "  ".repeat(depth - 1), node.node_type),
    }
}

pub(crate) fn relation_label(node: &PlanNode) -> String {
    match (&node.relation, &node.alias) {
        (Some(relation), Some(alias)) if alias != relation => format!("{relation} {alias}"),
        (Some(relation), _) => relation.clone(),
        (None, _) => String::new(),
    }
}

pub(crate) fn format_ms(ms: Option<f64>) -> String {
    ms.map_or_else(|| "-".to_string(), |ms| format!("{ms:.3}"))
}

pub(crate) fn format_percentage(pct: Option<f64>) -> String {
    pct.map_or_else(|| "-".to_string(), |pct| format!("{pct:.1}%"))
}

pub(crate) fn format_ratio(ratio: Option<f64>) -> String {
    ratio.map_or_else(|| "-".to_string(), |ratio| format!("{ratio:.2}"))
}
