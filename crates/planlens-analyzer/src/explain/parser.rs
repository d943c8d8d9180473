//! EXPLAIN parse entry points
//!
//! Detects the input format (unless the caller names one) and dispatches to
//! the JSON transformer or the text parser. Parsing performs no I/O.

use crate::explain::error::{ExplainError, Result};
use crate::explain::format::{FormatHint, PlanFormat};
use crate::explain::json::parse_json_explain;
use crate::explain::options::ParseOptions;
use crate::explain::plan::ParseResult;
use crate::explain::text::parse_text_explain_with;

/// Parses PostgreSQL EXPLAIN ANALYZE output (JSON or text format)
///
/// # Examples
///
/// ```
/// use planlens_analyzer::explain::{parse_explain, FormatHint};
///
/// let plan = parse_explain(
///     r#"{"Plan": {"Node Type": "Seq Scan", "Actual Total Time": 5, "Actual Loops": 1}, "Execution Time": 5}"#,
///     FormatHint::Auto,
/// )
/// .unwrap();
/// assert!(plan.root.metrics.is_bottleneck);
/// ```
pub fn parse_explain(input: &str, format: FormatHint) -> Result<ParseResult> {
    parse_explain_with(input, &ParseOptions::new(format))
}

/// Parses EXPLAIN output using the given options
pub fn parse_explain_with(input: &str, options: &ParseOptions) -> Result<ParseResult> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ExplainError::EmptyInput);
    }

    let format = options.format.resolve(trimmed);
    tracing::debug!(%format, hint = ?options.format, strict = options.strict, "parsing EXPLAIN output");

    let plan = match format {
        PlanFormat::Structured => parse_json_explain(trimmed)?,
        // Untrimmed so leading indentation and line numbers stay intact
        PlanFormat::Text => parse_text_explain_with(input, options)?,
    };

    tracing::debug!(
        nodes = plan.root.node_count(),
        execution_time_ms = plan.execution_time_ms,
        warnings = plan.warnings.len(),
        "parsed EXPLAIN output"
    );
    Ok(plan)
}
