//! Input format detection

use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of the EXPLAIN output being parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanFormat {
    /// `EXPLAIN (FORMAT JSON)` document
    Structured,
    /// Default indented text report
    Text,
}

impl fmt::Display for PlanFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured => f.write_str("structured"),
            Self::Text => f.write_str("text"),
        }
    }
}

/// Format requested by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatHint {
    /// Decide from the input itself
    #[default]
    Auto,
    Structured,
    Text,
}

impl FormatHint {
    /// Resolves the hint against the input
    pub fn resolve(self, input: &str) -> PlanFormat {
        match self {
            Self::Auto => detect_format(input),
            Self::Structured => PlanFormat::Structured,
            Self::Text => PlanFormat::Text,
        }
    }
}

impl From<PlanFormat> for FormatHint {
    fn from(format: PlanFormat) -> Self {
        match format {
            PlanFormat::Structured => Self::Structured,
            PlanFormat::Text => Self::Text,
        }
    }
}

/// Classifies input by its first non-whitespace character
///
/// `[` or `{` means a JSON document; anything else, including empty input,
/// is treated as text.
///
/// # Examples
///
/// ```
/// use planlens_analyzer::explain::{detect_format, PlanFormat};
///
/// assert_eq!(detect_format("  [ {\"a\":1} ]"), PlanFormat::Structured);
/// assert_eq!(detect_format("Seq Scan on users"), PlanFormat::Text);
/// ```
pub fn detect_format(input: &str) -> PlanFormat {
    match input.trim_start().chars().next() {
        Some('[' | '{') => PlanFormat::Structured,
        _ => PlanFormat::Text,
    }
}
