//! Errors raised while parsing EXPLAIN output

use thiserror::Error;

/// Errors that can occur when parsing PostgreSQL EXPLAIN output
///
/// Every variant is terminal for a single parse call; nothing is retried and
/// no partial plan is returned.
#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("EXPLAIN output is empty")]
    EmptyInput,

    #[error("Invalid JSON document: {0}")]
    InvalidDocumentFormat(#[from] serde_json::Error),

    #[error("Missing Plan object in EXPLAIN output")]
    MissingRoot,

    #[error("No plan node found in EXPLAIN text output")]
    NoParsableNode,

    #[error("Plan nesting exceeds {limit} levels")]
    PlanTooDeep { limit: usize },
}

impl ExplainError {
    /// Returns a short, stable identifier for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::InvalidDocumentFormat(_) => "invalid_document_format",
            Self::MissingRoot => "missing_root",
            Self::NoParsableNode => "no_parsable_node",
            Self::PlanTooDeep { .. } => "plan_too_deep",
        }
    }
}

/// Result type for EXPLAIN parsing
pub type Result<T> = std::result::Result<T, ExplainError>;
