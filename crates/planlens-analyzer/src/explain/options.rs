//! Parse options

use crate::explain::format::FormatHint;
use serde::{Deserialize, Serialize};

/// Options controlling a single parse call
///
/// Deserializes from configuration files with every field optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Input format, detected from the input when `Auto`
    pub format: FormatHint,
    /// Record lines the text parser could not interpret as warnings
    pub strict: bool,
}

impl ParseOptions {
    /// Creates options with the given format hint
    pub fn new(format: FormatHint) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    /// Enables or disables strict mode
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}
