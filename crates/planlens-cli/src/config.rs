//! Config file loading

use anyhow::{Context, Result};
use planlens_analyzer::explain::{FormatHint, ParseOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

/// Name of the config file looked up in the user config directory
pub const CONFIG_FILE_NAME: &str = "planlens.toml";

/// Settings read from `planlens.toml`
///
/// Every key is optional:
///
/// ```toml
/// format = "text"
/// strict = true
/// output = "summary"
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(flatten)]
    pub parse: ParseOptions,
    pub output: OutputFormat,
}

impl Config {
    /// Applies command-line flags on top of the file values
    pub fn with_overrides(
        mut self,
        format: Option<FormatHint>,
        strict: bool,
        output: Option<OutputFormat>,
    ) -> Self {
        if let Some(format) = format {
            self.parse.format = format;
        }
        if strict {
            self.parse.strict = true;
        }
        if let Some(output) = output {
            self.output = output;
        }
        self
    }
}

pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .context("Could not determine config directory")
        .map(|p| p.join("planlens"))
}

pub fn default_config_file() -> Result<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE_NAME))
}

/// Loads the config file
///
/// An explicit path must exist. Without one, the default location is used
/// when present and built-in defaults otherwise.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_file() {
            Ok(path) if path.is_file() => path,
            _ => {
                tracing::debug!("no config file found, using defaults");
                return Ok(Config::default());
            }
        },
    };

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config =
        parse_config(&contents).with_context(|| format!("Invalid config file: {:?}", path))?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

pub fn parse_config(contents: &str) -> Result<Config> {
    Ok(toml::from_str(contents)?)
}
