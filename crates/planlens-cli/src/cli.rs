//! planlens Command Line Interface
//!
//! Parses PostgreSQL `EXPLAIN ANALYZE` output and reports where the time went.

mod config;
mod output;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use planlens_analyzer::explain::{FormatHint, ParseOptions, parse_explain_with};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::output::OutputFormat;

/// planlens Command Line Interface
///
/// Reads EXPLAIN ANALYZE output (JSON or text) and annotates every plan node
/// with its exclusive time, share of execution time and estimate accuracy.
#[derive(Parser, Debug)]
#[command(name = "planlens")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "PLANLENS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse EXPLAIN ANALYZE output and print the annotated plan
    Parse {
        /// File containing the EXPLAIN output, `-` or nothing for stdin
        file: Option<PathBuf>,

        /// Input format
        #[arg(short, long, value_enum)]
        format: Option<InputFormat>,

        /// Report lines that could not be interpreted
        #[arg(long)]
        strict: bool,

        /// Output format
        #[arg(short, long, value_enum)]
        output: Option<OutputFormat>,
    },
}

/// Input format accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InputFormat {
    /// Detect from the first non-whitespace character
    Auto,
    /// `EXPLAIN (ANALYZE, FORMAT JSON)` output
    Structured,
    /// Default text output
    Text,
}

impl From<InputFormat> for FormatHint {
    fn from(format: InputFormat) -> Self {
        match format {
            InputFormat::Auto => FormatHint::Auto,
            InputFormat::Structured => FormatHint::Structured,
            InputFormat::Text => FormatHint::Text,
        }
    }
}

fn main() {
    init_tracing();

    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("planlens=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Parse {
            file,
            format,
            strict,
            output,
        } => {
            let config = config::load(cli.config.as_deref())?.with_overrides(
                format.map(FormatHint::from),
                strict,
                output,
            );
            parse(file.as_deref(), &config.parse, config.output)
        }
    }
}

fn parse(file: Option<&Path>, options: &ParseOptions, output: OutputFormat) -> Result<()> {
    let input = read_input(file)?;
    let plan = parse_explain_with(&input, options).context("Failed to parse EXPLAIN output")?;
    tracing::debug!(
        format = %plan.format,
        nodes = plan.root.node_count(),
        warnings = plan.warnings.len(),
        "parsed plan"
    );

    println!("{}", output::render(&plan, output)?);
    Ok(())
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {:?}", path)),
        _ => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read EXPLAIN output from stdin")?;
            Ok(input)
        }
    }
}
