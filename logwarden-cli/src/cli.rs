//! CLI argument parsing using clap derive API
//!
//! This module is purely declarative with no side effects or I/O.
//! File-existence pre-checks and command dispatch live in `main.rs`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Logwarden -- access-log abuse and anomaly detection.
///
/// Use `logwarden <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "logwarden", version, about, long_about = None)]
pub struct Cli {
    /// Path to the logwarden.toml configuration file.
    #[arg(short, long, default_value = "logwarden.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest log files and run the full detection and profiling pass.
    Analyze(AnalyzeArgs),

    /// Parse the first lines of one file and show per-line results.
    CheckFormat(CheckFormatArgs),
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// One or more access log files to analyze.
    #[arg(required = true)]
    pub log_files: Vec<PathBuf>,

    /// Log format: predefined name (common, combined, combined_with_time,
    /// vhost_combined), Apache LogFormat string, or custom regex.
    /// Overrides the configured format.
    #[arg(long)]
    pub format: Option<String>,

    /// Inclusive start of the analysis window (%Y-%m-%d %H:%M:%S).
    #[arg(long, requires = "end")]
    pub start: Option<String>,

    /// Inclusive end of the analysis window (%Y-%m-%d %H:%M:%S).
    #[arg(long, requires = "start")]
    pub end: Option<String>,

    /// Number of top threats to report.
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Minimum requests for the suspicious-IP summary.
    #[arg(long, default_value_t = 100)]
    pub min_suspicious_requests: u64,
}

#[derive(Args, Debug)]
pub struct CheckFormatArgs {
    /// The access log file to test against the format.
    pub log_file: PathBuf,

    /// Log format to test. Overrides the configured format.
    #[arg(long)]
    pub format: Option<String>,

    /// Number of lines to test.
    #[arg(long, default_value_t = 10)]
    pub lines: usize,
}

/// Output rendering format.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Machine-parseable pretty JSON.
    Json,
}
