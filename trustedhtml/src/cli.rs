//! This file defines the command-line interface (CLI) for the trustedhtml application.
//! License: MIT OR APACHE 2.0

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// What to write for a sanitized fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// The sanitized markup.
    Html,
    /// The visible text of the sanitized markup.
    Text,
    /// Both, as a JSON object with `html` and `plain_text`.
    Json,
}

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(
    name = "trustedhtml",
    author = "Relay",
    version = env!("CARGO_PKG_VERSION"),
    about = "Sanitize untrusted HTML fragments against a whitelist policy",
    long_about = "TrustedHTML removes every element, attribute and CSS property a policy does not explicitly allow, validates the values of those it keeps, and normalizes the result until it is stable. Input that does not stabilize is refused and nothing is written."
)]
pub struct Cli {
    /// Path to an input file (reads from stdin if not provided).
    #[arg(long, short = 'i', value_name = "FILE", help = "Read input from a specified file instead of stdin.")]
    pub input: Option<PathBuf>,

    /// Write sanitized output to this file instead of stdout.
    #[arg(long, short = 'o', value_name = "FILE", help = "Write output to a specified file instead of stdout.")]
    pub output: Option<PathBuf>,

    /// Path to a custom policy file (YAML), merged over the default policy.
    #[arg(long = "policy", value_name = "FILE", env = "TRUSTEDHTML_POLICY", help = "Path to a custom policy file (YAML), merged over the default policy.")]
    pub policy: Option<PathBuf>,

    /// Remove these elements from the whitelist (comma-separated).
    #[arg(long = "deny", value_delimiter = ',', value_name = "ELEMENTS", help = "Remove these elements from the whitelist (comma-separated).")]
    pub deny: Vec<String>,

    /// Output format.
    #[arg(long = "format", short = 'f', value_enum, default_value = "html", help = "Output format: html, text or json.")]
    pub format: OutputFormat,

    /// Append audit events as JSON lines to this file.
    #[arg(long = "audit-log", value_name = "FILE", help = "Append audit events as JSON lines to this file.")]
    pub audit_log: Option<PathBuf>,

    /// Log every accept/reject decision.
    #[arg(long = "trace", help = "Log every accept/reject decision to stderr.")]
    pub trace: bool,

    /// Disable informational messages
    #[arg(long, short = 'q', help = "Suppress all informational and debug messages.")]
    pub quiet: bool,

    /// Enable debug logging (overrides RUST_LOG)
    #[arg(long, short = 'd', help = "Enable debug logging.")]
    pub debug: bool,
}
