// trustedhtml/src/main.rs
//! TrustedHTML entry point.
//!
//! Parses the command line, sets up logging, assembles the policy and runs
//! the sanitize command. Any failure, including input that does not
//! stabilize, exits with a non-zero status and writes no output.

use clap::Parser;
use log::LevelFilter;
use std::process::ExitCode;

use trustedhtml::cli::Cli;
use trustedhtml::commands::sanitize::{self, SanitizeOptions};
use trustedhtml::logger;

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = sanitize::load_policy(cli.policy.as_deref(), &cli.deny, cli.trace)?;
    let input = sanitize::read_input(cli.input.as_deref())?;
    let opts = SanitizeOptions {
        input,
        output_path: cli.output,
        format: cli.format,
        audit_log: cli.audit_log,
        quiet: cli.quiet,
    };
    sanitize::run_sanitize_opts(&config, opts)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Some(LevelFilter::Off)
    } else if cli.debug {
        Some(LevelFilter::Debug)
    } else {
        None
    };
    logger::init_logger(level, cli.trace);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            sanitize::error_msg(format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}
