//! Sanitize command implementation: policy assembly, input, output.
//!
//! License: MIT OR APACHE 2.0

use anyhow::{Context, Result};
use is_terminal::IsTerminal;
use log::{debug, info};
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use trustedhtml_core::{
    get_or_compile_policy, merge_policies, AuditSink, HtmlSanitizer, JsonLinesAuditSink, PolicyConfig,
    SanitizedHtml,
};

use crate::cli::OutputFormat;
use crate::ui::output_format;

/// Options for the ergonomic run_sanitize_opts API
#[derive(Debug, Clone)]
pub struct SanitizeOptions {
    pub input: String,
    pub output_path: Option<PathBuf>,
    pub format: OutputFormat,
    pub audit_log: Option<PathBuf>,
    pub quiet: bool,
}

/// Helper for printing info messages to stderr.
pub fn info_msg(msg: impl AsRef<str>) {
    let stderr_supports_color = io::stderr().is_terminal();
    let _ = output_format::print_info_message(&mut io::stderr(), msg.as_ref(), stderr_supports_color);
}

/// Helper for printing warning messages to stderr.
pub fn warn_msg(msg: impl AsRef<str>) {
    let stderr_supports_color = io::stderr().is_terminal();
    let _ = output_format::print_warn_message(&mut io::stderr(), msg.as_ref(), stderr_supports_color);
}

/// Helper for printing error messages to stderr.
pub fn error_msg(msg: impl AsRef<str>) {
    let stderr_supports_color = io::stderr().is_terminal();
    let _ = output_format::print_error_message(&mut io::stderr(), msg.as_ref(), stderr_supports_color);
}

/// Reads the whole input from a file, or from stdin when no path is given.
pub fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Failed to read input file: {}", path.display()))
        }
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read input from stdin")?;
            Ok(buffer)
        }
    }
}

/// Builds the effective policy: defaults, merged user policy, denied elements, tracing.
pub fn load_policy(policy_path: Option<&Path>, deny: &[String], trace: bool) -> Result<PolicyConfig> {
    let default_config = PolicyConfig::load_default_policy()?;
    let user_config = policy_path.map(PolicyConfig::load_from_file).transpose()?;
    let mut config = merge_policies(default_config, user_config);
    if !deny.is_empty() {
        config.deny_elements(deny);
    }
    if trace {
        config.verbose = Some(true);
    }
    debug!("Effective policy has {} element(s).", config.elements.len());
    Ok(config)
}

fn open_audit_log(path: &Path) -> Result<Arc<dyn AuditSink>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open audit log: {}", path.display()))?;
    Ok(Arc::new(JsonLinesAuditSink::new(Box::new(file))))
}

/// Renders a result in the requested format.
pub fn render(result: &SanitizedHtml, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Html => result.html.clone(),
        OutputFormat::Text => result.plain_text.clone(),
        OutputFormat::Json => serde_json::to_string_pretty(result).context("Failed to serialize result as JSON")?,
    })
}

/// The main operation runner for the trustedhtml CLI.
pub fn run_sanitize_opts(config: &PolicyConfig, opts: SanitizeOptions) -> Result<()> {
    info!("Starting trustedhtml operation.");

    let policy = get_or_compile_policy(config).context("Failed to compile policy")?;
    let mut sanitizer = HtmlSanitizer::new(policy);
    if let Some(path) = &opts.audit_log {
        sanitizer = sanitizer.with_audit_sink(open_audit_log(path)?);
    }

    // Nothing is written unless sanitization succeeds.
    let result = sanitizer.sanitize(&opts.input).context("Sanitization failed")?;
    debug!(
        "Content sanitized. Original length: {}, Sanitized length: {}",
        opts.input.len(),
        result.html.len()
    );
    if result.html.is_empty() && !opts.input.trim().is_empty() && !opts.quiet {
        warn_msg("Nothing in the input survived sanitization.");
    }

    let rendered = render(&result, opts.format)?;
    handle_primary_output(&opts, &rendered)?;

    info!("Trustedhtml operation completed.");
    Ok(())
}

fn handle_primary_output(opts: &SanitizeOptions, rendered: &str) -> Result<()> {
    if let Some(path) = &opts.output_path {
        if !opts.quiet {
            info_msg(format!("Writing sanitized content to file: {}", path.display()));
        }
        let mut file = fs::File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        writeln!(file, "{}", rendered)?;
    } else {
        let stdout = io::stdout();
        let mut writer = stdout.lock();
        writeln!(writer, "{}", rendered)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_policy_applies_deny_and_trace() -> Result<()> {
        let config = load_policy(None, &["img".to_string()], true)?;
        assert!(!config.elements.contains_key("img"));
        assert!(config.verbose());
        Ok(())
    }

    #[test]
    fn test_render_formats() -> Result<()> {
        let result = SanitizedHtml {
            html: "<p>a &amp; b</p>".to_string(),
            plain_text: "a & b".to_string(),
        };
        assert_eq!(render(&result, OutputFormat::Html)?, "<p>a &amp; b</p>");
        assert_eq!(render(&result, OutputFormat::Text)?, "a & b");
        let json: serde_json::Value = serde_json::from_str(&render(&result, OutputFormat::Json)?)?;
        assert_eq!(json["plain_text"], "a & b");
        Ok(())
    }

    #[test]
    fn test_run_writes_output_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let output_path = dir.path().join("out.html");
        let config = load_policy(None, &[], false)?;
        run_sanitize_opts(
            &config,
            SanitizeOptions {
                input: "Hi <em onclick=\"x\">there</em>".to_string(),
                output_path: Some(output_path.clone()),
                format: OutputFormat::Html,
                audit_log: None,
                quiet: true,
            },
        )?;
        assert_eq!(fs::read_to_string(output_path)?, "<p>Hi <em>there</em></p>\n");
        Ok(())
    }
}
