// trustedhtml-core/src/headless.rs

//! `headless.rs`
//! Convenience wrappers for one-shot sanitization without managing a
//! sanitizer instance. Policies are compiled once and served from the
//! compiled-policy cache on later calls.

use anyhow::Result;
use std::sync::Arc;

use crate::audit::AuditSink;
use crate::config::PolicyConfig;
use crate::html::{HtmlSanitizer, SanitizedHtml};
use crate::sanitizers::compiler::get_or_compile_policy;

/// Sanitizes `content` against `config`, optionally reporting to an audit sink.
///
/// # Arguments
///
/// * `config` - The merged PolicyConfig (defaults + optional user overrides).
/// * `content` - The HTML fragment to be sanitized.
/// * `audit` - Where audit events go; `None` discards them.
pub fn headless_sanitize_html(
    config: &PolicyConfig,
    content: &str,
    audit: Option<Arc<dyn AuditSink>>,
) -> Result<SanitizedHtml> {
    let policy = get_or_compile_policy(config)?;
    let mut sanitizer = HtmlSanitizer::new(policy);
    if let Some(audit) = audit {
        sanitizer = sanitizer.with_audit_sink(audit);
    }
    Ok(sanitizer.sanitize(content)?)
}

/// Sanitizes `content` against the built-in policy.
pub fn sanitize_with_default_policy(content: &str) -> Result<SanitizedHtml> {
    let config = PolicyConfig::load_default_policy()?;
    headless_sanitize_html(&config, content, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::errors::TrustedError;

    #[test]
    fn test_headless_sanitize_with_default_policy() -> Result<()> {
        let result = sanitize_with_default_policy("<p onclick=\"x()\">Hi <script>bad()</script>there</p>")?;
        assert_eq!(result.html, "<p>Hi there</p>");
        assert_eq!(result.plain_text, "Hi there");
        Ok(())
    }

    #[test]
    fn test_headless_sanitize_reports_to_audit_sink() -> Result<()> {
        let config = PolicyConfig::load_default_policy()?;
        let sink = Arc::new(MemoryAuditSink::new());
        headless_sanitize_html(&config, "<b>bold</b>", Some(sink.clone()))?;
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].output, "<p><b>bold</b></p>");
        Ok(())
    }

    #[test]
    fn test_headless_sanitize_surfaces_non_convergence() -> Result<()> {
        let config = PolicyConfig::load_default_policy()?;
        let err = headless_sanitize_html(&config, "&#&#&#53;&#52;;&#&#53;&#51;;;", None).unwrap_err();
        let cause = err.downcast_ref::<TrustedError>().expect("a TrustedError");
        assert!(cause.is_non_convergent());
        Ok(())
    }
}
