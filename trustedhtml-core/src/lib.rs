// trustedhtml-core/src/lib.rs
//! # TrustedHTML Core Library
//!
//! `trustedhtml-core` turns untrusted HTML fragments into markup that is safe
//! to embed in a page. Everything not explicitly whitelisted by a policy is
//! removed: unknown elements with their content, unknown attributes, values
//! that fail their validator, CSS properties outside the allowed tables.
//!
//! The library is pure and synchronous. A compiled [`Policy`] is immutable
//! and may be shared by any number of threads; every sanitization call owns
//! its own document tree.
//!
//! ## Modules
//!
//! * `config`: YAML policy documents, the embedded default policy, merging and denying.
//! * `sanitizers`: Compiles a `PolicyConfig` into a cached, immutable `Policy`.
//! * `validators`: Typed value validators (text, lists, URLs, numbers, colors, sequences, CSS).
//! * `engine`: Applies rule set chains to a tag's attributes.
//! * `dom`: Parses fragments into an owned tree and serializes it back.
//! * `html`: The convergent sanitization pipeline.
//! * `audit`: Audit events and sinks.
//! * `origin`: The site identity used to localize links.
//! * `headless`: One-shot convenience wrappers.
//!
//! ## Usage Example
//!
//! ```rust
//! use trustedhtml_core::{compile_policy, HtmlSanitizer, PolicyConfig};
//! use std::sync::Arc;
//! use anyhow::Result;
//!
//! fn main() -> Result<()> {
//!     let config = PolicyConfig::load_default_policy()?;
//!     let sanitizer = HtmlSanitizer::new(Arc::new(compile_policy(&config)?));
//!
//!     let result = sanitizer.sanitize("Hello <b onclick=\"steal()\">world</b><script>x()</script>")?;
//!     assert_eq!(result.html, "<p>Hello <b>world</b></p>");
//!     assert_eq!(result.plain_text, "Hello world");
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Validation outcomes are plain values ([`Rejection`]) and never escape the
//! library. Caller-facing failures are [`TrustedError`]; configuration loading
//! returns `anyhow::Error` with context.
//!
//! License: MIT OR APACHE 2.0

pub mod audit;
pub mod config;
pub mod dom;
pub mod engine;
pub mod errors;
pub mod headless;
pub mod html;
pub mod origin;
pub mod sanitizers;
pub mod validators;

/// Re-exports the policy configuration types and functions.
pub use config::{
    merge_policies,
    KindSpec,
    PolicyConfig,
    RuleSetConfig,
    ValidatorSpec,
    DEFAULT_BLOCK,
    DEFAULT_BLOCK_ELEMENTS,
};

/// Re-exports the custom error type for clear error reporting.
pub use errors::{Stage, TrustedError};

/// Re-exports the compiled policy and its compiler.
pub use sanitizers::compiler::{compile_policy, get_or_compile_policy, Policy, RewriteRule};

/// Re-exports the sanitizer and its result type.
pub use html::{HtmlSanitizer, SanitizedHtml, MAX_ITERATIONS, MAX_PREPARE_PASSES};

/// Re-exports the rule engine types.
pub use engine::{Equivalents, Run, RuleSet, RuleSetChain, Tag, Verdict};

/// Re-exports validators and their outcome type.
pub use validators::{Environment, Rejection, Requirement, ValidationContext, Validator};

/// Re-exports the audit and site-origin collaborators.
pub use audit::{AuditEvent, AuditSink, JsonLinesAuditSink, MemoryAuditSink, NullAuditSink};
pub use origin::{SiteOrigin, StaticOrigin};

/// Re-exports the one-shot helpers.
pub use headless::{headless_sanitize_html, sanitize_with_default_policy};
