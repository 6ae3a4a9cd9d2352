//! html.rs - The tree sanitizer.
//!
//! One sanitization call runs the following stages until the output stops
//! changing:
//!
//! * **preparing**: on the raw markup, drop NUL, decode numeric character
//!   references, squeeze control characters and whitespace;
//! * **filtering**: parse, rewrite and check every element against the
//!   policy, escape text;
//! * **collapsing**: remove elements that render to nothing and merge
//!   adjacent text;
//! * **root collapsing**: drop blank top-level text;
//! * **wrapping**: put stray top-level inline content into the default
//!   block element.
//!
//! Both loops have fixed budgets. Input that is still changing when a budget
//! runs out is refused with [`TrustedError::NonConvergent`] rather than
//! returned half-sanitized.
//!
//! License: MIT OR APACHE 2.0

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;

use crate::audit::{AuditEvent, AuditSink, NullAuditSink};
use crate::dom::{self, Document, Node};
use crate::engine::{Run, Tag};
use crate::errors::{Stage, TrustedError};
use crate::origin::{SiteOrigin, StaticOrigin};
use crate::sanitizers::compiler::Policy;
use crate::validators::{Environment, TRACE_TARGET};

const NBSP_STR: &str = "\u{a0}";

/// Extra passes of the preparing stage allowed after the first one.
pub const MAX_PREPARE_PASSES: usize = 2;
/// Extra iterations of the outer loop allowed after the first one.
pub const MAX_ITERATIONS: usize = 2;

static CHARACTER_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&#(?:([0-9]+);?|[xX]([0-9A-Fa-f]+);?)").expect("valid character reference pattern")
});
// ASCII only: `\s` would also match the no-break space.
static CONTROL_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\x01-\x1F ]+").expect("valid control pattern"));
static SPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\x{a0} ]{2,}").expect("valid space run pattern"));

/// Result of a successful sanitization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedHtml {
    pub html: String,
    pub plain_text: String,
}

/// Squeezes runs of two or more spaces / no-break spaces into a single no-break space.
pub fn collapse_spaces(text: &str) -> Cow<'_, str> {
    SPACE_RUN.replace_all(text, NBSP_STR)
}

/// One normalization pass over raw markup.
pub fn normalize(markup: &str) -> String {
    let without_nul = markup.replace('\0', "");
    let decoded = CHARACTER_REFERENCE.replace_all(&without_nul, decode_reference);
    let spaced = CONTROL_RUN.replace_all(&decoded, " ");
    collapse_spaces(&spaced).into_owned()
}

fn decode_reference(caps: &Captures<'_>) -> String {
    let code = if let Some(decimal) = caps.get(1) {
        decimal.as_str().parse::<u32>().ok()
    } else if let Some(hex) = caps.get(2) {
        u32::from_str_radix(hex.as_str(), 16).ok()
    } else {
        None
    };
    let Some(ch) = code.filter(|&c| c != 0).and_then(char::from_u32) else {
        return String::new();
    };
    match dom::SPECIAL_CHARS.iter().find(|(special, _)| *special == ch) {
        Some((_, entity)) => entity.to_string(),
        None => ch.to_string(),
    }
}

/// Normalizes until a pass changes nothing.
pub fn prepare(markup: &str) -> Result<String, TrustedError> {
    let mut current = markup.to_string();
    for pass in 0..=MAX_PREPARE_PASSES {
        let next = normalize(&current);
        if next == current {
            return Ok(current);
        }
        debug!("Preparing pass {} changed {} bytes into {} bytes.", pass, current.len(), next.len());
        current = next;
    }
    Err(TrustedError::NonConvergent {
        stage: Stage::Preparing,
        passes: MAX_PREPARE_PASSES + 1,
    })
}

fn is_blank(text: &str) -> bool {
    text.is_empty() || text == " " || text == NBSP_STR
}

/// Sanitizes HTML fragments against a compiled [`Policy`].
#[derive(Clone)]
pub struct HtmlSanitizer {
    policy: Arc<Policy>,
    origin: Arc<dyn SiteOrigin>,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for HtmlSanitizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtmlSanitizer")
            .field("site", &self.origin.domain())
            .field("elements", &self.policy.elements.len())
            .finish_non_exhaustive()
    }
}

impl HtmlSanitizer {
    /// Uses the policy's site domain and discards audit events.
    pub fn new(policy: Arc<Policy>) -> Self {
        let origin = Arc::new(StaticOrigin::new(policy.site_domain.clone()));
        Self {
            policy,
            origin,
            audit: Arc::new(NullAuditSink),
        }
    }

    pub fn with_site_origin(mut self, origin: Arc<dyn SiteOrigin>) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Sanitizes one fragment. Records one audit event for the call, whatever the outcome.
    pub fn sanitize(&self, raw: &str) -> Result<SanitizedHtml, TrustedError> {
        let env = Environment::new(self.origin.as_ref(), self.audit.as_ref(), self.policy.verbose);
        let result = self.converge(raw, &env);
        let event = match &result {
            Ok(sanitized) => AuditEvent::new(true, "html", raw, &sanitized.html),
            Err(e) => AuditEvent::new(false, "html", raw, &e.to_string()),
        };
        self.audit.record(&event);
        result
    }

    fn converge(&self, raw: &str, env: &Environment<'_>) -> Result<SanitizedHtml, TrustedError> {
        let mut html = raw.to_string();
        for iteration in 0..=MAX_ITERATIONS {
            let source = prepare(&html)?;
            let (output, plain_text) = self.filter(&source, env);
            if output == source {
                debug!("Markup stable after {} iteration(s).", iteration + 1);
                return Ok(SanitizedHtml { html: output, plain_text });
            }
            debug!("Iteration {} rewrote {} bytes into {} bytes.", iteration, source.len(), output.len());
            html = output;
        }
        info!("Refusing markup that did not stabilize after {} iterations.", MAX_ITERATIONS + 1);
        Err(TrustedError::NonConvergent {
            stage: Stage::Filtering,
            passes: MAX_ITERATIONS + 1,
        })
    }

    /// One pass of parse, clear, collapse, wrap and serialize.
    fn filter(&self, markup: &str, env: &Environment<'_>) -> (String, String) {
        let mut document = Document::parse_fragment(markup);
        self.clear(&mut document.children, env);
        self.collapse(&mut document.children);
        collapse_root(&mut document.children);
        document.children = self.wrap(std::mem::take(&mut document.children));
        (document.to_html(), document.plain_text())
    }

    fn clear(&self, nodes: &mut Vec<Node>, env: &Environment<'_>) {
        nodes.retain_mut(|node| match node {
            Node::Element(element) => {
                self.policy.rewrite(&mut element.tag);
                if self.check(&mut element.tag, env) {
                    self.clear(&mut element.children, env);
                    true
                } else {
                    false
                }
            }
            Node::Text(text) => {
                let escaped = dom::escape_text(&collapse_spaces(text));
                if escaped != *text {
                    *text = escaped;
                }
                true
            }
        });
    }

    fn check(&self, tag: &mut Tag, env: &Environment<'_>) -> bool {
        let Some(chain) = self.policy.chain_for(&tag.name) else {
            if env.verbose {
                debug!(target: TRACE_TARGET, "!<{}> is not whitelisted", tag.name);
            }
            return false;
        };
        Run::new(chain, &self.policy.equivalents).check(tag, env).is_accepted()
    }

    /// Collapses empty elements and joins text until nothing changes, at every level.
    fn collapse(&self, nodes: &mut Vec<Node>) {
        loop {
            let mut changed = false;
            let mut index = 0;
            while index < nodes.len() {
                let replacement = match &mut nodes[index] {
                    Node::Element(element) => {
                        self.collapse(&mut element.children);
                        self.collapsed(element)
                    }
                    Node::Text(_) => None,
                };
                match replacement {
                    Some(text) if text.is_empty() => {
                        nodes.remove(index);
                        changed = true;
                        continue;
                    }
                    Some(text) => {
                        nodes[index] = Node::Text(text);
                        changed = true;
                    }
                    None => {}
                }
                index += 1;
            }
            if !changed && !join(nodes) {
                break;
            }
        }
    }

    /// What an element collapses into, if it renders to nothing worth keeping.
    fn collapsed(&self, element: &dom::Element) -> Option<String> {
        let name = element.name();
        if self.policy.void_elements.contains(name) || self.policy.keep_empty.contains(name) {
            return None;
        }
        let inner = normalize(&dom::render(&element.children, false));
        let lone_nbsp = inner == NBSP_STR && !self.policy.keep_nbsp.contains(name);
        if inner.is_empty() || inner == " " || lone_nbsp {
            Some(inner)
        } else {
            None
        }
    }

    fn needs_wrap(&self, node: &Node, continuing: bool) -> bool {
        match node {
            Node::Element(element) => !self.policy.block_elements.contains(element.name()),
            Node::Text(text) => continuing || !is_blank(text),
        }
    }

    /// Wraps maximal runs of top-level inline content into the default block element.
    fn wrap(&self, nodes: Vec<Node>) -> Vec<Node> {
        let mut wrapped = Vec::with_capacity(nodes.len());
        let mut run: Vec<Node> = Vec::new();
        for node in nodes {
            if self.needs_wrap(&node, !run.is_empty()) {
                run.push(node);
                continue;
            }
            if !run.is_empty() {
                wrapped.push(self.block(std::mem::take(&mut run)));
            }
            wrapped.push(node);
        }
        if !run.is_empty() {
            wrapped.push(self.block(run));
        }
        wrapped
    }

    fn block(&self, children: Vec<Node>) -> Node {
        Node::Element(dom::Element::new(self.policy.default_block.clone(), Vec::new(), children))
    }
}

/// Merges adjacent text nodes. Returns whether anything was merged.
fn join(nodes: &mut Vec<Node>) -> bool {
    let mut changed = false;
    let mut index = 0;
    while index + 1 < nodes.len() {
        if let (Node::Text(first), Node::Text(second)) = (&nodes[index], &nodes[index + 1]) {
            let merged = normalize(&format!("{}{}", first, second));
            nodes[index] = Node::Text(merged);
            nodes.remove(index + 1);
            changed = true;
            continue;
        }
        index += 1;
    }
    changed
}

/// Drops top-level text that is empty, a single space or a lone no-break space.
fn collapse_root(nodes: &mut Vec<Node>) {
    nodes.retain(|node| match node {
        Node::Text(text) => !is_blank(&normalize(text)),
        Node::Element(_) => true,
    });
}
