//! engine.rs - The rule engine that applies attribute whitelists to a tag.
//!
//! A tag is checked against a [`RuleSetChain`]: an ordered list of
//! [`RuleSet`]s tried one after the other. The first rule set whose
//! validators all succeed wins and rewrites the tag's attributes. A missing
//! required attribute makes a rule set inapplicable and moves on to the next
//! one; a structurally invalid value refuses the tag outright.
//!
//! Only the last rule set of a chain runs loudly. Earlier ones are expected
//! to fail now and then, so their decisions are neither traced nor audited.
//!
//! License: MIT OR APACHE 2.0

use indexmap::IndexMap;
use log::debug;

use crate::validators::{Environment, Rejection, ValidationContext, Validator, TRACE_TARGET};

/// Attribute name to validator. Key order decides where synthesized attributes go.
pub type RuleSet = IndexMap<String, Validator>;

/// Fallback attempts, in order. An empty chain strips every attribute and keeps the tag.
pub type RuleSetChain = Vec<RuleSet>;

/// Canonical attribute name to alias names validated with the canonical validator.
/// Canonicals keep their declaration order, so an alias listed twice resolves to the first one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Equivalents {
    aliases: IndexMap<String, Vec<String>>,
}

impl Equivalents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<I, S>(&mut self, canonical: impl Into<String>, aliases: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases
            .entry(canonical.into())
            .or_default()
            .extend(aliases.into_iter().map(Into::into));
    }

    pub fn aliases(&self, canonical: &str) -> &[String] {
        self.aliases.get(canonical).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The canonical name `alias` stands for, if any.
    pub fn canonical(&self, alias: &str) -> Option<&str> {
        self.aliases
            .iter()
            .find(|(_, aliases)| aliases.iter().any(|a| a == alias))
            .map(|(canonical, _)| canonical.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// An element name with its attributes in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub attributes: Vec<(String, String)>,
}

impl Tag {
    pub fn new(name: impl Into<String>, attributes: Vec<(String, String)>) -> Self {
        Self { name: name.into(), attributes }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_pair(&self, key: &str, value: &str) -> bool {
        self.attributes.iter().any(|(k, v)| k == key && v == value)
    }
}

/// Outcome of checking a tag against a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// A rule set matched and the tag's attributes were rewritten.
    Accepted,
    /// No rule set applied.
    Exhausted,
    /// A structurally invalid value was found; no fallback was attempted.
    Invalid,
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

enum Attempt {
    Accepted(IndexMap<String, String>),
    Fallback,
    Invalid,
}

/// One check of a tag against a chain.
#[derive(Debug, Clone, Copy)]
pub struct Run<'p> {
    chain: &'p [RuleSet],
    equivalents: &'p Equivalents,
    quiet: bool,
}

impl<'p> Run<'p> {
    pub fn new(chain: &'p [RuleSet], equivalents: &'p Equivalents) -> Self {
        Self { chain, equivalents, quiet: false }
    }

    /// Silences every rule set, including the last one.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn check(&self, tag: &mut Tag, env: &Environment<'_>) -> Verdict {
        if self.chain.is_empty() {
            tag.attributes.clear();
            return Verdict::Accepted;
        }
        let last = self.chain.len() - 1;
        for (index, rule_set) in self.chain.iter().enumerate() {
            let quiet = self.quiet || index < last;
            match self.attempt(tag, rule_set, env, quiet) {
                Attempt::Accepted(values) => {
                    tag.attributes = order_attributes(&tag.attributes, values);
                    return Verdict::Accepted;
                }
                Attempt::Fallback => {
                    if env.verbose && !quiet {
                        debug!(target: TRACE_TARGET, "<{}> matched no rule set", tag.name);
                    }
                }
                Attempt::Invalid => return Verdict::Invalid,
            }
        }
        Verdict::Exhausted
    }

    fn attempt(&self, tag: &Tag, rule_set: &RuleSet, env: &Environment<'_>, quiet: bool) -> Attempt {
        let mut accepted = IndexMap::new();
        for (canonical, validator) in rule_set {
            let names = std::iter::once(canonical).chain(self.equivalents.aliases(canonical));
            for attribute in names {
                let ctx = ValidationContext {
                    element: tag.name.as_str(),
                    attribute: attribute.as_str(),
                    quiet,
                    env,
                };
                match validator.validate(&ctx, tag.get(attribute)) {
                    Ok(value) => {
                        accepted.insert(attribute.clone(), value);
                    }
                    Err(Rejection::AbsentOptional) | Err(Rejection::DefaultApplied) => {}
                    Err(Rejection::MissingRequired) | Err(Rejection::SequenceInconsistent) => {
                        return Attempt::Fallback;
                    }
                    Err(Rejection::Invalid) => return Attempt::Invalid,
                }
            }
        }
        Attempt::Accepted(accepted)
    }
}

/// Surviving original attributes keep their order; synthesized ones follow in rule set order.
fn order_attributes(original: &[(String, String)], mut accepted: IndexMap<String, String>) -> Vec<(String, String)> {
    let mut ordered = Vec::with_capacity(accepted.len());
    for (key, _) in original {
        if let Some(value) = accepted.shift_remove(key) {
            ordered.push((key.clone(), value));
        }
    }
    ordered.extend(accepted);
    ordered
}
