//! CSS declaration lists (`style` attribute values).
//!
//! Each `property: value` pair is checked by the rule engine as if it were a
//! one-attribute tag, against the rule set chain the style table holds for
//! that property. Unknown properties and pairs no rule set accepts are
//! dropped; a structurally invalid value refuses the whole attribute.
//!
//! License: MIT OR APACHE 2.0

use super::{Rejection, ValidationContext, Validator, TRACE_TARGET};
use crate::engine::{Equivalents, Run, RuleSetChain, Tag, Verdict};
use indexmap::IndexMap;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// A named set of allowed CSS properties.
#[derive(Debug, Clone, Default)]
pub struct StyleTable {
    pub name: String,
    pub properties: IndexMap<String, RuleSetChain>,
    /// Properties validated with another property's chain (`border-top` -> `border`).
    pub equivalents: Equivalents,
}

impl StyleTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Adds a property whose chain is a single rule set holding `validator`.
    pub fn with_property(mut self, property: &str, validator: Validator) -> Self {
        let rule_set = std::iter::once((property.to_string(), validator)).collect();
        self.properties.insert(property.to_string(), vec![rule_set]);
        self
    }

    pub fn with_alias<I, S>(mut self, property: &str, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.equivalents.insert(property, aliases);
        self
    }

    pub fn chain_for(&self, property: &str) -> Option<&RuleSetChain> {
        self.properties.get(property).or_else(|| {
            self.equivalents
                .canonical(property)
                .and_then(|canonical| self.properties.get(canonical))
        })
    }
}

#[derive(Debug, Clone)]
pub struct StyleRule {
    pub table: Arc<StyleTable>,
}

impl StyleRule {
    const DELIMITER: char = ';';
    const JOINER: &'static str = "; ";
    const APPENDER: &'static str = ";";

    pub fn new(table: Arc<StyleTable>) -> Self {
        Self { table }
    }

    pub(crate) fn check(
        &self,
        owner: &Validator,
        ctx: &ValidationContext<'_>,
        raw: Option<&str>,
        value: String,
    ) -> Result<String, Rejection> {
        let value = WHITESPACE.replace_all(&value, " ").trim().to_string();
        let mut declarations = Vec::new();
        for part in value.split(Self::DELIMITER) {
            let Some((name, property_value)) = part.split_once(':') else {
                continue;
            };
            let property = name.trim().to_lowercase();
            let Some(chain) = self.table.chain_for(&property) else {
                if ctx.env.verbose && !ctx.quiet {
                    debug!(target: TRACE_TARGET, "-<{} {}: unknown property {:?}>", ctx.element, self.table.name, property);
                }
                continue;
            };
            let mut declaration = Tag::new(property.clone(), vec![(property, property_value.trim().to_string())]);
            match Run::new(chain, &self.table.equivalents)
                .quiet(ctx.quiet)
                .check(&mut declaration, ctx.env)
            {
                Verdict::Accepted => declarations.extend(
                    declaration
                        .attributes
                        .into_iter()
                        .map(|(name, value)| format!("{}: {}", name, value)),
                ),
                Verdict::Exhausted => {}
                Verdict::Invalid => return Err(owner.report(ctx, raw, &value, Rejection::Invalid)),
            }
        }
        if declarations.is_empty() {
            return Err(owner.reject(ctx, raw, &value));
        }
        let mut joined = declarations.join(Self::JOINER);
        joined.push_str(Self::APPENDER);
        Ok(joined)
    }
}
