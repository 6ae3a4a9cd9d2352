//! Delimited multi-part values: free sequences, CSS indents, positional complexes.
//!
//! License: MIT OR APACHE 2.0

use super::{Rejection, ValidationContext, Validator, TRACE_TARGET};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// How parts are matched against validators.
#[derive(Debug, Clone)]
pub enum SequenceShape {
    /// Every part against the item validator; absent parts are dropped.
    Free,
    /// One, two or four parts, every one of them valid (`margin: 1px 2px`).
    Indent,
    /// Parts matched in order against these slots, any slot may be skipped.
    Complex(Vec<Validator>),
}

impl SequenceShape {
    pub fn name(&self) -> &'static str {
        match self {
            SequenceShape::Free => "sequence",
            SequenceShape::Indent => "indent",
            SequenceShape::Complex(_) => "complex",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SequenceRule {
    pub item: Box<Validator>,
    pub shape: SequenceShape,
    pub delimiter: String,
    pub joiner: String,
    pub appender: String,
}

impl SequenceRule {
    pub fn new(item: Validator, shape: SequenceShape) -> Self {
        Self {
            item: Box::new(item),
            shape,
            delimiter: " ".to_string(),
            joiner: " ".to_string(),
            appender: String::new(),
        }
    }

    /// Overrides the split delimiter, the output joiner and the terminator.
    pub fn delimited(mut self, delimiter: &str, joiner: &str, appender: &str) -> Self {
        self.delimiter = delimiter.to_string();
        self.joiner = joiner.to_string();
        self.appender = appender.to_string();
        self
    }

    pub(crate) fn check(
        &self,
        owner: &Validator,
        ctx: &ValidationContext<'_>,
        raw: Option<&str>,
        value: String,
    ) -> Result<String, Rejection> {
        let value = WHITESPACE.replace_all(&value, " ").trim().to_string();
        let parts: Vec<&str> = value.split(self.delimiter.as_str()).collect();
        let validated = match &self.shape {
            SequenceShape::Free => self.free(ctx, &parts),
            SequenceShape::Indent => self.indent(ctx, &parts),
            SequenceShape::Complex(slots) => complex(ctx, &parts, slots),
        };
        match validated {
            Ok(items) if !items.is_empty() => {
                let mut joined = items.join(&self.joiner);
                joined.push_str(&self.appender);
                Ok(joined)
            }
            Ok(_) => Err(owner.reject(ctx, raw, &value)),
            Err(Rejection::Invalid) => Err(Rejection::Invalid),
            Err(_) => {
                if ctx.env.verbose && !ctx.quiet {
                    debug!(
                        target: TRACE_TARGET,
                        "{}<{} {}={:?} ~ {}>",
                        Rejection::SequenceInconsistent.marker(),
                        ctx.element,
                        ctx.attribute,
                        value,
                        self.shape.name()
                    );
                }
                Err(owner.reject(ctx, raw, &value))
            }
        }
    }

    fn free(&self, ctx: &ValidationContext<'_>, parts: &[&str]) -> Result<Vec<String>, Rejection> {
        let mut items = Vec::with_capacity(parts.len());
        for part in parts {
            match self.item.validate(ctx, Some(part)) {
                Ok(item) => items.push(item),
                Err(Rejection::AbsentOptional) => {}
                Err(Rejection::Invalid) => return Err(Rejection::Invalid),
                Err(_) => return Err(Rejection::SequenceInconsistent),
            }
        }
        Ok(items)
    }

    fn indent(&self, ctx: &ValidationContext<'_>, parts: &[&str]) -> Result<Vec<String>, Rejection> {
        if !matches!(parts.len(), 1 | 2 | 4) {
            return Err(Rejection::SequenceInconsistent);
        }
        parts
            .iter()
            .map(|part| match self.item.validate(ctx, Some(part)) {
                Ok(item) => Ok(item),
                Err(Rejection::Invalid) => Err(Rejection::Invalid),
                Err(_) => Err(Rejection::SequenceInconsistent),
            })
            .collect()
    }
}

/// Matches `parts` against `slots` in order, skipping slots as needed.
/// Falls back to skipping the current slot when the rest cannot be matched.
fn complex(ctx: &ValidationContext<'_>, parts: &[&str], slots: &[Validator]) -> Result<Vec<String>, Rejection> {
    let Some((part, rest_parts)) = parts.split_first() else {
        return Ok(Vec::new());
    };
    let Some((slot, rest_slots)) = slots.split_first() else {
        return Err(Rejection::SequenceInconsistent);
    };
    let attempt = slot.validate(&ctx.quieted(), Some(part)).and_then(|item| {
        let mut tail = complex(ctx, rest_parts, rest_slots)?;
        tail.insert(0, item);
        Ok(tail)
    });
    match attempt {
        Err(Rejection::Invalid) => Err(Rejection::Invalid),
        Err(_) => complex(ctx, parts, rest_slots),
        matched => matched,
    }
}
