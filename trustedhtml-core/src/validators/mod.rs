//! validators - Typed value validators for attributes and CSS properties.
//!
//! A [`Validator`] takes the raw value of one attribute (or one CSS property)
//! and either returns the normalized value or a [`Rejection`] naming why it
//! was refused. Every validator runs the same pipeline:
//!
//! 1. **prepare**: reject a missing value (or an empty one when empty values
//!    are not allowed), optionally trim whitespace;
//! 2. **core**: the kind-specific check (list lookup, numeric grammar, URL
//!    classification, nested sequences, CSS declarations);
//! 3. **invalid**: a validator flagged as always-invalid computes its value
//!    and then refuses it, which retires deprecated attributes while still
//!    tracing what was attempted.
//!
//! Which rejection a failed check produces is decided by the validator's
//! [`Requirement`], so callers can tell "drop this attribute" apart from
//! "this rule set does not apply" and "this tag is hostile".
//!
//! License: MIT OR APACHE 2.0

pub mod numeric;
pub mod sequence;
pub mod style;
pub mod url;

pub use numeric::{NumberRule, NumberSettings, NumberShape, COLOR_NAMES, SIZE_UNITS};
pub use sequence::{SequenceRule, SequenceShape};
pub use style::{StyleRule, StyleTable};
pub use url::{iri_to_uri, UrlRule, SCHEMES};

use crate::audit::{AuditEvent, AuditSink, NullAuditSink};
use crate::origin::{SiteOrigin, StaticOrigin};
use log::debug;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;

/// Log target for per-decision tracing, enabled by the policy's `verbose` flag.
pub const TRACE_TARGET: &str = "trustedhtml_core::trace";

/// How a validator treats a value it cannot accept.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Requirement {
    /// Failure makes the whole rule set inapplicable.
    Required,
    /// Failure silently drops the attribute.
    #[default]
    Optional,
    /// Failure substitutes this value.
    Default(String),
}

impl Requirement {
    pub fn default_value(&self) -> Option<&str> {
        match self {
            Requirement::Default(value) => Some(value),
            _ => None,
        }
    }
}

/// Why a value was not accepted. Exactly one reason per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingRequired,
    /// Structurally invalid: the whole tag must be refused, no fallback.
    Invalid,
    AbsentOptional,
    /// Only seen inside the pipeline; [`Validator::validate`] turns it into the default value.
    DefaultApplied,
    SequenceInconsistent,
}

impl Rejection {
    /// Single-character marker used in trace lines.
    pub fn marker(&self) -> char {
        match self {
            Rejection::MissingRequired => '!',
            Rejection::Invalid => '$',
            Rejection::AbsentOptional => '-',
            Rejection::DefaultApplied => '+',
            Rejection::SequenceInconsistent => '~',
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Rejection::MissingRequired => "missing required value",
            Rejection::Invalid => "structurally invalid value",
            Rejection::AbsentOptional => "absent optional value",
            Rejection::DefaultApplied => "default value applied",
            Rejection::SequenceInconsistent => "inconsistent sequence",
        };
        f.write_str(text)
    }
}

/// Collaborators every validation can reach: site identity, audit sink, tracing switch.
#[derive(Clone, Copy)]
pub struct Environment<'a> {
    pub site: &'a dyn SiteOrigin,
    pub audit: &'a dyn AuditSink,
    pub verbose: bool,
}

static DETACHED_ORIGIN: Lazy<StaticOrigin> = Lazy::new(|| StaticOrigin::new("localhost"));
static DETACHED_AUDIT: NullAuditSink = NullAuditSink;

impl<'a> Environment<'a> {
    pub fn new(site: &'a dyn SiteOrigin, audit: &'a dyn AuditSink, verbose: bool) -> Self {
        Self { site, audit, verbose }
    }
}

impl Environment<'static> {
    /// A `localhost` origin with a discarding audit sink.
    pub fn detached() -> Self {
        Environment {
            site: &*DETACHED_ORIGIN,
            audit: &DETACHED_AUDIT,
            verbose: false,
        }
    }
}

impl fmt::Debug for Environment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("site", &self.site.domain())
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

/// Where a value came from. Validators never see more than this.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub element: &'a str,
    pub attribute: &'a str,
    /// Quiet validations neither trace nor audit.
    pub quiet: bool,
    pub env: &'a Environment<'a>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(element: &'a str, attribute: &'a str, env: &'a Environment<'a>) -> Self {
        Self { element, attribute, quiet: false, env }
    }

    pub fn quieted(self) -> Self {
        Self { quiet: true, ..self }
    }
}

/// Options shared by all validator kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub requirement: Requirement,
    pub strip: bool,
    pub allow_empty: bool,
    /// Always reject as [`Rejection::Invalid`] once the value was computed.
    pub invalid: bool,
}

/// Case-folding vocabulary lookup shared by list-like kinds.
#[derive(Debug, Clone)]
pub struct ListRule {
    defined: Vec<String>,
    folded: Vec<String>,
    case_sensitive: bool,
    return_defined: bool,
}

impl ListRule {
    pub fn new<I, S>(values: I, case_sensitive: bool, return_defined: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let defined: Vec<String> = values.into_iter().map(Into::into).collect();
        let folded = defined.iter().map(|v| v.to_lowercase()).collect();
        Self { defined, folded, case_sensitive, return_defined }
    }

    /// Returns the accepted spelling, or `None` when the value is not a member.
    pub fn lookup(&self, value: &str) -> Option<String> {
        if self.case_sensitive {
            return self.defined.iter().find(|v| *v == value).cloned();
        }
        let lowered = value.to_lowercase();
        let index = self.folded.iter().position(|v| *v == lowered)?;
        Some(if self.return_defined {
            self.defined[index].clone()
        } else {
            value.to_string()
        })
    }
}

/// Kind-specific part of a validator.
#[derive(Debug, Clone)]
pub enum Kind {
    Text,
    Char,
    List(ListRule),
    Url(UrlRule),
    Number(NumberRule),
    /// Vocabulary first, then a numeric grammar (colors, `auto`-or-size values).
    ListOrNumber(ListRule, NumberRule),
    Sequence(SequenceRule),
    Style(StyleRule),
}

impl Kind {
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Text => "text",
            Kind::Char => "char",
            Kind::List(_) => "list",
            Kind::Url(_) => "url",
            Kind::Number(_) => "number",
            Kind::ListOrNumber(..) => "list_or_number",
            Kind::Sequence(rule) => rule.shape.name(),
            Kind::Style(_) => "style",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Validator {
    pub options: Options,
    pub kind: Kind,
}

impl Validator {
    /// Builds a validator with the default options for its kind.
    pub fn new(kind: Kind) -> Self {
        let allow_empty = matches!(kind, Kind::Text | Kind::Char | Kind::List(_));
        Self {
            options: Options {
                requirement: Requirement::Optional,
                strip: true,
                allow_empty,
                invalid: false,
            },
            kind,
        }
    }

    /// Accepts any value, including an empty one.
    pub fn text() -> Self {
        Self::new(Kind::Text)
    }

    /// Like [`Validator::text`] but refuses empty values.
    pub fn content() -> Self {
        Self::new(Kind::Text).allow_empty(false)
    }

    /// Accepts exactly one character.
    pub fn char() -> Self {
        Self::new(Kind::Char)
    }

    /// Accepts a member of a fixed vocabulary, compared case-insensitively.
    /// The member is returned as configured, not as written in the markup.
    ///
    /// # Arguments
    ///
    /// * `values` - The vocabulary.
    pub fn list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Kind::List(ListRule::new(values, false, true)))
    }

    /// Accepts absolute URLs with a whitelisted scheme and keeps `/path` references.
    /// Bare values become `http://` URLs. See [`UrlRule`] for the other modes.
    pub fn url() -> Self {
        Self::new(Kind::Url(UrlRule::default()))
    }

    /// Accepts a signed integer of up to seven digits, dropping trailing garbage.
    pub fn number() -> Self {
        Self::new(Kind::Number(NumberRule::fixed(NumberShape::Number, NumberSettings::default())))
    }

    /// A number with an optional `%`.
    pub fn length() -> Self {
        Self::new(Kind::Number(NumberRule::fixed(NumberShape::Length, NumberSettings::default())))
    }

    /// A number with an optional CSS unit from [`SIZE_UNITS`]. Inner whitespace is removed first.
    pub fn size() -> Self {
        Self::new(Kind::Number(NumberRule::fixed(NumberShape::Size, NumberSettings::size())))
    }

    /// Accepts the prefix of the value matched by `pattern`.
    ///
    /// # Arguments
    ///
    /// * `pattern` - The regular expression. It is anchored at the start.
    ///
    /// # Returns
    ///
    /// The validator, or the compilation error for a malformed pattern.
    pub fn regexp(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::new(Kind::Number(NumberRule::from_pattern(pattern, NumberSettings::default())?)))
    }

    /// A named color, else `#rgb`, `#rrggbb` or an `rgb()`/`hsl()` family value.
    pub fn color() -> Self {
        Self::new(Kind::ListOrNumber(
            ListRule::new(COLOR_NAMES.iter().copied(), false, true),
            NumberRule::fixed(NumberShape::Color, NumberSettings::color()),
        ))
    }

    /// A vocabulary (`auto`, `inherit`, ...) falling back to a size.
    pub fn list_or_size<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Kind::ListOrNumber(
            ListRule::new(values, false, true),
            NumberRule::fixed(NumberShape::Size, NumberSettings::size()),
        ))
    }

    /// Splits on whitespace, validates every part with `item` and rejoins the survivors.
    pub fn sequence(item: Validator) -> Self {
        Self::new(Kind::Sequence(SequenceRule::new(item, SequenceShape::Free)))
    }

    /// One, two or four sizes, as in `margin` and `padding`.
    pub fn indent() -> Self {
        Self::new(Kind::Sequence(SequenceRule::new(Validator::size(), SequenceShape::Indent)))
    }

    /// Matches parts against ordered, skippable slots, as in the `border` shorthand.
    ///
    /// # Arguments
    ///
    /// * `slots` - One validator per position, tried in order.
    pub fn complex(slots: Vec<Validator>) -> Self {
        Self::new(Kind::Sequence(SequenceRule::new(Validator::text(), SequenceShape::Complex(slots))))
    }

    /// Filters a `style` attribute against the properties of `table`.
    pub fn style(table: Arc<StyleTable>) -> Self {
        Self::new(Kind::Style(StyleRule::new(table)))
    }

    /// A missing or rejected value fails the whole rule set.
    pub fn required(mut self) -> Self {
        self.options.requirement = Requirement::Required;
        self
    }

    /// A missing or rejected value is replaced by `value`.
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.options.requirement = Requirement::Default(value.into());
        self
    }

    /// Refuses every value as invalid, after computing it for the trace.
    pub fn always_invalid(mut self) -> Self {
        self.options.invalid = true;
        self
    }

    /// Whether surrounding whitespace is trimmed before validation. On by default.
    pub fn strip(mut self, strip: bool) -> Self {
        self.options.strip = strip;
        self
    }

    /// Whether an empty value counts as present.
    pub fn allow_empty(mut self, allow_empty: bool) -> Self {
        self.options.allow_empty = allow_empty;
        self
    }

    /// Runs the full pipeline for one raw value.
    pub fn validate(&self, ctx: &ValidationContext<'_>, raw: Option<&str>) -> Result<String, Rejection> {
        let value = match self.prepare(ctx, raw).and_then(|value| self.core(ctx, raw, value)) {
            Ok(value) => value,
            Err(Rejection::DefaultApplied) => {
                self.options.requirement.default_value().unwrap_or_default().to_string()
            }
            Err(rejection) => return Err(rejection),
        };
        if self.options.invalid {
            return Err(self.report(ctx, raw, &value, Rejection::Invalid));
        }
        Ok(value)
    }

    /// Validates a bare value outside any document, with a detached environment.
    pub fn check_value(&self, raw: &str) -> Result<String, Rejection> {
        let env = Environment::detached();
        let ctx = ValidationContext::new("value", "value", &env).quieted();
        self.validate(&ctx, Some(raw))
    }

    fn prepare(&self, ctx: &ValidationContext<'_>, raw: Option<&str>) -> Result<String, Rejection> {
        let Some(value) = raw else {
            return Err(self.reject(ctx, raw, ""));
        };
        if value.is_empty() && !self.options.allow_empty {
            return Err(self.reject(ctx, raw, value));
        }
        Ok(if self.options.strip {
            value.trim().to_string()
        } else {
            value.to_string()
        })
    }

    fn core(&self, ctx: &ValidationContext<'_>, raw: Option<&str>, value: String) -> Result<String, Rejection> {
        match &self.kind {
            Kind::Text => Ok(value),
            Kind::Char => {
                if value.chars().count() == 1 {
                    Ok(value)
                } else {
                    Err(self.reject(ctx, raw, &value))
                }
            }
            Kind::List(list) => list.lookup(&value).ok_or_else(|| self.reject(ctx, raw, &value)),
            Kind::Url(rule) => rule.check(self, ctx, raw, value),
            Kind::Number(rule) => rule.matched(&value).ok_or_else(|| self.reject(ctx, raw, &value)),
            Kind::ListOrNumber(list, rule) => list
                .lookup(&value)
                .or_else(|| rule.matched(&value))
                .ok_or_else(|| self.reject(ctx, raw, &value)),
            Kind::Sequence(rule) => rule.check(self, ctx, raw, value),
            Kind::Style(rule) => rule.check(self, ctx, raw, value),
        }
    }

    /// Maps a failed check to the rejection this validator's requirement calls for.
    pub(crate) fn reject(&self, ctx: &ValidationContext<'_>, raw: Option<&str>, value: &str) -> Rejection {
        let rejection = match self.options.requirement {
            Requirement::Required => Rejection::MissingRequired,
            Requirement::Optional => Rejection::AbsentOptional,
            Requirement::Default(_) => Rejection::DefaultApplied,
        };
        self.report(ctx, raw, value, rejection)
    }

    /// Traces a decision and sends structurally invalid ones to the audit sink.
    pub(crate) fn report(
        &self,
        ctx: &ValidationContext<'_>,
        raw: Option<&str>,
        value: &str,
        rejection: Rejection,
    ) -> Rejection {
        if ctx.quiet || (rejection == Rejection::AbsentOptional && raw.is_none()) {
            return rejection;
        }
        let line = format!(
            "<{} {}={:?} : {:?} ~ {}>",
            ctx.element,
            ctx.attribute,
            raw.unwrap_or_default(),
            value,
            self.kind.name()
        );
        if ctx.env.verbose {
            debug!(target: TRACE_TARGET, "{}{}", rejection.marker(), line);
        }
        if rejection == Rejection::Invalid {
            ctx.env
                .audit
                .record(&AuditEvent::new(false, line, raw.unwrap_or_default(), value));
        }
        rejection
    }
}
