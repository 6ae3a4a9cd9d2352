//! compiler.rs - Compiles and caches sanitization policies.
//!
//! This module converts a `PolicyConfig` into a [`Policy`]: every validator
//! spec becomes a [`Validator`], style tables are built once and shared by
//! every `style` attribute that names them, and element aliases are
//! resolved to their canonical chains. Compiled policies are immutable and
//! kept in a process-wide cache keyed by a hash of the configuration.
//!
//! License: MIT OR APACHE 2.0

use indexmap::IndexMap;
use lazy_static::lazy_static;
use log::{debug, warn};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{KindSpec, PolicyConfig, RuleSetConfig, SequenceSpec, ValidatorSpec};
use crate::engine::{Equivalents, RuleSet, RuleSetChain, Tag};
use crate::errors::TrustedError;
use crate::validators::{
    Kind, ListRule, NumberRule, NumberSettings, NumberShape, SequenceRule, SequenceShape, StyleTable, UrlRule,
    Validator, TRACE_TARGET,
};

/// Renames an element carrying all of `when`, dropping those pairs and appending `add`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    pub when: Vec<(String, String)>,
    pub rename: String,
    pub add: Vec<(String, String)>,
}

impl RewriteRule {
    pub fn matches(&self, tag: &Tag) -> bool {
        self.when.iter().all(|(key, value)| tag.has_pair(key, value))
    }
}

/// The compiled, immutable form of a policy. Shared between threads via `Arc`.
#[derive(Debug)]
pub struct Policy {
    pub elements: HashMap<String, RuleSetChain>,
    /// Alias element name to the canonical element whose chain it uses.
    pub element_aliases: HashMap<String, String>,
    pub equivalents: Equivalents,
    pub rewrites: HashMap<String, Vec<RewriteRule>>,
    pub style_tables: IndexMap<String, Arc<StyleTable>>,
    pub block_elements: HashSet<String>,
    pub default_block: String,
    pub void_elements: HashSet<String>,
    pub keep_empty: HashSet<String>,
    pub keep_nbsp: HashSet<String>,
    pub site_domain: String,
    pub verbose: bool,
}

impl Policy {
    /// The chain for an element, directly or through its alias.
    pub fn chain_for(&self, name: &str) -> Option<&RuleSetChain> {
        self.elements.get(name).or_else(|| {
            self.element_aliases
                .get(name)
                .and_then(|canonical| self.elements.get(canonical))
        })
    }

    pub fn is_whitelisted(&self, name: &str) -> bool {
        self.chain_for(name).is_some()
    }

    /// Applies the first matching rewrite rule. Returns whether the tag was rewritten.
    pub fn rewrite(&self, tag: &mut Tag) -> bool {
        let Some(rule) = self
            .rewrites
            .get(&tag.name)
            .and_then(|rules| rules.iter().find(|rule| rule.matches(tag)))
        else {
            return false;
        };
        if self.verbose {
            debug!(target: TRACE_TARGET, "~rewrite <{} {:?}> as <{}>", tag.name, tag.attributes, rule.rename);
        }
        tag.name = rule.rename.clone();
        tag.attributes
            .retain(|(key, value)| !rule.when.iter().any(|(k, v)| k == key && v == value));
        tag.attributes.extend(rule.add.iter().cloned());
        true
    }
}

lazy_static! {
    /// A thread-safe, global cache for compiled policies.
    /// The key is a hash of the serialized `PolicyConfig`.
    static ref COMPILED_POLICY_CACHE: RwLock<HashMap<String, Arc<Policy>>> = RwLock::new(HashMap::new());
}

/// Hashes the serialized configuration. Map order is part of the key, as it is part of the policy.
fn hash_config(config: &PolicyConfig) -> Result<String, TrustedError> {
    let serialized = serde_json::to_vec(config)
        .map_err(|e| TrustedError::Fatal(format!("Failed to serialize policy for caching: {}", e)))?;
    Ok(hex::encode(Sha256::digest(&serialized)))
}

fn numeric_settings(
    base: NumberSettings,
    allow_sign: Option<bool>,
    garbage_trimming: Option<bool>,
    remove_spaces: Option<bool>,
    case_sensitive: bool,
) -> NumberSettings {
    NumberSettings {
        allow_sign: allow_sign.unwrap_or(base.allow_sign),
        garbage_trimming: garbage_trimming.unwrap_or(base.garbage_trimming),
        remove_spaces: remove_spaces.unwrap_or(base.remove_spaces),
        case_sensitive,
    }
}

/// Builds the validator for a sequence part, or `fallback` when the spec names none.
fn compile_item(
    location: &str,
    item: Option<&ValidatorSpec>,
    fallback: fn() -> Validator,
    tables: &IndexMap<String, Arc<StyleTable>>,
    in_table: bool,
) -> Result<Validator, TrustedError> {
    match item {
        Some(spec) => compile_validator(&format!("{}[item]", location), spec, tables, in_table),
        None => Ok(fallback()),
    }
}

fn delimit(rule: SequenceRule, spec_delimiter: Option<&str>, joiner: Option<&str>, appender: Option<&str>) -> SequenceRule {
    let delimiter = spec_delimiter.unwrap_or(" ").to_string();
    let joiner = joiner.unwrap_or(delimiter.as_str()).to_string();
    rule.delimited(&delimiter, &joiner, appender.unwrap_or(""))
}

fn compile_sequence(
    location: &str,
    sequence: &SequenceSpec,
    shape: SequenceShape,
    fallback: fn() -> Validator,
    tables: &IndexMap<String, Arc<StyleTable>>,
    in_table: bool,
) -> Result<Kind, TrustedError> {
    let item = compile_item(location, sequence.item.as_deref(), fallback, tables, in_table)?;
    let rule = delimit(
        SequenceRule::new(item, shape),
        sequence.delimiter.as_deref(),
        sequence.joiner.as_deref(),
        sequence.appender.as_deref(),
    );
    Ok(Kind::Sequence(rule))
}

/// Compiles one validator spec. `in_table` is set while building style tables, where
/// nested `style` validators are not allowed.
pub fn compile_validator(
    location: &str,
    spec: &ValidatorSpec,
    tables: &IndexMap<String, Arc<StyleTable>>,
    in_table: bool,
) -> Result<Validator, TrustedError> {
    let pattern_error = |e: regex::Error| TrustedError::PatternCompilation(location.to_string(), e);
    let case_sensitive = spec.case_sensitive;

    let mut validator = match &spec.kind {
        KindSpec::Text => Validator::text(),
        KindSpec::Content => Validator::content(),
        KindSpec::Char => Validator::char(),
        KindSpec::Color => Validator::color(),
        KindSpec::List(list) => Validator::new(Kind::List(ListRule::new(
            list.values.iter().cloned(),
            case_sensitive,
            list.return_defined,
        ))),
        KindSpec::Url(url) => Validator::new(Kind::Url(UrlRule::new(url.local_only, url.allow_local, url.allow_anchor))),
        KindSpec::Number(numeric) | KindSpec::Length(numeric) | KindSpec::Size(numeric) => {
            let (shape, base) = match &spec.kind {
                KindSpec::Number(_) => (NumberShape::Number, NumberSettings::default()),
                KindSpec::Length(_) => (NumberShape::Length, NumberSettings::default()),
                _ => (NumberShape::Size, NumberSettings::size()),
            };
            let settings = numeric_settings(
                base,
                numeric.allow_sign,
                numeric.garbage_trimming,
                numeric.remove_spaces,
                case_sensitive,
            );
            let rule = NumberRule::new(shape, settings).map_err(pattern_error)?;
            Validator::new(Kind::Number(rule))
        }
        KindSpec::Regexp(regexp) => {
            let settings = numeric_settings(
                NumberSettings::default(),
                None,
                regexp.garbage_trimming,
                regexp.remove_spaces,
                case_sensitive,
            );
            let rule = NumberRule::from_pattern(&regexp.pattern, settings).map_err(pattern_error)?;
            Validator::new(Kind::Number(rule))
        }
        KindSpec::ListOrSize(list) => {
            let settings = numeric_settings(
                NumberSettings::size(),
                list.allow_sign,
                list.garbage_trimming,
                None,
                case_sensitive,
            );
            let size = NumberRule::new(NumberShape::Size, settings).map_err(pattern_error)?;
            Validator::new(Kind::ListOrNumber(
                ListRule::new(list.values.iter().cloned(), case_sensitive, true),
                size,
            ))
        }
        KindSpec::Sequence(sequence) => Validator::new(compile_sequence(
            location,
            sequence,
            SequenceShape::Free,
            Validator::text,
            tables,
            in_table,
        )?),
        KindSpec::Indent(sequence) => Validator::new(compile_sequence(
            location,
            sequence,
            SequenceShape::Indent,
            Validator::size,
            tables,
            in_table,
        )?),
        KindSpec::Complex(complex) => {
            let slots = complex
                .slots
                .iter()
                .enumerate()
                .map(|(index, slot)| compile_validator(&format!("{}[{}]", location, index), slot, tables, in_table))
                .collect::<Result<Vec<_>, _>>()?;
            let rule = delimit(
                SequenceRule::new(Validator::text(), SequenceShape::Complex(slots)),
                complex.delimiter.as_deref(),
                complex.joiner.as_deref(),
                None,
            );
            Validator::new(Kind::Sequence(rule))
        }
        KindSpec::Style(style) => {
            if in_table {
                return Err(TrustedError::InvalidPolicy(format!(
                    "Validator '{}' nests a style table inside a style table.",
                    location
                )));
            }
            let table = tables.get(&style.table).ok_or_else(|| {
                TrustedError::InvalidPolicy(format!(
                    "Validator '{}' references unknown style table '{}'.",
                    location, style.table
                ))
            })?;
            Validator::style(Arc::clone(table))
        }
    };

    if spec.required {
        validator = validator.required();
    }
    if let Some(default) = &spec.default {
        validator = validator.with_default(default.clone());
    }
    if spec.invalid {
        validator = validator.always_invalid();
    }
    if let Some(strip) = spec.strip {
        validator = validator.strip(strip);
    }
    if let Some(allow_empty) = spec.allow_empty {
        validator = validator.allow_empty(allow_empty);
    }
    Ok(validator)
}

fn compile_chain(
    owner: &str,
    chain: &[RuleSetConfig],
    tables: &IndexMap<String, Arc<StyleTable>>,
    in_table: bool,
    errors: &mut Vec<TrustedError>,
) -> RuleSetChain {
    chain
        .iter()
        .map(|rule_set| {
            rule_set
                .iter()
                .filter_map(|(attribute, spec)| {
                    compile_validator(&format!("{}.{}", owner, attribute), spec, tables, in_table)
                        .map_err(|e| errors.push(e))
                        .ok()
                        .map(|validator| (attribute.clone(), validator))
                })
                .collect::<RuleSet>()
        })
        .collect()
}

fn name_set(names: Vec<String>) -> HashSet<String> {
    names.into_iter().collect()
}

/// Compiles a policy configuration. All errors are collected before failing.
pub fn compile_policy(config: &PolicyConfig) -> Result<Policy, TrustedError> {
    debug!(
        "Starting compilation of a policy with {} element(s) and {} style table(s).",
        config.elements.len(),
        config.style_tables.len()
    );
    let mut errors = Vec::new();

    let no_tables = IndexMap::new();
    let mut style_tables = IndexMap::new();
    for (name, table_config) in &config.style_tables {
        let mut table = StyleTable::new(name.clone());
        for (property, chain) in &table_config.properties {
            let compiled = compile_chain(&format!("{}:{}", name, property), chain, &no_tables, true, &mut errors);
            table.properties.insert(property.clone(), compiled);
        }
        for (property, aliases) in &table_config.aliases {
            table.equivalents.insert(property.clone(), aliases.iter().cloned());
        }
        debug!("Style table '{}' compiled with {} properties.", name, table.properties.len());
        style_tables.insert(name.clone(), Arc::new(table));
    }

    let mut elements = HashMap::new();
    for (name, chain) in &config.elements {
        let compiled = compile_chain(name, chain, &style_tables, false, &mut errors);
        elements.insert(name.clone(), compiled);
    }

    let mut element_aliases = HashMap::new();
    for (canonical, aliases) in &config.element_aliases {
        if !elements.contains_key(canonical) {
            errors.push(TrustedError::InvalidPolicy(format!(
                "Element aliases point at '{}', which has no rules.",
                canonical
            )));
            continue;
        }
        for alias in aliases {
            if elements.contains_key(alias) {
                warn!("Element '{}' has its own rules; ignoring its alias to '{}'.", alias, canonical);
                continue;
            }
            element_aliases.insert(alias.clone(), canonical.clone());
        }
    }

    let mut equivalents = Equivalents::new();
    for (canonical, aliases) in &config.attribute_aliases {
        equivalents.insert(canonical.clone(), aliases.iter().cloned());
    }

    let rewrites = config
        .rewrites
        .iter()
        .map(|(name, rules)| {
            let compiled = rules
                .iter()
                .map(|rule| RewriteRule {
                    when: rule.when.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    rename: rule.rename.clone(),
                    add: rule.add.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                })
                .collect();
            (name.clone(), compiled)
        })
        .collect();

    let default_block = config.default_block();
    if !elements.contains_key(&default_block) && !element_aliases.contains_key(&default_block) {
        errors.push(TrustedError::InvalidPolicy(format!(
            "Default block element '{}' is not whitelisted.",
            default_block
        )));
    }

    if !errors.is_empty() {
        if errors.len() == 1 {
            return Err(errors.remove(0));
        }
        let error_message = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<String>>()
            .join("\n");
        return Err(TrustedError::Fatal(format!(
            "Failed to compile policy, {} error(s):\n{}",
            errors.len(),
            error_message
        )));
    }

    debug!("Finished compiling policy. Total elements: {}.", elements.len());
    Ok(Policy {
        elements,
        element_aliases,
        equivalents,
        rewrites,
        style_tables,
        block_elements: name_set(config.block_elements()),
        default_block,
        void_elements: name_set(config.void_elements()),
        keep_empty: name_set(config.keep_empty()),
        keep_nbsp: name_set(config.keep_nbsp()),
        site_domain: config.site_domain(),
        verbose: config.verbose(),
    })
}

/// Gets a compiled policy from the cache, compiling it on first use.
///
/// Entries live for the whole process and are never evicted. The cache grows by one
/// entry per distinct configuration, so callers that build policies per request should
/// call [`compile_policy`] directly and keep the `Arc<Policy>` themselves.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use trustedhtml_core::{get_or_compile_policy, PolicyConfig};
///
/// let config = PolicyConfig::load_default_policy().unwrap();
/// let first = get_or_compile_policy(&config).unwrap();
/// let again = get_or_compile_policy(&config).unwrap();
/// assert!(Arc::ptr_eq(&first, &again));
/// ```
pub fn get_or_compile_policy(config: &PolicyConfig) -> Result<Arc<Policy>, TrustedError> {
    let cache_key = hash_config(config)?;

    {
        let cache = COMPILED_POLICY_CACHE.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(policy) = cache.get(&cache_key) {
            debug!("Serving compiled policy from cache for key: {}", &cache_key);
            return Ok(Arc::clone(policy));
        }
    }

    debug!("Compiled policy not found in cache. Compiling now.");
    let compiled = Arc::new(compile_policy(config)?);
    COMPILED_POLICY_CACHE
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(cache_key.clone(), Arc::clone(&compiled));

    debug!("Successfully compiled and cached policy for key: {}", &cache_key);
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RewriteConfig, StyleSpec};
    use crate::validators::Rejection;
    use test_log::test;

    fn policy(yaml: &str) -> Result<Policy, TrustedError> {
        let config: PolicyConfig = serde_yml::from_str(yaml).expect("test policy parses");
        compile_policy(&config)
    }

    #[test]
    fn test_default_policy_compiles() {
        let config = PolicyConfig::load_default_policy().unwrap();
        let policy = compile_policy(&config).unwrap();
        assert!(policy.is_whitelisted("p"));
        assert!(policy.is_whitelisted("h3"));
        assert!(!policy.is_whitelisted("script"));
        assert!(policy.style_tables.contains_key("common"));
        assert_eq!(policy.default_block, "p");
    }

    #[test]
    fn test_aliases_share_the_canonical_chain() {
        let policy = policy(
            r#"
elements:
  p: []
  h1:
    - title: { type: text }
element_aliases:
  h1: [h2, h3]
"#,
        )
        .unwrap();
        assert_eq!(policy.chain_for("h3").map(Vec::len), Some(1));
        assert!(policy.chain_for("h4").is_none());
    }

    #[test]
    fn test_regexp_errors_are_pattern_compilation_errors() {
        let err = policy(
            r#"
elements:
  p:
    - class: { type: regexp, pattern: "[a-" }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, TrustedError::PatternCompilation(ref location, _) if location == "p.class"));
    }

    #[test]
    fn test_unknown_style_table_and_missing_default_block_are_reported_together() {
        let err = policy(
            r#"
default_block: section
elements:
  span:
    - style: { type: style, table: nope }
"#,
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, TrustedError::Fatal(_)));
        assert!(message.contains("unknown style table 'nope'"));
        assert!(message.contains("'section' is not whitelisted"));
    }

    #[test]
    fn test_style_tables_cannot_nest() {
        let mut config = PolicyConfig::default();
        let mut table = crate::config::StyleTableConfig::default();
        let mut rule_set = RuleSetConfig::new();
        rule_set.insert(
            "x".to_string(),
            ValidatorSpec::new(KindSpec::Style(StyleSpec { table: "t".to_string() })),
        );
        table.properties.insert("x".to_string(), vec![rule_set]);
        config.style_tables.insert("t".to_string(), table);
        config.elements.insert("p".to_string(), Vec::new());
        assert!(matches!(compile_policy(&config), Err(TrustedError::InvalidPolicy(_))));
    }

    #[test]
    fn test_options_are_applied_to_compiled_validators() {
        let policy = policy(
            r#"
elements:
  p:
    - dir: { type: list, values: [ltr, rtl], default: "ltr" }
      width: { type: size, garbage_trimming: false }
      lowsrc: { type: url, invalid: true }
"#,
        )
        .unwrap();
        let rule_set = &policy.chain_for("p").unwrap()[0];
        assert_eq!(rule_set["dir"].check_value("up"), Ok("ltr".to_string()));
        assert_eq!(rule_set["width"].check_value("10px"), Ok("10px".to_string()));
        assert_eq!(rule_set["width"].check_value("10px;junk"), Err(Rejection::AbsentOptional));
        assert_eq!(rule_set["lowsrc"].check_value("http://x.org/a.png"), Err(Rejection::Invalid));
    }

    #[test]
    fn test_rewrite_renames_and_replaces_matched_pairs() {
        let mut config: PolicyConfig = serde_yml::from_str("elements:\n  p: []\n  u: []\n").unwrap();
        config.rewrites.insert(
            "span".to_string(),
            vec![RewriteConfig {
                when: [("style".to_string(), "text-decoration: underline;".to_string())]
                    .into_iter()
                    .collect(),
                rename: "u".to_string(),
                add: [("title".to_string(), "u".to_string())].into_iter().collect(),
            }],
        );
        let policy = compile_policy(&config).unwrap();

        let mut tag = Tag::new(
            "span",
            vec![
                ("lang".to_string(), "en".to_string()),
                ("style".to_string(), "text-decoration: underline;".to_string()),
            ],
        );
        assert!(policy.rewrite(&mut tag));
        assert_eq!(tag.name, "u");
        assert_eq!(
            tag.attributes,
            vec![("lang".to_string(), "en".to_string()), ("title".to_string(), "u".to_string())]
        );

        let mut plain = Tag::new("span", Vec::new());
        assert!(!policy.rewrite(&mut plain));
        assert_eq!(plain.name, "span");
    }

    #[test]
    fn test_cache_returns_the_same_policy_for_equal_configs() {
        let config = PolicyConfig::load_default_policy().unwrap();
        let first = get_or_compile_policy(&config).unwrap();
        let second = get_or_compile_policy(&config.clone()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let mut other = config;
        other.site.domain = Some("cache-test.example".to_string());
        let third = get_or_compile_policy(&other).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.site_domain, "cache-test.example");
    }
}
