//! Policy configuration for `trustedhtml-core`.
//!
//! A policy says which elements survive sanitization, which attributes they
//! may carry and how each attribute value is validated. Policies are YAML
//! documents; a complete default policy is embedded in the library and user
//! policies are merged over it.
//!
//! ```yaml
//! elements:
//!   a:
//!     - href: { type: url, required: true }
//!       title: { type: text }
//!     - name: { type: content, required: true }
//!   br: []
//! element_aliases:
//!   b: [strong, em]
//! ```
//!
//! An element maps to a chain of rule sets tried in order; an empty chain
//! keeps the element and strips all of its attributes.
//!
//! License: MIT OR APACHE 2.0

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::dom::VOID_ELEMENTS;

/// Block elements stray inline content is never wrapped around.
pub const DEFAULT_BLOCK_ELEMENTS: [&str; 17] = [
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "div", "address", "fieldset", "ins", "del", "ul", "ol",
    "blockquote", "table", "pre",
];
/// Element stray inline content is wrapped into.
pub const DEFAULT_BLOCK: &str = "p";
/// Elements never collapsed, even when empty.
pub const DEFAULT_KEEP_EMPTY: [&str; 4] = ["td", "th", "caption", "a"];
/// Elements in which a lone no-break space survives collapsing.
pub const DEFAULT_KEEP_NBSP: [&str; 2] = ["td", "th"];
pub const DEFAULT_SITE_DOMAIN: &str = "localhost";

/// A rule set as written in YAML: attribute name to validator.
pub type RuleSetConfig = IndexMap<String, ValidatorSpec>;

/// Numeric grammar switches. Unset fields keep the grammar's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct NumericSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_sign: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub garbage_trimming: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_spaces: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RegexpSpec {
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub garbage_trimming: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_spaces: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ListSpec {
    pub values: Vec<String>,
    #[serde(default = "default_true")]
    pub return_defined: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ListOrSizeSpec {
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_sign: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub garbage_trimming: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UrlSpec {
    #[serde(default)]
    pub local_only: bool,
    /// Keep `/path` references as they are. On unless turned off.
    #[serde(default = "default_true")]
    pub allow_local: bool,
    #[serde(default)]
    pub allow_anchor: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SequenceSpec {
    /// Validator applied to every part. Defaults to text for sequences, size for indents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<Box<ValidatorSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joiner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appender: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ComplexSpec {
    pub slots: Vec<ValidatorSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joiner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StyleSpec {
    /// Name of an entry in `style_tables`.
    pub table: String,
}

/// The validator kinds a policy can use, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KindSpec {
    Text,
    Content,
    Char,
    List(ListSpec),
    Url(UrlSpec),
    Number(NumericSpec),
    Length(NumericSpec),
    Size(NumericSpec),
    Regexp(RegexpSpec),
    Color,
    ListOrSize(ListOrSizeSpec),
    Sequence(SequenceSpec),
    Indent(SequenceSpec),
    Complex(ComplexSpec),
    Style(StyleSpec),
}

/// One validator as written in YAML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ValidatorSpec {
    #[serde(flatten)]
    pub kind: KindSpec,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    /// Value substituted when the attribute is missing or rejected. Always a string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Always refuse as structurally invalid (retired attributes).
    #[serde(default, skip_serializing_if = "is_false")]
    pub invalid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_empty: Option<bool>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub case_sensitive: bool,
}

impl ValidatorSpec {
    pub fn new(kind: KindSpec) -> Self {
        Self {
            kind,
            required: false,
            default: None,
            invalid: false,
            strip: None,
            allow_empty: None,
            case_sensitive: false,
        }
    }
}

/// Renames an element when all `when` pairs are present on it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RewriteConfig {
    #[serde(default)]
    pub when: IndexMap<String, String>,
    pub rename: String,
    #[serde(default)]
    pub add: IndexMap<String, String>,
}

/// A named set of CSS properties for `style` validators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StyleTableConfig {
    /// Property name to properties validated with its chain.
    #[serde(default)]
    pub aliases: IndexMap<String, Vec<String>>,
    #[serde(default)]
    pub properties: IndexMap<String, Vec<RuleSetConfig>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SiteConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// A whole sanitization policy. Unset scalar and list settings fall back to built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub site: SiteConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_elements: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_block: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub void_elements: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_empty: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_nbsp: Option<Vec<String>>,
    /// Canonical element to elements sharing its chain.
    pub element_aliases: IndexMap<String, Vec<String>>,
    /// Canonical attribute to attributes validated with its validator.
    pub attribute_aliases: IndexMap<String, Vec<String>>,
    pub rewrites: IndexMap<String, Vec<RewriteConfig>>,
    pub style_tables: IndexMap<String, StyleTableConfig>,
    pub elements: IndexMap<String, Vec<RuleSetConfig>>,
}

fn default_true() -> bool {
    true
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl PolicyConfig {
    /// Loads a policy from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading policy from: {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read policy file {}", path.display()))?;
        let config: PolicyConfig = serde_yml::from_str(&text)
            .with_context(|| format!("Failed to parse policy file {}", path.display()))?;

        validate_policy(&config)?;
        info!("Loaded {} element(s) from policy file {}.", config.elements.len(), path.display());
        Ok(config)
    }

    /// Loads the policy embedded in the library.
    pub fn load_default_policy() -> Result<Self> {
        debug!("Loading default policy from embedded string...");
        let default_yaml = include_str!("../config/default_policy.yaml");
        let config: PolicyConfig =
            serde_yml::from_str(default_yaml).context("Failed to parse default policy")?;

        debug!("Loaded {} default element(s).", config.elements.len());
        Ok(config)
    }

    /// Removes elements (and aliases to them) from the whitelist.
    pub fn deny_elements(&mut self, names: &[String]) {
        let deny: HashSet<&str> = names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()).collect();
        let known: HashSet<&str> = self
            .elements
            .keys()
            .map(String::as_str)
            .chain(self.element_aliases.values().flatten().map(String::as_str))
            .collect();
        for name in deny.difference(&known) {
            warn!("Element '{}' in the deny list is not whitelisted.", name);
        }

        self.elements.retain(|name, _| !deny.contains(name.as_str()));
        self.element_aliases.retain(|canonical, _| !deny.contains(canonical.as_str()));
        for aliases in self.element_aliases.values_mut() {
            aliases.retain(|alias| !deny.contains(alias.as_str()));
        }
        debug!("Whitelist has {} element(s) after denying {:?}.", self.elements.len(), deny);
    }

    pub fn site_domain(&self) -> String {
        self.site.domain.clone().unwrap_or_else(|| DEFAULT_SITE_DOMAIN.to_string())
    }

    pub fn verbose(&self) -> bool {
        self.verbose.unwrap_or(false)
    }

    pub fn block_elements(&self) -> Vec<String> {
        self.block_elements.clone().unwrap_or_else(|| owned(&DEFAULT_BLOCK_ELEMENTS))
    }

    pub fn default_block(&self) -> String {
        self.default_block.clone().unwrap_or_else(|| DEFAULT_BLOCK.to_string())
    }

    pub fn void_elements(&self) -> Vec<String> {
        self.void_elements.clone().unwrap_or_else(|| owned(&VOID_ELEMENTS))
    }

    pub fn keep_empty(&self) -> Vec<String> {
        self.keep_empty.clone().unwrap_or_else(|| owned(&DEFAULT_KEEP_EMPTY))
    }

    pub fn keep_nbsp(&self) -> Vec<String> {
        self.keep_nbsp.clone().unwrap_or_else(|| owned(&DEFAULT_KEEP_NBSP))
    }
}

/// Merges a user policy over the defaults. Map entries replace defaults by key; settings the
/// user left unset keep their default values.
pub fn merge_policies(default_config: PolicyConfig, user_config: Option<PolicyConfig>) -> PolicyConfig {
    let Some(user) = user_config else {
        return default_config;
    };
    debug!(
        "Merging user policy ({} elements) over defaults ({} elements).",
        user.elements.len(),
        default_config.elements.len()
    );
    let mut merged = default_config;

    if user.site.domain.is_some() {
        merged.site.domain = user.site.domain;
    }
    merged.verbose = user.verbose.or(merged.verbose);
    merged.block_elements = user.block_elements.or(merged.block_elements);
    merged.default_block = user.default_block.or(merged.default_block);
    merged.void_elements = user.void_elements.or(merged.void_elements);
    merged.keep_empty = user.keep_empty.or(merged.keep_empty);
    merged.keep_nbsp = user.keep_nbsp.or(merged.keep_nbsp);

    merged.element_aliases.extend(user.element_aliases);
    merged.attribute_aliases.extend(user.attribute_aliases);
    merged.rewrites.extend(user.rewrites);
    merged.style_tables.extend(user.style_tables);
    merged.elements.extend(user.elements);

    debug!("Merged policy has {} element(s).", merged.elements.len());
    merged
}

fn check_name(kind: &str, name: &str, errors: &mut Vec<String>) {
    if name.is_empty() {
        errors.push(format!("A {} has an empty name.", kind));
    } else if name.chars().any(char::is_whitespace) {
        errors.push(format!("{} name '{}' contains whitespace.", kind, name));
    }
}

fn check_spec(location: &str, spec: &ValidatorSpec, errors: &mut Vec<String>) {
    if spec.required && spec.default.is_some() {
        errors.push(format!("Validator '{}' is both required and has a default.", location));
    }
    match &spec.kind {
        KindSpec::Regexp(regexp) => {
            if let Err(e) = Regex::new(&regexp.pattern) {
                errors.push(format!("Validator '{}' has an invalid pattern: {}", location, e));
            }
        }
        KindSpec::List(list) if list.values.is_empty() => {
            errors.push(format!("Validator '{}' has an empty value list.", location));
        }
        KindSpec::Sequence(sequence) | KindSpec::Indent(sequence) => {
            if sequence.delimiter.as_deref() == Some("") {
                errors.push(format!("Validator '{}' has an empty delimiter.", location));
            }
            if let Some(item) = &sequence.item {
                check_spec(&format!("{}[item]", location), item, errors);
            }
        }
        KindSpec::Complex(complex) => {
            if complex.slots.is_empty() {
                errors.push(format!("Validator '{}' has no slots.", location));
            }
            for (index, slot) in complex.slots.iter().enumerate() {
                check_spec(&format!("{}[{}]", location, index), slot, errors);
            }
        }
        _ => {}
    }
}

fn check_chain(owner: &str, chain: &[RuleSetConfig], errors: &mut Vec<String>) {
    for rule_set in chain {
        for (attribute, spec) in rule_set {
            check_name("attribute", attribute, errors);
            check_spec(&format!("{}.{}", owner, attribute), spec, errors);
        }
    }
}

/// Structural checks on a policy document, before it is merged or compiled.
/// An alias may stand for one canonical name only.
fn check_aliases(scope: &str, aliases: &IndexMap<String, Vec<String>>, errors: &mut Vec<String>) {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for (canonical, names) in aliases {
        for name in names {
            if let Some(first) = seen.insert(name.as_str(), canonical.as_str()) {
                if first != canonical {
                    errors.push(format!(
                        "Alias '{}' is listed under {} '{}' and '{}'.",
                        name, scope, first, canonical
                    ));
                }
            }
        }
    }
}

fn validate_policy(config: &PolicyConfig) -> Result<()> {
    let mut errors = Vec::new();

    for (element, chain) in &config.elements {
        check_name("element", element, &mut errors);
        check_chain(element, chain, &mut errors);
    }
    for (table_name, table) in &config.style_tables {
        for (property, chain) in &table.properties {
            check_name("property", property, &mut errors);
            check_chain(&format!("{}:{}", table_name, property), chain, &mut errors);
        }
    }
    check_aliases("element", &config.element_aliases, &mut errors);
    check_aliases("attribute", &config.attribute_aliases, &mut errors);
    for (table_name, table) in &config.style_tables {
        check_aliases(&format!("style table '{}' property", table_name), &table.aliases, &mut errors);
    }
    for (element, rules) in &config.rewrites {
        for rule in rules {
            if rule.when.is_empty() {
                errors.push(format!("Rewrite rule for '{}' has no `when` pairs.", element));
            }
            check_name("element", &rule.rename, &mut errors);
        }
    }
    if let Some(block) = &config.default_block {
        check_name("element", block, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("Policy validation failed:\n{}", errors.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_default_policy_parses() -> Result<()> {
        let config = PolicyConfig::load_default_policy()?;
        assert!(config.elements.contains_key("p"));
        assert!(config.elements.contains_key("a"));
        assert!(!config.elements.contains_key("script"));
        assert!(config.style_tables.contains_key("common"));
        validate_policy(&config)?;
        Ok(())
    }

    #[test]
    fn test_validator_spec_flattens_kind_and_options() -> Result<()> {
        let yaml = r#"
type: list
values: [ltr, rtl]
default: "ltr"
case_sensitive: true
"#;
        let spec: ValidatorSpec = serde_yml::from_str(yaml)?;
        assert_eq!(
            spec.kind,
            KindSpec::List(ListSpec { values: vec!["ltr".into(), "rtl".into()], return_defined: true })
        );
        assert_eq!(spec.default.as_deref(), Some("ltr"));
        assert!(spec.case_sensitive);
        assert!(!spec.required);
        Ok(())
    }

    #[test]
    fn test_nested_sequence_items() -> Result<()> {
        let yaml = r#"
type: sequence
delimiter: ","
item: { type: number, required: true, allow_sign: false }
"#;
        let spec: ValidatorSpec = serde_yml::from_str(yaml)?;
        let KindSpec::Sequence(sequence) = spec.kind else {
            panic!("expected a sequence");
        };
        let item = sequence.item.expect("item");
        assert!(item.required);
        assert_eq!(item.kind, KindSpec::Number(NumericSpec { allow_sign: Some(false), ..NumericSpec::default() }));
        assert_eq!(sequence.delimiter.as_deref(), Some(","));
        Ok(())
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        let result: std::result::Result<ValidatorSpec, _> = serde_yml::from_str("type: javascript");
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_keeps_defaults_and_overrides_by_key() -> Result<()> {
        let default_config = PolicyConfig::load_default_policy()?;
        let user: PolicyConfig = serde_yml::from_str(
            r#"
site: { domain: example.org }
default_block: div
elements:
  p: []
  mark: []
"#,
        )?;
        let merged = merge_policies(default_config.clone(), Some(user));
        assert_eq!(merged.site_domain(), "example.org");
        assert_eq!(merged.default_block(), "div");
        assert_eq!(merged.elements["p"], Vec::<RuleSetConfig>::new());
        assert!(merged.elements.contains_key("mark"));
        assert_eq!(merged.elements["a"], default_config.elements["a"]);
        assert_eq!(merged.block_elements(), default_config.block_elements());

        let untouched = merge_policies(default_config.clone(), None);
        assert_eq!(untouched, default_config);
        Ok(())
    }

    #[test]
    fn test_deny_elements_removes_elements_and_aliases() -> Result<()> {
        let mut config = PolicyConfig::load_default_policy()?;
        config.deny_elements(&["img".to_string(), "strong".to_string(), "blink".to_string()]);
        assert!(!config.elements.contains_key("img"));
        assert!(config.element_aliases.values().all(|aliases| !aliases.iter().any(|a| a == "strong")));
        assert!(config.elements.contains_key("p"));
        Ok(())
    }

    #[test]
    fn test_builtin_defaults_apply_when_unset() {
        let config = PolicyConfig::default();
        assert_eq!(config.site_domain(), DEFAULT_SITE_DOMAIN);
        assert_eq!(config.default_block(), "p");
        assert_eq!(config.block_elements().len(), DEFAULT_BLOCK_ELEMENTS.len());
        assert!(config.void_elements().contains(&"br".to_string()));
        assert_eq!(config.keep_nbsp(), vec!["td".to_string(), "th".to_string()]);
    }

    #[test]
    fn test_load_from_file_reports_bad_policies() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let good = dir.path().join("good.yaml");
        std::fs::write(&good, "elements:\n  mark: []\n")?;
        assert!(PolicyConfig::load_from_file(&good)?.elements.contains_key("mark"));

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "elements:\n  x:\n    - title: { type: regexp, pattern: \"(\" }\n")?;
        let err = PolicyConfig::load_from_file(&bad).unwrap_err();
        assert!(err.to_string().contains("invalid pattern"));

        assert!(PolicyConfig::load_from_file(dir.path().join("missing.yaml")).is_err());
        Ok(())
    }

    #[test]
    fn test_alias_under_two_canonicals_is_rejected() -> Result<()> {
        let yaml = r#"
elements:
  p: []
style_tables:
  common:
    aliases:
      margin: [gap]
      padding: [gap]
    properties:
      margin: []
      padding: []
"#;
        let config: PolicyConfig = serde_yml::from_str(yaml)?;
        let err = validate_policy(&config).unwrap_err();
        assert!(err
            .to_string()
            .contains("Alias 'gap' is listed under style table 'common' property 'margin' and 'padding'."));
        Ok(())
    }
}
