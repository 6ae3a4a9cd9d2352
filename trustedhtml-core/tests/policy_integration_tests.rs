// trustedhtml-core/tests/policy_integration_tests.rs
use anyhow::Result;
use std::io::Write;
use tempfile::NamedTempFile;

use trustedhtml_core::config::{self, KindSpec, PolicyConfig};
use trustedhtml_core::{compile_policy, TrustedError};

#[test]
fn test_load_default_policy() {
    let config = PolicyConfig::load_default_policy().unwrap();
    assert!(!config.elements.is_empty());
    for forbidden in ["script", "style", "iframe", "html", "head", "body", "form", "input"] {
        assert!(!config.elements.contains_key(forbidden), "{} must not be whitelisted", forbidden);
    }
    let a = &config.elements["a"];
    assert_eq!(a.len(), 2);
    assert!(a[0]["href"].required);
    assert!(matches!(a[0]["href"].kind, KindSpec::Url(ref url) if url.allow_anchor));
}

#[test]
fn test_load_from_file() -> Result<()> {
    let yaml_content = r#"
site:
  domain: example.org
default_block: div
elements:
  div: []
  abbr:
    - title: { type: content, required: true }
"#;
    let mut file = NamedTempFile::new()?;
    file.write_all(yaml_content.as_bytes())?;
    let config = PolicyConfig::load_from_file(file.path())?;
    assert_eq!(config.elements.len(), 2);
    assert_eq!(config.site_domain(), "example.org");
    assert_eq!(config.default_block(), "div");
    assert_eq!(config.elements["abbr"][0]["title"].kind, KindSpec::Content);
    Ok(())
}

#[test]
fn test_load_from_file_rejects_malformed_yaml() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    file.write_all(b"elements:\n  p: [\n")?;
    let err = PolicyConfig::load_from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse policy file"));
    Ok(())
}

#[test]
fn test_load_from_file_rejects_required_with_default() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    file.write_all(b"elements:\n  p:\n    - dir: { type: list, values: [ltr], required: true, default: \"ltr\" }\n")?;
    let err = PolicyConfig::load_from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("both required and has a default"));
    Ok(())
}

#[test]
fn test_merged_policy_compiles_and_overrides_elements() -> Result<()> {
    let default_config = PolicyConfig::load_default_policy()?;
    let user: PolicyConfig = serde_yml::from_str(
        r#"
elements:
  img: []
  mark:
    - title: { type: text }
"#,
    )?;
    let merged = config::merge_policies(default_config, Some(user));
    let policy = compile_policy(&merged)?;
    assert!(policy.is_whitelisted("mark"));
    assert!(policy.chain_for("img").map(Vec::is_empty).unwrap_or(false));
    assert!(policy.is_whitelisted("h4"));
    Ok(())
}

#[test]
fn test_deny_then_compile() -> Result<()> {
    let mut config = PolicyConfig::load_default_policy()?;
    config.deny_elements(&["a".to_string(), "h1".to_string()]);
    let policy = compile_policy(&config)?;
    assert!(!policy.is_whitelisted("a"));
    assert!(!policy.is_whitelisted("h1"));
    assert!(!policy.is_whitelisted("h2"));
    assert!(policy.is_whitelisted("p"));
    Ok(())
}

#[test]
fn test_denying_the_default_block_is_a_policy_error() -> Result<()> {
    let mut config = PolicyConfig::load_default_policy()?;
    config.deny_elements(&["p".to_string()]);
    let err = compile_policy(&config).unwrap_err();
    assert!(matches!(err, TrustedError::InvalidPolicy(_)));
    Ok(())
}

#[test]
fn test_policy_round_trips_through_yaml() -> Result<()> {
    let config = PolicyConfig::load_default_policy()?;
    let yaml = serde_yml::to_string(&config)?;
    let reparsed: PolicyConfig = serde_yml::from_str(&yaml)?;
    assert_eq!(reparsed, config);
    Ok(())
}
