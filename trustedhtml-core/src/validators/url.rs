//! URL validation: IRI to URI encoding, relative reference classification, scheme whitelist.
//!
//! License: MIT OR APACHE 2.0

use super::{Rejection, ValidationContext, Validator};
use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;

/// Schemes a non-local URL may use. Compared case-insensitively.
pub const SCHEMES: [&str; 12] = [
    "http", "https", "shttp", "ftp", "sftp", "file", "mailto", "svn", "svn+ssh", "telnet", "mms",
    "ed2k",
];

const GLOBAL_PREFIX: &str = "http://";
const LOCAL_PREFIX: &str = "/";

/// Characters that are not allowed to appear raw in a URI.
const IRI_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

static ANCHOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#[A-Za-z0-9_]+$").expect("valid anchor pattern"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s").expect("valid whitespace pattern"));

/// Percent-encodes non-ASCII and unsafe characters; reserved URI characters pass through.
pub fn iri_to_uri(value: &str) -> String {
    utf8_percent_encode(value, IRI_ESCAPES).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRule {
    /// Only links into the current site are kept, always as paths.
    pub local_only: bool,
    /// `/path` references are kept as-is instead of being made absolute.
    pub allow_local: bool,
    /// `#name` references are kept.
    pub allow_anchor: bool,
}

impl Default for UrlRule {
    /// Local paths are kept; anchors and site-only mode are off.
    fn default() -> Self {
        Self::new(false, true, false)
    }
}

impl UrlRule {
    pub fn new(local_only: bool, allow_local: bool, allow_anchor: bool) -> Self {
        Self {
            local_only,
            allow_local: allow_local || local_only,
            allow_anchor,
        }
    }

    pub(crate) fn check(
        &self,
        owner: &Validator,
        ctx: &ValidationContext<'_>,
        raw: Option<&str>,
        value: String,
    ) -> Result<String, Rejection> {
        if self.allow_anchor {
            let anchor = WHITESPACE.replace_all(&value, "");
            if ANCHOR.is_match(&anchor) {
                return Ok(anchor.into_owned());
            }
        }

        let mut value = iri_to_uri(&value);
        if value.starts_with("//") {
            value = format!("http:{}", value);
        }
        if !value.contains(':') {
            if value.starts_with(LOCAL_PREFIX) {
                if self.allow_local {
                    return Ok(value);
                }
                value = format!("{}{}", ctx.env.site.domain(), value);
            } else if self.local_only {
                return Ok(format!("{}{}", LOCAL_PREFIX, value));
            }
            value = format!("{}{}", GLOBAL_PREFIX, value);
        }

        if self.local_only {
            return ctx
                .env
                .site
                .localize(&value)
                .ok_or_else(|| owner.reject(ctx, raw, &value));
        }

        let scheme = value.split(':').next().unwrap_or_default().to_ascii_lowercase();
        if SCHEMES.contains(&scheme.as_str()) {
            Ok(value)
        } else {
            Err(owner.reject(ctx, raw, &value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NullAuditSink;
    use crate::origin::StaticOrigin;
    use crate::validators::{Environment, Kind};

    fn check(rule: UrlRule, value: &str) -> Result<String, Rejection> {
        let origin = StaticOrigin::new("example.com");
        let sink = NullAuditSink;
        let env = Environment::new(&origin, &sink, false);
        let ctx = ValidationContext::new("a", "href", &env);
        Validator::new(Kind::Url(rule)).validate(&ctx, Some(value))
    }

    #[test]
    fn test_absolute_urls_need_a_whitelisted_scheme() {
        assert_eq!(check(UrlRule::default(), "https://rust-lang.org/"), Ok("https://rust-lang.org/".to_string()));
        assert_eq!(check(UrlRule::default(), "MAILTO:me@example.org"), Ok("MAILTO:me@example.org".to_string()));
        assert_eq!(check(UrlRule::default(), "javascript:alert(1)"), Err(Rejection::AbsentOptional));
        assert_eq!(check(UrlRule::default(), "JaVaScRiPt:alert(1)"), Err(Rejection::AbsentOptional));
        assert_eq!(check(UrlRule::default(), "data:text/html;base64,AAAA"), Err(Rejection::AbsentOptional));
    }

    #[test]
    fn test_bare_and_local_references() {
        assert_eq!(check(UrlRule::default(), "www.example.org"), Ok("http://www.example.org".to_string()));
        assert_eq!(check(UrlRule::default(), "/news/1"), Ok("/news/1".to_string()));
        assert_eq!(check(UrlRule::new(false, false, false), "/news/1"), Ok("http://example.com/news/1".to_string()));
        assert_eq!(check(UrlRule::default(), "//cdn.example.org/x.png"), Ok("http://cdn.example.org/x.png".to_string()));
    }

    #[test]
    fn test_anchors_only_when_allowed() {
        assert_eq!(check(UrlRule::new(false, false, true), " #top "), Ok("#top".to_string()));
        assert_eq!(check(UrlRule::default(), "#top"), Ok("http://#top".to_string()));
    }

    #[test]
    fn test_local_only_localizes_through_the_origin() {
        let local = UrlRule::new(true, false, false);
        assert_eq!(check(local.clone(), "http://example.com/a"), Ok("/a".to_string()));
        assert_eq!(check(local.clone(), "page.html"), Ok("/page.html".to_string()));
        assert_eq!(check(local.clone(), "/page.html"), Ok("/page.html".to_string()));
        assert_eq!(check(local, "http://evil.com/a"), Err(Rejection::AbsentOptional));
    }

    #[test]
    fn test_unsafe_characters_are_encoded() {
        assert_eq!(iri_to_uri("/a b\"<c>"), "/a%20b%22%3Cc%3E");
        assert_eq!(iri_to_uri("/caf\u{e9}?q=1&r=2#x"), "/caf%C3%A9?q=1&r=2#x");
        assert_eq!(
            check(UrlRule::default(), "http://x.org/\"onmouseover=\"a()"),
            Ok("http://x.org/%22onmouseover=%22a()".to_string())
        );
    }
}
