//! Site-origin collaborator used by the URL validator.
//!
//! Local references (`/path`) are expanded to absolute URLs with the current
//! site's domain when a rule does not allow local links, and rules that only
//! allow local links ask the origin to turn absolute URLs back into paths.
//!
//! License: MIT OR APACHE 2.0

/// Answers "which site are we embedding into?".
pub trait SiteOrigin: Send + Sync {
    /// Bare domain of the current site, e.g. `example.com`.
    fn domain(&self) -> String;

    /// Maps an absolute URL pointing at this site to a local path.
    /// Returns `None` for anything off-site.
    fn localize(&self, url: &str) -> Option<String> {
        let _ = url;
        None
    }
}

/// A fixed domain, usually taken from the policy's `site.domain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticOrigin {
    domain: String,
}

impl StaticOrigin {
    pub fn new(domain: impl Into<String>) -> Self {
        Self { domain: domain.into() }
    }
}

impl SiteOrigin for StaticOrigin {
    fn domain(&self) -> String {
        self.domain.clone()
    }

    fn localize(&self, url: &str) -> Option<String> {
        let lowered = url.to_ascii_lowercase();
        let domain = self.domain.to_ascii_lowercase();
        for scheme in ["http://", "https://"] {
            let prefix = format!("{}{}", scheme, domain);
            if !lowered.starts_with(&prefix) {
                continue;
            }
            // to_ascii_lowercase keeps byte offsets, so the prefix length is valid on `url`.
            let rest = &url[prefix.len()..];
            if rest.is_empty() {
                return Some("/".to_string());
            }
            if rest.starts_with('/') {
                return Some(rest.to_string());
            }
        }
        None
    }
}
