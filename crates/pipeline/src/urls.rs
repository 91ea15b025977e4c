//! URL normalization and acceptability rules.
//!
//! Every component that compares URLs goes through [`normalize`]; the
//! [`crate::index::UrlIndex`] key is always a normalized URL.

use url::{Host, Url};

/// Substrings rejected when no policy denylist is configured.
pub const DEFAULT_DENYLIST: &[&str] = &[
    "free-money",
    "get-rich-quick",
    "casino",
    "porn",
    "xxx",
    "crack",
    "keygen",
];

/// Normalizes a URL for comparison and indexing.
///
/// Strips surrounding whitespace and any trailing run of slashes (and
/// whitespace between them). Case and everything else are preserved.
/// `normalize(normalize(u)) == normalize(u)` for every input.
pub fn normalize(raw: &str) -> String {
    raw.trim_start()
        .trim_end_matches(|c: char| c == '/' || c.is_whitespace())
        .to_string()
}

/// Why a URL was rejected by [`UrlPolicy::check`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlRejection {
    /// Scheme is not `http` or `https`.
    #[error("URL must start with http:// or https://")]
    Scheme,
    /// No host component could be parsed.
    #[error("URL has no valid host")]
    MissingHost,
    /// Host is loopback, unspecified or a `.local` name.
    #[error("URL points at a local or private host `{host}`")]
    LocalHost {
        /// The offending host.
        host: String,
    },
    /// URL contains a denylisted substring.
    #[error("URL matches blocked pattern `{pattern}`")]
    Denylisted {
        /// The denylist entry that matched.
        pattern: String,
    },
}

/// Cheap first-line URL acceptability checks.
///
/// This is a denylist, not a content classifier: the adjudicator makes the
/// real policy call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPolicy {
    denylist: Vec<String>,
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_DENYLIST.iter().map(|s| s.to_string()))
    }
}

impl UrlPolicy {
    /// Creates a policy from denylist substrings (matched case-insensitively).
    pub fn new(denylist: impl IntoIterator<Item = String>) -> Self {
        Self {
            denylist: denylist
                .into_iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// The lowercased denylist entries.
    pub fn denylist(&self) -> &[String] {
        &self.denylist
    }

    /// Normalizes `raw` and checks it; returns the normalized URL on success.
    pub fn check(&self, raw: &str) -> Result<String, UrlRejection> {
        let normalized = normalize(raw);
        let lower = normalized.to_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return Err(UrlRejection::Scheme);
        }

        let parsed = Url::parse(&normalized).map_err(|_| UrlRejection::MissingHost)?;
        match parsed.host() {
            None => return Err(UrlRejection::MissingHost),
            Some(Host::Domain(domain)) => {
                let domain = domain.to_lowercase();
                if domain == "localhost" || domain.ends_with(".local") {
                    return Err(UrlRejection::LocalHost { host: domain });
                }
            }
            Some(Host::Ipv4(ip)) => {
                if ip.is_loopback() || ip.is_unspecified() {
                    return Err(UrlRejection::LocalHost { host: ip.to_string() });
                }
            }
            Some(Host::Ipv6(ip)) => {
                if ip.is_loopback() || ip.is_unspecified() {
                    return Err(UrlRejection::LocalHost { host: ip.to_string() });
                }
            }
        }

        if let Some(pattern) = self.denylist.iter().find(|p| lower.contains(p.as_str())) {
            return Err(UrlRejection::Denylisted {
                pattern: pattern.clone(),
            });
        }

        Ok(normalized)
    }
}

/// Derives a catalog slug from a URL's host.
///
/// Drops a leading `www.`, lowercases, collapses every run of characters
/// outside `[a-z0-9]` into `-`, trims dashes and caps the result at 50
/// characters. Returns `None` when nothing usable remains.
pub fn slug_for(url: &str) -> Option<String> {
    let parsed = Url::parse(&normalize(url)).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let mut slug = String::with_capacity(host.len());
    for c in host.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug: String = slug.trim_matches('-').chars().take(50).collect();
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        None
    } else {
        Some(slug)
    }
}
