//! Site patterns: a lower-cased domain with an optional path prefix
//!
//! Patterns identify matchable resources for a group, e.g. `reddit.com` or
//! `reddit.com/r/funny`. Matching is subdomain-inclusive on the host and
//! prefix-based on the path, and is a pure function used both by live
//! navigation checks and by the rule compiler.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a pattern string was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,

    #[error("domain must contain a dot (e.g. example.com)")]
    NoDot,

    #[error("pattern must not contain whitespace")]
    HasWhitespace,

    #[error("pattern must not include a protocol")]
    HasScheme,

    #[error("domain '{0}' is not a valid domain name")]
    BadDomain(String),
}

/// A validated site pattern: domain plus optional path prefix.
///
/// The domain matches itself and any subdomain; the path, when present,
/// matches any pathname it prefixes. Both comparisons are case-insensitive
/// (patterns are stored lower-cased; inputs are lowered before comparing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitePattern {
    domain: String,
    /// Path prefix including the leading slash, e.g. `/r/funny`
    path: Option<String>,
}

impl SitePattern {
    /// Normalize raw user input into pattern form: lower-case, strip a
    /// leading `http://`/`https://` and `www.`, strip trailing slashes.
    ///
    /// Applying `normalize` to its own output is a no-op.
    pub fn normalize(raw: &str) -> String {
        let mut s = raw.trim().to_lowercase();
        for scheme in ["https://", "http://"] {
            if let Some(rest) = s.strip_prefix(scheme) {
                s = rest.to_string();
                break;
            }
        }
        if let Some(rest) = s.strip_prefix("www.") {
            s = rest.to_string();
        }
        while s.ends_with('/') {
            s.pop();
        }
        s
    }

    /// Parse a normalized pattern string, rejecting malformed input.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }
        if pattern.chars().any(char::is_whitespace) {
            return Err(PatternError::HasWhitespace);
        }
        if pattern.contains("://") {
            return Err(PatternError::HasScheme);
        }

        let (domain, path) = match pattern.find('/') {
            Some(idx) => (&pattern[..idx], Some(pattern[idx..].to_string())),
            None => (pattern, None),
        };

        if !domain.contains('.') {
            return Err(PatternError::NoDot);
        }
        if !is_valid_domain(domain) {
            return Err(PatternError::BadDomain(domain.to_string()));
        }

        Ok(Self {
            domain: domain.to_string(),
            path,
        })
    }

    /// Normalize then parse in one step.
    pub fn from_raw(raw: &str) -> Result<Self, PatternError> {
        Self::parse(&Self::normalize(raw))
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Does a URL with the given hostname and pathname fall under this
    /// pattern?
    ///
    /// The hostname matches if it equals the domain or ends with
    /// `.<domain>`; when the pattern carries a path, the pathname must
    /// start with it.
    pub fn matches(&self, hostname: &str, pathname: &str) -> bool {
        let host = hostname.to_lowercase();
        let host_ok =
            host == self.domain || host.ends_with(&format!(".{}", self.domain));
        if !host_ok {
            return false;
        }

        match &self.path {
            None => true,
            Some(prefix) => pathname.to_lowercase().starts_with(prefix.as_str()),
        }
    }

    /// Source string for the redirect-rule filter regex:
    /// `^https?://([a-zA-Z0-9-]+\.)*<domain>` plus the path prefix when set.
    ///
    /// A pattern with a path must not capture the bare domain, so the path
    /// component is required, not optional.
    pub fn filter_regex(&self) -> String {
        let mut re = format!(
            "^https?://([a-zA-Z0-9-]+\\.)*{}",
            regex::escape(&self.domain)
        );
        if let Some(path) = &self.path {
            re.push_str(&regex::escape(path));
        }
        re
    }
}

impl fmt::Display for SitePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.domain, self.path.as_deref().unwrap_or(""))
    }
}

/// A domain must look like `label(.label)+`, labels being alphanumerics and
/// hyphens that neither start nor end with a hyphen.
fn is_valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    labels.iter().all(|label| {
        !label.is_empty()
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}
