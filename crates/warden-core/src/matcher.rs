//! URL matching against group site patterns

use url::Url;
use warden_config::{Group, Policy};

/// Split a URL into (hostname, pathname) for pattern matching.
///
/// Malformed URLs and URLs without a host yield `None`, never an error;
/// they simply match nothing.
pub fn split_url(raw: &str) -> Option<(String, String)> {
    let parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str()?.to_string();
    Some((host, parsed.path().to_string()))
}

/// All groups whose site patterns cover the URL, in policy order.
///
/// A URL may match several groups; the decision engine aggregates them.
pub fn matching_groups<'a>(policy: &'a Policy, raw_url: &str) -> Vec<&'a Group> {
    let Some((host, path)) = split_url(raw_url) else {
        return Vec::new();
    };

    policy
        .groups
        .iter()
        .filter(|g| g.matches(&host, &path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_config::parse_config;

    fn test_policy() -> Policy {
        parse_config(
            r#"
            config_version = 1

            [[groups]]
            id = "social"
            name = "Social"
            sites = ["reddit.com"]

            [[groups]]
            id = "funny"
            name = "Funny"
            sites = ["reddit.com/r/funny"]
        "#,
        )
        .unwrap()
    }

    #[test]
    fn split_url_extracts_host_and_path() {
        let (host, path) = split_url("https://old.reddit.com/r/funny/top?sort=new").unwrap();
        assert_eq!(host, "old.reddit.com");
        assert_eq!(path, "/r/funny/top");
    }

    #[test]
    fn split_url_absorbs_malformed_input() {
        assert!(split_url("not a url").is_none());
        assert!(split_url("").is_none());
        assert!(split_url("about:blank").is_none());
    }

    #[test]
    fn url_may_match_multiple_groups() {
        let policy = test_policy();

        let groups = matching_groups(&policy, "https://old.reddit.com/r/funny/top");
        assert_eq!(groups.len(), 2);

        let groups = matching_groups(&policy, "https://reddit.com/r/science");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id.as_str(), "social");

        assert!(matching_groups(&policy, "https://example.com/").is_empty());
    }

    #[test]
    fn malformed_url_matches_nothing() {
        let policy = test_policy();
        assert!(matching_groups(&policy, ":::???").is_empty());
    }
}
