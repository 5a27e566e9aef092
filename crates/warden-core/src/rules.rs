//! Rule compilation for the enforcement sink
//!
//! Every group whose decision is Blocked contributes one redirect rule per
//! site pattern. Rule IDs come from the store's persisted allocator, and a
//! rebuild replaces the entire installed set in one atomic apply.

use chrono::{DateTime, Local};
use tracing::{info, warn};
use warden_api::{BlockReason, CompiledRule, Decision};
use warden_browser::RuleSink;
use warden_config::{Group, Policy};
use warden_store::{AuditEvent, AuditEventType, Store, StoreResult};
use warden_util::WardenError;

use crate::decide;

/// Placeholder the enforcement layer substitutes with the full matched URL
pub const MATCHED_URL_TOKEN: &str = "\\0";

/// Counts from a rule rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildSummary {
    pub added: usize,
    pub removed: usize,
}

/// Build a block-notice URL carrying everything the notice page needs to
/// explain the block without a further lookup.
///
/// `original_url` is the pre-block URL; `None` emits the enforcement
/// layer's whole-match token instead, for use inside compiled rules.
pub fn block_notice_url(
    base: &str,
    group: &Group,
    reason: &BlockReason,
    original_url: Option<&str>,
) -> String {
    let mut url = format!(
        "{}?group={}&groupId={}&reason={}",
        base,
        urlencoding::encode(&group.name),
        urlencoding::encode(group.id.as_str()),
        reason.query_value(),
    );

    if let Some(minutes) = reason.allowed_minutes() {
        url.push_str(&format!("&allowedMinutes={}", minutes));
    }

    match original_url {
        Some(original) => url.push_str(&format!("&url={}", urlencoding::encode(original))),
        None => url.push_str(&format!("&url={}", MATCHED_URL_TOKEN)),
    }

    url
}

/// Compile the redirect rules for every currently-blocked group.
///
/// Deterministic re-derivation: the same policy, ledger, and pause state
/// always yield the same rule set (IDs included, thanks to the persisted
/// allocator).
pub fn compile_rules(
    policy: &Policy,
    store: &dyn Store,
    now: DateTime<Local>,
) -> StoreResult<Vec<CompiledRule>> {
    let mut rules = Vec::new();

    for group in &policy.groups {
        let Decision::Blocked { reason } = decide(group, store, now) else {
            continue;
        };

        for site in &group.sites {
            let id = store.rule_id_for(&group.id, &site.id)?;
            rules.push(CompiledRule {
                id,
                url_regex: site.pattern.filter_regex(),
                redirect: block_notice_url(&policy.service.block_page, group, &reason, None),
            });
        }
    }

    Ok(rules)
}

/// Replace the sink's installed rule set with a fresh compilation.
///
/// The previous set is read and removed in the same atomic apply that adds
/// the new one; there is no partial-update path.
pub async fn rebuild(
    policy: &Policy,
    store: &dyn Store,
    sink: &dyn RuleSink,
    now: DateTime<Local>,
) -> Result<RebuildSummary, WardenError> {
    let installed = sink
        .installed_ids()
        .await
        .map_err(|e| WardenError::browser(e.to_string()))?;

    let rules =
        compile_rules(policy, store, now).map_err(|e| WardenError::store(e.to_string()))?;

    let summary = RebuildSummary {
        added: rules.len(),
        removed: installed.len(),
    };

    sink.apply(rules, installed)
        .await
        .map_err(|e| WardenError::browser(e.to_string()))?;

    if let Err(e) = store.append_audit(AuditEvent::new(AuditEventType::RulesRebuilt {
        added: summary.added,
        removed: summary.removed,
    })) {
        warn!(error = %e, "Failed to audit rule rebuild");
    }

    info!(
        added = summary.added,
        removed = summary.removed,
        "Enforcement rules rebuilt"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use warden_browser::MockBrowser;
    use warden_config::parse_config;
    use warden_store::SqliteStore;

    /// Monday 2026-03-02 at the given time
    fn monday(hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).unwrap()
    }

    fn test_policy() -> Policy {
        parse_config(
            r#"
            config_version = 1

            [[groups]]
            id = "banned"
            name = "Banned"
            sites = ["example.com", "example.org"]

            [[groups]]
            id = "social"
            name = "Social"
            sites = ["reddit.com"]

            [[groups.blocks]]
            id = "weekday"
            days = ["mon"]
            start = "14:00"
            end = "17:00"
            allowed_minutes = 15
        "#,
        )
        .unwrap()
    }

    #[test]
    fn compiles_one_rule_per_blocked_site() {
        let policy = test_policy();
        let store = SqliteStore::in_memory().unwrap();

        // Monday 10:00: "banned" is always blocked, "social" is outside
        // its schedule, so all three sites get rules.
        let rules = compile_rules(&policy, &store, monday(10, 0)).unwrap();
        assert_eq!(rules.len(), 3);

        // Monday 14:00: "social" is allowed, only "banned" remains.
        let rules = compile_rules(&policy, &store, monday(14, 0)).unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.redirect.contains("groupId=banned")));
    }

    #[test]
    fn rule_ids_are_stable_across_compilations() {
        let policy = test_policy();
        let store = SqliteStore::in_memory().unwrap();

        let first = compile_rules(&policy, &store, monday(10, 0)).unwrap();
        let second = compile_rules(&policy, &store, monday(10, 0)).unwrap();

        let ids = |rules: &[CompiledRule]| rules.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn notice_url_carries_block_context() {
        let policy = test_policy();
        let group = &policy.groups[1];

        let url = block_notice_url(
            "warden://blocked",
            group,
            &BlockReason::BudgetExhausted { allowed_minutes: 15 },
            Some("https://old.reddit.com/r/funny"),
        );

        assert!(url.starts_with("warden://blocked?"));
        assert!(url.contains("group=Social"));
        assert!(url.contains("groupId=social"));
        assert!(url.contains("reason=budget-exhausted"));
        assert!(url.contains("allowedMinutes=15"));
        assert!(url.contains("url=https%3A%2F%2Fold.reddit.com%2Fr%2Ffunny"));
    }

    #[test]
    fn notice_url_uses_match_token_in_rules() {
        let policy = test_policy();
        let group = &policy.groups[0];

        let url = block_notice_url(
            "warden://blocked",
            group,
            &BlockReason::AlwaysBlocked,
            None,
        );

        assert!(url.ends_with(&format!("url={}", MATCHED_URL_TOKEN)));
        assert!(!url.contains("allowedMinutes"));
    }

    #[tokio::test]
    async fn rebuild_replaces_everything_and_is_idempotent() {
        let policy = test_policy();
        let store = SqliteStore::in_memory().unwrap();
        let browser = MockBrowser::new();

        let first = rebuild(&policy, &store, &browser, monday(10, 0)).await.unwrap();
        assert_eq!(first.added, 3);
        assert_eq!(first.removed, 0);

        // Unchanged input: the same count is added, the previous set is
        // fully removed.
        let second = rebuild(&policy, &store, &browser, monday(10, 0)).await.unwrap();
        assert_eq!(second.added, first.added);
        assert_eq!(second.removed, first.added);

        assert_eq!(browser.installed_ids().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rebuild_shrinks_when_schedule_opens() {
        let policy = test_policy();
        let store = SqliteStore::in_memory().unwrap();
        let browser = MockBrowser::new();

        rebuild(&policy, &store, &browser, monday(10, 0)).await.unwrap();

        let summary = rebuild(&policy, &store, &browser, monday(14, 0)).await.unwrap();
        assert_eq!(summary.added, 2);
        assert_eq!(summary.removed, 3);
        assert_eq!(browser.installed_rules().len(), 2);
    }
}
