//! Integration tests for wardend
//!
//! These exercise the engine end-to-end against the in-memory store and
//! the mock browser collaborators.

use chrono::{DateTime, Local, TimeZone};
use std::sync::Arc;
use std::time::Duration;
use warden_api::{BlockReason, Decision, IconState, TrackingEndReason};
use warden_browser::{MockBrowser, RuleSink};
use warden_config::{parse_config, Policy};
use warden_core::{rebuild, CoreEvent, Engine};
use warden_store::{SqliteStore, Store};
use warden_util::{BlockId, GroupId, TabId};

/// Monday 2026-03-02 at the given time
fn monday(hour: u32, minute: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).unwrap()
}

fn social_policy() -> Policy {
    parse_config(
        r#"
        config_version = 1

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
fn test_policy_loading() {
    let policy = social_policy();
    assert_eq!(policy.groups.len(), 1);
    assert_eq!(policy.groups[0].id.as_str(), "social");
    assert_eq!(policy.groups[0].blocks[0].allowed_seconds(), 900);
}

#[test]
fn test_full_budget_session_lifecycle() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    let mut engine = Engine::new(social_policy(), store.clone());
    let tab = TabId::new(1);

    // Monday 14:00 with no prior usage: allowed with the full budget
    let events = engine.handle_navigation(tab, "https://reddit.com/r/all", monday(14, 0));
    assert!(matches!(
        events.as_slice(),
        [CoreEvent::TrackingStarted { remaining, .. }]
            if *remaining == Duration::from_secs(900)
    ));

    // After 840 ticks one minute remains and the badge is urgent
    let mut last = Vec::new();
    for _ in 0..840 {
        last = engine.tick(monday(14, 14));
    }
    match last.as_slice() {
        [CoreEvent::TrackingTick { remaining, icon, .. }] => {
            assert_eq!(*remaining, Duration::from_secs(60));
            assert_eq!(*icon, IconState::Urgent);
        }
        other => panic!("unexpected events: {:?}", other),
    }

    // After 900 ticks the session exhausts: final usage persisted, rules
    // invalidated, and the tab redirected to a budget-exhausted notice.
    let mut events = Vec::new();
    for _ in 0..60 {
        events = engine.tick(monday(14, 15));
    }

    assert!(matches!(
        events[0],
        CoreEvent::TrackingStopped {
            reason: TrackingEndReason::BudgetExhausted,
            used,
            ..
        } if used == Duration::from_secs(900)
    ));
    assert!(matches!(events[2], CoreEvent::RulesInvalidated));
    match &events[3] {
        CoreEvent::RedirectTab { tab: t, url } => {
            assert_eq!(*t, tab);
            assert!(url.contains("reason=budget-exhausted"));
            assert!(url.contains("allowedMinutes=15"));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let used = store
        .get_used(
            &GroupId::new("social"),
            monday(14, 15).date_naive(),
            &BlockId::new("weekday"),
        )
        .unwrap();
    assert_eq!(used, Duration::from_secs(900));

    // Further ticks are no-ops; the loop is idle.
    assert!(engine.tick(monday(14, 16)).is_empty());
}

#[test]
fn test_budget_survives_restart() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());

    {
        let mut engine = Engine::new(social_policy(), store.clone());
        engine.handle_navigation(TabId::new(1), "https://reddit.com/", monday(14, 0));
        for _ in 0..300 {
            engine.tick(monday(14, 5));
        }
        engine.stop_tracking(TrackingEndReason::Shutdown, monday(14, 5));
    }

    // A fresh engine over the same store sees the spent budget.
    let engine = Engine::new(social_policy(), store);
    let status = engine.tab_status("https://reddit.com/", monday(14, 6));
    assert_eq!(
        status.decision,
        Some(Decision::Allowed {
            block_id: BlockId::new("weekday"),
            remaining: Duration::from_secs(600),
        })
    );
}

#[test]
fn test_most_restrictive_group_governs() {
    let policy = parse_config(
        r#"
        config_version = 1

        [[groups]]
        id = "generous"
        name = "Generous"
        sites = ["reddit.com"]

        [[groups.blocks]]
        id = "b"
        days = "all"
        all_day = true
        allowed_minutes = 10

        [[groups]]
        id = "tight"
        name = "Tight"
        sites = ["reddit.com"]

        [[groups.blocks]]
        id = "b"
        days = "all"
        all_day = true
        allowed_minutes = 1
    "#,
    )
    .unwrap();
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());

    // Group A has 30s left, group B 500s: A governs.
    store
        .set_used(
            &GroupId::new("tight"),
            monday(12, 0).date_naive(),
            &BlockId::new("b"),
            Duration::from_secs(30),
        )
        .unwrap();
    store
        .set_used(
            &GroupId::new("generous"),
            monday(12, 0).date_naive(),
            &BlockId::new("b"),
            Duration::from_secs(100),
        )
        .unwrap();

    let engine = Engine::new(policy, store);
    let status = engine.tab_status("https://reddit.com/", monday(12, 0));

    assert_eq!(status.group_id, Some(GroupId::new("tight")));
    assert_eq!(
        status.decision,
        Some(Decision::Allowed {
            block_id: BlockId::new("b"),
            remaining: Duration::from_secs(30),
        })
    );
}

#[test]
fn test_path_pattern_matching() {
    let policy = parse_config(
        r#"
        config_version = 1

        [[groups]]
        id = "funny"
        name = "Funny"
        sites = ["reddit.com/r/funny"]
    "#,
    )
    .unwrap();
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    let engine = Engine::new(policy, store);

    let status = engine.tab_status("https://old.reddit.com/r/funny/top", monday(12, 0));
    assert!(status.matched);
    assert_eq!(
        status.decision,
        Some(Decision::Blocked {
            reason: BlockReason::AlwaysBlocked
        })
    );

    let status = engine.tab_status("https://reddit.com/r/science", monday(12, 0));
    assert!(!status.matched);
}

#[test]
fn test_pause_expires_without_residual_effect() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    let mut engine = Engine::new(social_policy(), store);
    let group = GroupId::new("social");

    let t0 = monday(14, 0);
    engine
        .pause_group(&group, t0 + chrono::Duration::minutes(5), t0)
        .unwrap();

    // At t0+4min the pause governs
    let status = engine.tab_status("https://reddit.com/", t0 + chrono::Duration::minutes(4));
    assert!(matches!(status.decision, Some(Decision::Paused { .. })));

    // At t0+6min the pause has fully expired and the schedule decides
    let status = engine.tab_status("https://reddit.com/", t0 + chrono::Duration::minutes(6));
    assert!(matches!(status.decision, Some(Decision::Allowed { .. })));
}

#[tokio::test]
async fn test_rules_follow_pause_lifecycle() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    let mut engine = Engine::new(social_policy(), store.clone());
    let browser = MockBrowser::new();
    let group = GroupId::new("social");

    // Outside the schedule the group is enforced
    let summary = rebuild(engine.policy(), store.as_ref(), &browser, monday(10, 0))
        .await
        .unwrap();
    assert_eq!(summary.added, 1);

    // Pausing lifts enforcement
    engine.pause_group(&group, monday(10, 30), monday(10, 0)).unwrap();
    let summary = rebuild(engine.policy(), store.as_ref(), &browser, monday(10, 1))
        .await
        .unwrap();
    assert_eq!(summary.added, 0);
    assert_eq!(summary.removed, 1);
    assert!(browser.installed_ids().await.unwrap().is_empty());

    // Expiry restores it
    engine.end_pause(&group, true, monday(10, 30)).unwrap();
    let summary = rebuild(engine.policy(), store.as_ref(), &browser, monday(10, 31))
        .await
        .unwrap();
    assert_eq!(summary.added, 1);
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
    let engine = Engine::new(social_policy(), store.clone());
    let browser = MockBrowser::new();

    let first = rebuild(engine.policy(), store.as_ref(), &browser, monday(10, 0))
        .await
        .unwrap();
    let second = rebuild(engine.policy(), store.as_ref(), &browser, monday(10, 0))
        .await
        .unwrap();

    assert_eq!(first.added, second.added);
    assert_eq!(second.removed, first.added);

    // The installed rules carry the match-all-subdomains filter
    let rules = browser.installed_rules();
    assert_eq!(rules.len(), 1);
    assert_eq!(
        rules[0].url_regex,
        "^https?://([a-zA-Z0-9-]+\\.)*reddit\\.com"
    );
}
