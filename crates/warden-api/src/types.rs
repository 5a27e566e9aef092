//! Shared types for the wardend API

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_util::{BlockId, GroupId, RuleId, TabId};

/// Why a group is blocked right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "kebab-case")]
pub enum BlockReason {
    /// Group has no time blocks at all
    AlwaysBlocked,
    /// No time block covers the current day and minute
    OutsideSchedule,
    /// An active block exists but its daily budget is used up
    BudgetExhausted { allowed_minutes: u32 },
}

impl BlockReason {
    /// Wire value used as the `reason` query parameter on block notices.
    pub fn query_value(&self) -> &'static str {
        match self {
            BlockReason::AlwaysBlocked => "always-blocked",
            BlockReason::OutsideSchedule => "outside-schedule",
            BlockReason::BudgetExhausted { .. } => "budget-exhausted",
        }
    }

    pub fn allowed_minutes(&self) -> Option<u32> {
        match self {
            BlockReason::BudgetExhausted { allowed_minutes } => Some(*allowed_minutes),
            _ => None,
        }
    }
}

/// Classification of a (group, now) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Decision {
    /// An unexpired pause exists for the group; overrides every other state
    Paused { until: DateTime<Local> },
    /// Access is denied
    Blocked { reason: BlockReason },
    /// An active block has budget remaining
    Allowed {
        block_id: BlockId,
        remaining: Duration,
    },
}

impl Decision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Decision::Blocked { .. })
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Badge/icon state reported by the tracking loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconState {
    /// Nothing is being tracked
    Idle,
    /// Tracking with more than a minute of budget left
    Timer,
    /// Tracking with 60 seconds or less remaining
    Urgent,
}

/// Why a tracking session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackingEndReason {
    /// The per-day budget ran out mid-session
    BudgetExhausted,
    /// The decision for the tracked URL changed to blocked or paused
    DecisionChanged,
    /// The tracked tab lost focus or navigated away
    FocusLost,
    /// A new session for a different (group, block) replaced this one
    Superseded,
    /// Service shutdown
    Shutdown,
}

/// Live view of the current tracking session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    pub group_id: GroupId,
    pub group_name: String,
    pub block_id: BlockId,
    pub tab: TabId,
    pub used: Duration,
    pub allowed: Duration,
    pub remaining: Duration,
    pub icon: IconState,
}

/// Result of classifying a URL for a UI context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabStatus {
    /// Whether any group's site pattern matched the URL
    pub matched: bool,
    pub group_id: Option<GroupId>,
    pub group_name: Option<String>,
    pub decision: Option<Decision>,
}

impl TabStatus {
    pub fn unmatched() -> Self {
        Self {
            matched: false,
            group_id: None,
            group_name: None,
            decision: None,
        }
    }
}

/// A declarative redirect rule for the enforcement sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledRule {
    pub id: RuleId,
    /// Anchored regex matching URLs the rule applies to
    pub url_regex: String,
    /// Redirect target; `\0` stands for the full matched URL
    pub redirect: String,
}

/// Full service state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStateSnapshot {
    pub api_version: u32,
    pub policy_loaded: bool,
    pub group_count: usize,
    /// Groups currently compiled into redirect rules
    pub blocked_groups: Vec<GroupId>,
    pub tracking: Option<TrackingSnapshot>,
}

/// Role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Browser helper / popup - can report navigation, pause, query state
    Ui,
    /// Local admin - can also reload config
    Admin,
    /// Read-only observer
    Observer,
}

impl ClientRole {
    pub fn can_report_navigation(&self) -> bool {
        matches!(self, ClientRole::Ui | ClientRole::Admin)
    }

    pub fn can_pause(&self) -> bool {
        matches!(self, ClientRole::Ui | ClientRole::Admin)
    }

    pub fn can_reload_config(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub policy_loaded: bool,
    pub browser_ok: bool,
    pub store_ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_reason_wire_values() {
        assert_eq!(BlockReason::AlwaysBlocked.query_value(), "always-blocked");
        assert_eq!(BlockReason::OutsideSchedule.query_value(), "outside-schedule");
        assert_eq!(
            BlockReason::BudgetExhausted { allowed_minutes: 15 }.query_value(),
            "budget-exhausted"
        );
    }

    #[test]
    fn block_reason_serialization() {
        let reason = BlockReason::BudgetExhausted { allowed_minutes: 15 };
        let json = serde_json::to_string(&reason).unwrap();
        assert!(json.contains("budget-exhausted"));
        assert!(json.contains("allowed_minutes"));

        let parsed: BlockReason = serde_json::from_str(&json).unwrap();
        assert_eq!(reason, parsed);
    }

    #[test]
    fn decision_serialization() {
        let decision = Decision::Allowed {
            block_id: BlockId::new("weekday-evening"),
            remaining: Duration::from_secs(900),
        };

        let json = serde_json::to_string(&decision).unwrap();
        let parsed: Decision = serde_json::from_str(&json).unwrap();
        assert_eq!(decision, parsed);
        assert!(parsed.is_allowed());
    }
}
