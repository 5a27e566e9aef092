//! The block/allow/pause decision algorithm

use chrono::{DateTime, Local};
use std::time::Duration;
use tracing::debug;
use warden_api::{BlockReason, Decision};
use warden_config::{Group, Policy};
use warden_store::Store;

use crate::{active_block, matching_groups};

/// Classify a single group at `now`.
///
/// A group's status is a pure function of the group definition, its pause
/// row, its ledger row, and the clock. There is no hidden state.
pub fn decide(group: &Group, store: &dyn Store, now: DateTime<Local>) -> Decision {
    // Pause overrides every other state. An elapsed pause is treated as
    // absent; the expiry alarm clears the row eventually.
    if let Ok(Some(until)) = store.get_pause(&group.id) {
        if until > now {
            return Decision::Paused { until };
        }
    }

    if group.blocks.is_empty() {
        return Decision::Blocked {
            reason: BlockReason::AlwaysBlocked,
        };
    }

    let Some(block) = active_block(group, now) else {
        return Decision::Blocked {
            reason: BlockReason::OutsideSchedule,
        };
    };

    let used = store
        .get_used(&group.id, now.date_naive(), &block.id)
        .unwrap_or(Duration::ZERO);
    let allowed = block.allowed();

    if used >= allowed {
        return Decision::Blocked {
            reason: BlockReason::BudgetExhausted {
                allowed_minutes: block.allowed_minutes,
            },
        };
    }

    Decision::Allowed {
        block_id: block.id.clone(),
        remaining: allowed - used,
    }
}

/// Classify a URL: evaluate every matching group and pick the most
/// restrictive outcome.
///
/// Blocking and pausing short-circuit the scan the moment they are seen.
/// Among groups that all allow, the one with the smallest remaining budget
/// governs. Returns `None` when no group matches (default/unblocked).
pub fn decide_url<'a>(
    policy: &'a Policy,
    store: &dyn Store,
    url: &str,
    now: DateTime<Local>,
) -> Option<(&'a Group, Decision)> {
    let groups = matching_groups(policy, url);
    if groups.is_empty() {
        return None;
    }

    let mut best_allowed: Option<(&Group, Decision)> = None;

    for group in groups {
        let decision = decide(group, store, now);
        debug!(group_id = %group.id, decision = ?decision, "Group decided");

        match &decision {
            Decision::Blocked { .. } | Decision::Paused { .. } => {
                return Some((group, decision));
            }
            Decision::Allowed { remaining, .. } => {
                let tighter = match &best_allowed {
                    Some((_, Decision::Allowed { remaining: best, .. })) => remaining < best,
                    _ => true,
                };
                if tighter {
                    best_allowed = Some((group, decision));
                }
            }
        }
    }

    best_allowed
}
