//! The tracking loop state machine
//!
//! While a decision is "allowed", a session accrues one usage-second per
//! tick. The tick body is a pure function of the session state so it can
//! be exercised without a real clock; the daemon owns the actual
//! one-second timer and cancels it on every transition to idle.

use std::time::Duration;
use warden_api::{IconState, TrackingSnapshot};
use warden_util::{BlockId, GroupId, TabId};

/// Ledger writes happen on every Nth tick, bounding staleness to N seconds
/// on abnormal termination.
pub const PERSIST_EVERY_TICKS: u32 = 10;

/// Remaining-seconds threshold at which the badge turns urgent
pub const URGENT_THRESHOLD_SECS: u64 = 60;

/// Outcome of a single one-second tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still within budget
    Running {
        remaining: Duration,
        icon: IconState,
        /// The caller must write the ledger this tick
        persist: bool,
    },
    /// The budget ran out on this tick; the caller must persist the final
    /// usage and tear the session down
    Exhausted { used: Duration },
}

/// An active tracking session for one (group, time block) pair.
///
/// There is at most one; the engine owns it as a single optional value and
/// always stops the previous session before starting a new one.
#[derive(Debug, Clone)]
pub struct TrackedSession {
    pub group_id: GroupId,
    pub group_name: String,
    pub block_id: BlockId,
    /// The tracked subject; refreshed in place when the same (group,
    /// block) is re-decided for another tab
    pub tab: TabId,
    /// Last URL seen for the tracked tab, carried into the block notice
    pub url: String,
    used_secs: u64,
    allowed_secs: u64,
    ticks_since_persist: u32,
}

impl TrackedSession {
    pub fn new(
        group_id: GroupId,
        group_name: String,
        block_id: BlockId,
        tab: TabId,
        url: String,
        used_secs: u64,
        allowed_secs: u64,
    ) -> Self {
        Self {
            group_id,
            group_name,
            block_id,
            tab,
            url,
            used_secs,
            allowed_secs,
            ticks_since_persist: 0,
        }
    }

    /// Advance the session by one second.
    ///
    /// `used_secs` can overshoot the budget by at most one tick before the
    /// loop stops; callers must not assume hard real-time precision.
    pub fn tick(&mut self) -> TickOutcome {
        self.used_secs += 1;
        self.ticks_since_persist += 1;

        if self.used_secs >= self.allowed_secs {
            self.ticks_since_persist = 0;
            return TickOutcome::Exhausted {
                used: self.used(),
            };
        }

        let persist = self.ticks_since_persist >= PERSIST_EVERY_TICKS;
        if persist {
            self.ticks_since_persist = 0;
        }

        TickOutcome::Running {
            remaining: self.remaining(),
            icon: self.icon(),
            persist,
        }
    }

    /// Point the session at a different tab without touching counters
    pub fn refresh_subject(&mut self, tab: TabId, url: String) {
        self.tab = tab;
        self.url = url;
    }

    pub fn used(&self) -> Duration {
        Duration::from_secs(self.used_secs)
    }

    pub fn remaining(&self) -> Duration {
        Duration::from_secs(self.allowed_secs.saturating_sub(self.used_secs))
    }

    pub fn icon(&self) -> IconState {
        if self.allowed_secs.saturating_sub(self.used_secs) <= URGENT_THRESHOLD_SECS {
            IconState::Urgent
        } else {
            IconState::Timer
        }
    }

    pub fn snapshot(&self) -> TrackingSnapshot {
        TrackingSnapshot {
            group_id: self.group_id.clone(),
            group_name: self.group_name.clone(),
            block_id: self.block_id.clone(),
            tab: self.tab,
            used: self.used(),
            allowed: Duration::from_secs(self.allowed_secs),
            remaining: self.remaining(),
            icon: self.icon(),
        }
    }
}
