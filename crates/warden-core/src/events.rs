//! Core events emitted by the engine
//!
//! The engine never touches the browser or the network itself; it emits
//! events and the daemon executes them against the collaborators.

use chrono::{DateTime, Local};
use std::time::Duration;
use warden_api::{IconState, TrackingEndReason};
use warden_util::{BlockId, GroupId, TabId};

/// Events emitted by the core engine
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// A tracking session started
    TrackingStarted {
        group_id: GroupId,
        group_name: String,
        block_id: BlockId,
        tab: TabId,
        remaining: Duration,
    },

    /// One countdown second elapsed
    TrackingTick {
        group_id: GroupId,
        remaining: Duration,
        icon: IconState,
    },

    /// The tracking session ended
    TrackingStopped {
        group_id: GroupId,
        used: Duration,
        reason: TrackingEndReason,
    },

    /// The tracked group's daily budget ran out
    BudgetExhausted {
        group_id: GroupId,
        group_name: String,
        block_id: BlockId,
        allowed_minutes: u32,
        tab: TabId,
    },

    /// The daemon must redirect a tab (block notice or exhaustion)
    RedirectTab { tab: TabId, url: String },

    /// The set of blocked groups may have changed; rules must be rebuilt
    RulesInvalidated,

    /// A pause took effect
    PauseStarted {
        group_id: GroupId,
        until: DateTime<Local>,
    },

    /// A pause ended (expired or user-ended)
    PauseEnded { group_id: GroupId, expired: bool },

    /// Policy was reloaded
    PolicyReloaded { group_count: usize },
}
