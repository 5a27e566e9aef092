//! Event types for wardend -> client streaming

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_util::{BlockId, GroupId, RuleId, TabId};

use crate::{
    CompiledRule, EngineStateSnapshot, IconState, TrackingEndReason, API_VERSION,
};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: warden_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Full state snapshot (sent on subscribe and major changes)
    StateChanged(EngineStateSnapshot),

    /// A tracking session started for a tab
    TrackingStarted {
        group_id: GroupId,
        group_name: String,
        block_id: BlockId,
        tab: TabId,
        remaining: Duration,
    },

    /// One-second countdown tick with badge state
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

    /// A group's daily budget ran out mid-session
    BudgetExhausted {
        group_id: GroupId,
        group_name: String,
        allowed_minutes: u32,
        tab: TabId,
    },

    /// The enforcement rule set was replaced
    RulesRebuilt { added: usize, removed: usize },

    /// Instruct the browser helper to apply a rule delta atomically
    ApplyRules {
        add: Vec<CompiledRule>,
        remove: Vec<RuleId>,
    },

    /// Instruct the browser helper to redirect a tab
    RedirectTab { tab: TabId, url: String },

    /// A pause took effect for a group
    PauseStarted {
        group_id: GroupId,
        until: DateTime<Local>,
    },

    /// A pause ended (expired or ended by the user)
    PauseEnded { group_id: GroupId, expired: bool },

    /// Policy was reloaded
    PolicyReloaded { group_count: usize },

    /// Service is shutting down
    Shutdown,
}
