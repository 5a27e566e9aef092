//! Audit event types

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_api::TrackingEndReason;
use warden_util::{BlockId, GroupId, TabId};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Policy loaded/reloaded
    PolicyLoaded { group_count: usize },

    /// Tracking session started
    TrackingStarted {
        group_id: GroupId,
        block_id: BlockId,
        tab: TabId,
    },

    /// Tracking session ended
    TrackingStopped {
        group_id: GroupId,
        used: Duration,
        reason: TrackingEndReason,
    },

    /// A group's daily budget ran out
    BudgetExhausted {
        group_id: GroupId,
        block_id: BlockId,
        allowed_minutes: u32,
    },

    /// Pause granted
    PauseStarted {
        group_id: GroupId,
        until: DateTime<Local>,
    },

    /// Pause ended (expired or ended by the user)
    PauseEnded { group_id: GroupId, expired: bool },

    /// Enforcement rules replaced
    RulesRebuilt { added: usize, removed: usize },

    /// Client connected
    ClientConnected {
        client_id: String,
        role: String,
        uid: Option<u32>,
    },

    /// Client disconnected
    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: warden_util::now(),
            event,
        }
    }
}
