//! Store trait definitions

use chrono::{DateTime, Local, NaiveDate};
use std::time::Duration;
use warden_util::{BlockId, GroupId, RuleId, SiteId};

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Budget ledger

    /// Usage for a (group, day, block); zero if no row exists.
    ///
    /// The key embeds the calendar date, so budgets reset implicitly at
    /// each new day and stale rows simply go inert.
    fn get_used(
        &self,
        group_id: &GroupId,
        day: NaiveDate,
        block_id: &BlockId,
    ) -> StoreResult<Duration>;

    /// Write the absolute usage for a (group, day, block). Last write wins.
    fn set_used(
        &self,
        group_id: &GroupId,
        day: NaiveDate,
        block_id: &BlockId,
        used: Duration,
    ) -> StoreResult<()>;

    // Pauses

    /// Get the pause expiry for a group, if a pause row exists.
    ///
    /// Callers treat an elapsed expiry as no pause; rows are cleared
    /// lazily or by the expiry alarm.
    fn get_pause(&self, group_id: &GroupId) -> StoreResult<Option<DateTime<Local>>>;

    /// Set (or replace) the pause expiry for a group
    fn set_pause(&self, group_id: &GroupId, until: DateTime<Local>) -> StoreResult<()>;

    /// Remove the pause row for a group
    fn clear_pause(&self, group_id: &GroupId) -> StoreResult<()>;

    /// All pause rows, for re-arming expiry alarms at startup
    fn list_pauses(&self) -> StoreResult<Vec<(GroupId, DateTime<Local>)>>;

    // Rule-ID allocation

    /// The rule ID for a (group, site), allocating from the persisted
    /// monotonic counter on first use. IDs are never reused, so rebuilds
    /// cannot collide with rule IDs the enforcement sink still remembers.
    fn rule_id_for(&self, group_id: &GroupId, site_id: &SiteId) -> StoreResult<RuleId>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
