//! SQLite-based store implementation

use chrono::{DateTime, Local, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{AuditEvent, Store, StoreResult};
use warden_util::{BlockId, GroupId, RuleId, SiteId};

/// Name of the persisted rule-ID counter row
const RULE_ID_COUNTER: &str = "rule_id";

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                event_json TEXT NOT NULL
            );

            -- Budget ledger: usage-seconds per (group, day, time block)
            CREATE TABLE IF NOT EXISTS usage (
                group_id TEXT NOT NULL,
                day TEXT NOT NULL,
                block_id TEXT NOT NULL,
                used_secs INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (group_id, day, block_id)
            );

            -- Pauses: at most one per group
            CREATE TABLE IF NOT EXISTS pauses (
                group_id TEXT PRIMARY KEY,
                until TEXT NOT NULL
            );

            -- Rule-ID allocation: monotonic counter plus per-site mapping
            CREATE TABLE IF NOT EXISTS counters (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS rule_alloc (
                group_id TEXT NOT NULL,
                site_id TEXT NOT NULL,
                rule_id INTEGER NOT NULL,
                PRIMARY KEY (group_id, site_id)
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_usage_day ON usage(day);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

impl Store for SqliteStore {
    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, event_json) VALUES (?, ?)",
            params![event.timestamp.to_rfc3339(), event_json],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let event_json: String = row.get(2)?;
            Ok((id, timestamp_str, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| warden_util::now());
            let event: crate::AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                event,
            });
        }

        Ok(events)
    }

    fn get_used(
        &self,
        group_id: &GroupId,
        day: NaiveDate,
        block_id: &BlockId,
    ) -> StoreResult<Duration> {
        let conn = self.conn.lock().unwrap();
        let day_str = day.format("%Y-%m-%d").to_string();

        let secs: Option<i64> = conn
            .query_row(
                "SELECT used_secs FROM usage WHERE group_id = ? AND day = ? AND block_id = ?",
                params![group_id.as_str(), day_str, block_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(Duration::from_secs(secs.unwrap_or(0) as u64))
    }

    fn set_used(
        &self,
        group_id: &GroupId,
        day: NaiveDate,
        block_id: &BlockId,
        used: Duration,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let day_str = day.format("%Y-%m-%d").to_string();
        let secs = used.as_secs() as i64;

        conn.execute(
            r#"
            INSERT INTO usage (group_id, day, block_id, used_secs)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(group_id, day, block_id)
            DO UPDATE SET used_secs = excluded.used_secs
            "#,
            params![group_id.as_str(), day_str, block_id.as_str(), secs],
        )?;

        debug!(
            group_id = %group_id,
            day = %day_str,
            block_id = %block_id,
            used_secs = secs,
            "Usage persisted"
        );
        Ok(())
    }

    fn get_pause(&self, group_id: &GroupId) -> StoreResult<Option<DateTime<Local>>> {
        let conn = self.conn.lock().unwrap();

        let until_str: Option<String> = conn
            .query_row(
                "SELECT until FROM pauses WHERE group_id = ?",
                [group_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        let result = until_str.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Local))
                .ok()
        });

        Ok(result)
    }

    fn set_pause(&self, group_id: &GroupId, until: DateTime<Local>) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            INSERT INTO pauses (group_id, until)
            VALUES (?, ?)
            ON CONFLICT(group_id)
            DO UPDATE SET until = excluded.until
            "#,
            params![group_id.as_str(), until.to_rfc3339()],
        )?;

        debug!(group_id = %group_id, until = %until, "Pause set");
        Ok(())
    }

    fn clear_pause(&self, group_id: &GroupId) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM pauses WHERE group_id = ?", [group_id.as_str()])?;
        Ok(())
    }

    fn list_pauses(&self) -> StoreResult<Vec<(GroupId, DateTime<Local>)>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare("SELECT group_id, until FROM pauses")?;
        let rows = stmt.query_map([], |row| {
            let group_id: String = row.get(0)?;
            let until_str: String = row.get(1)?;
            Ok((group_id, until_str))
        })?;

        let mut pauses = Vec::new();
        for row in rows {
            let (group_id, until_str) = row?;
            if let Ok(until) = DateTime::parse_from_rfc3339(&until_str) {
                pauses.push((GroupId::new(group_id), until.with_timezone(&Local)));
            }
        }

        Ok(pauses)
    }

    fn rule_id_for(&self, group_id: &GroupId, site_id: &SiteId) -> StoreResult<RuleId> {
        let conn = self.conn.lock().unwrap();

        let existing: Option<i64> = conn
            .query_row(
                "SELECT rule_id FROM rule_alloc WHERE group_id = ? AND site_id = ?",
                params![group_id.as_str(), site_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            return Ok(RuleId::new(id));
        }

        // Allocate the next counter value and record the mapping. The
        // counter only ever moves forward, even across policy edits that
        // retire (group, site) pairs.
        let current: i64 = conn
            .query_row(
                "SELECT value FROM counters WHERE name = ?",
                [RULE_ID_COUNTER],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        let next = current + 1;

        conn.execute(
            r#"
            INSERT INTO counters (name, value)
            VALUES (?, ?)
            ON CONFLICT(name)
            DO UPDATE SET value = excluded.value
            "#,
            params![RULE_ID_COUNTER, next],
        )?;

        conn.execute(
            "INSERT INTO rule_alloc (group_id, site_id, rule_id) VALUES (?, ?, ?)",
            params![group_id.as_str(), site_id.as_str(), next],
        )?;

        debug!(
            group_id = %group_id,
            site_id = %site_id,
            rule_id = next,
            "Rule ID allocated"
        );

        Ok(RuleId::new(next))
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditEventType;
    use chrono::NaiveDate;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_audit_log() {
        let store = SqliteStore::in_memory().unwrap();

        let event = AuditEvent::new(AuditEventType::ServiceStarted);
        store.append_audit(event).unwrap();

        let events = store.get_recent_audits(10).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].event, AuditEventType::ServiceStarted));
    }

    #[test]
    fn test_ledger_defaults_to_zero() {
        let store = SqliteStore::in_memory().unwrap();
        let used = store
            .get_used(&GroupId::new("social"), day(2026, 3, 2), &BlockId::new("b0"))
            .unwrap();
        assert_eq!(used, Duration::ZERO);
    }

    #[test]
    fn test_ledger_last_write_wins() {
        let store = SqliteStore::in_memory().unwrap();
        let group = GroupId::new("social");
        let block = BlockId::new("weekday");
        let monday = day(2026, 3, 2);

        store
            .set_used(&group, monday, &block, Duration::from_secs(300))
            .unwrap();
        store
            .set_used(&group, monday, &block, Duration::from_secs(310))
            .unwrap();

        let used = store.get_used(&group, monday, &block).unwrap();
        assert_eq!(used, Duration::from_secs(310));
    }

    #[test]
    fn test_ledger_keys_are_date_scoped() {
        let store = SqliteStore::in_memory().unwrap();
        let group = GroupId::new("social");
        let block = BlockId::new("weekday");

        store
            .set_used(&group, day(2026, 3, 2), &block, Duration::from_secs(900))
            .unwrap();

        // A new day means a new key: yesterday's usage is inert.
        let used = store.get_used(&group, day(2026, 3, 3), &block).unwrap();
        assert_eq!(used, Duration::ZERO);
    }

    #[test]
    fn test_pauses() {
        let store = SqliteStore::in_memory().unwrap();
        let group = GroupId::new("social");

        assert!(store.get_pause(&group).unwrap().is_none());

        let until = warden_util::now() + chrono::Duration::minutes(5);
        store.set_pause(&group, until).unwrap();

        let stored = store.get_pause(&group).unwrap().unwrap();
        assert!((stored - until).num_seconds().abs() < 1);

        let listed = store.list_pauses().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, group);

        store.clear_pause(&group).unwrap();
        assert!(store.get_pause(&group).unwrap().is_none());
    }

    #[test]
    fn test_rule_id_allocation_is_stable_and_monotonic() {
        let store = SqliteStore::in_memory().unwrap();
        let group = GroupId::new("social");

        let id1 = store.rule_id_for(&group, &SiteId::new("reddit.com")).unwrap();
        let id2 = store
            .rule_id_for(&group, &SiteId::new("example.com"))
            .unwrap();
        assert!(id2 > id1);

        // Same pair -> same ID
        let again = store.rule_id_for(&group, &SiteId::new("reddit.com")).unwrap();
        assert_eq!(again, id1);

        // A different group gets a fresh ID even for the same site
        let other = store
            .rule_id_for(&GroupId::new("news"), &SiteId::new("reddit.com"))
            .unwrap();
        assert!(other > id2);
    }
}
