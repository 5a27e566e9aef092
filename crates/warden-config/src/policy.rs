//! Validated policy structures

use crate::schema::{RawConfig, RawGroup, RawServiceConfig, RawTimeBlock};
use crate::validation::{parse_days, parse_time};
use std::path::PathBuf;
use std::time::Duration;
use warden_util::{BlockId, DaysOfWeek, GroupId, SiteId, SitePattern, WallClock};

/// Validated policy ready for use by the core engine
#[derive(Debug, Clone)]
pub struct Policy {
    /// Service configuration
    pub service: ServiceConfig,

    /// Validated groups
    pub groups: Vec<Group>,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        let groups = raw.groups.into_iter().map(Group::from_raw).collect();

        Self {
            service: ServiceConfig::from_raw(raw.service),
            groups,
        }
    }

    /// Get group by ID
    pub fn get_group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| &g.id == id)
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub log_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Base URL the compiled rules and live redirects point at
    pub block_page: String,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw
                .socket_path
                .unwrap_or_else(warden_util::socket_path_without_env),
            log_dir: raw.log_dir.unwrap_or_else(warden_util::default_log_dir),
            data_dir: raw.data_dir.unwrap_or_else(warden_util::data_dir_without_env),
            block_page: raw
                .block_page
                .unwrap_or_else(|| "warden://blocked".to_string()),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// A named collection of site patterns sharing one blocking policy.
///
/// A group with no time blocks is permanently blocked for all its sites.
#[derive(Debug, Clone)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub sites: Vec<Site>,
    pub blocks: Vec<TimeBlock>,
}

impl Group {
    fn from_raw(raw: RawGroup) -> Self {
        let sites = raw
            .sites
            .iter()
            .filter_map(|s| Site::from_raw(s))
            .collect();

        let blocks = raw
            .blocks
            .into_iter()
            .enumerate()
            .map(|(index, b)| TimeBlock::from_raw(b, index))
            .collect();

        Self {
            id: GroupId::new(raw.id),
            name: raw.name,
            sites,
            blocks,
        }
    }

    /// Does any of this group's sites cover the given host and path?
    pub fn matches(&self, hostname: &str, pathname: &str) -> bool {
        self.sites.iter().any(|s| s.pattern.matches(hostname, pathname))
    }
}

/// A matchable site within a group
#[derive(Debug, Clone)]
pub struct Site {
    pub id: SiteId,
    pub pattern: SitePattern,
}

impl Site {
    /// Validation already rejected malformed patterns; anything that still
    /// fails to parse here is silently skipped.
    fn from_raw(raw: &str) -> Option<Self> {
        let pattern = SitePattern::from_raw(raw).ok()?;
        Some(Self {
            id: SiteId::new(pattern.to_string()),
            pattern,
        })
    }
}

/// A recurring weekly window with a per-day minute budget
#[derive(Debug, Clone)]
pub struct TimeBlock {
    pub id: BlockId,
    pub days: DaysOfWeek,
    pub start: WallClock,
    /// Inclusive: the block stays active through its final minute
    pub end: WallClock,
    pub all_day: bool,
    pub allowed_minutes: u32,
}

impl TimeBlock {
    fn from_raw(raw: RawTimeBlock, index: usize) -> Self {
        let days = DaysOfWeek::new(parse_days(&raw.days).unwrap_or(0x7F));

        let (start, end) = if raw.all_day {
            (WallClock::MIDNIGHT, WallClock::END_OF_DAY)
        } else {
            let (start_h, start_m) = raw
                .start
                .as_deref()
                .and_then(|s| parse_time(s).ok())
                .unwrap_or((0, 0));
            let (end_h, end_m) = raw
                .end
                .as_deref()
                .and_then(|s| parse_time(s).ok())
                .unwrap_or((23, 59));
            (
                WallClock::new(start_h, start_m).unwrap(),
                WallClock::new(end_h, end_m).unwrap(),
            )
        };

        Self {
            id: BlockId::new(raw.id.unwrap_or_else(|| format!("block-{}", index))),
            days,
            start,
            end,
            all_day: raw.all_day,
            allowed_minutes: raw.allowed_minutes,
        }
    }

    /// The daily budget in seconds
    pub fn allowed_seconds(&self) -> u64 {
        self.allowed_minutes as u64 * 60
    }

    pub fn allowed(&self) -> Duration {
        Duration::from_secs(self.allowed_seconds())
    }
}
