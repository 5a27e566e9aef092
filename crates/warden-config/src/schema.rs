//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Global service settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Site groups sharing one blocking policy each
    #[serde(default)]
    pub groups: Vec<RawGroup>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/wardend/wardend.sock)
    pub socket_path: Option<PathBuf>,

    /// Log directory
    pub log_dir: Option<PathBuf>,

    /// Data directory for store
    pub data_dir: Option<PathBuf>,

    /// Base URL of the block notice page redirects point at
    pub block_page: Option<String>,
}

/// Raw group definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawGroup {
    /// Unique stable ID
    pub id: String,

    /// Display name
    pub name: String,

    /// Site patterns (domain plus optional path prefix)
    #[serde(default)]
    pub sites: Vec<String>,

    /// Weekly windows with per-day budgets. A group with none is
    /// permanently blocked.
    #[serde(default)]
    pub blocks: Vec<RawTimeBlock>,
}

/// Raw time block
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawTimeBlock {
    /// Stable ID; defaults to `block-<index>` within the group. Explicit
    /// IDs are recommended: the budget ledger is keyed by block ID, so
    /// positional defaults shift when blocks are reordered.
    pub id: Option<String>,

    /// Days of week: "weekdays", "weekends", "all", or list like ["mon", "tue"]
    pub days: RawDays,

    /// Start time (HH:MM format); ignored when `all_day` is set
    pub start: Option<String>,

    /// End time (HH:MM format, inclusive); ignored when `all_day` is set
    pub end: Option<String>,

    /// Covers the whole day (00:00 through 23:59)
    #[serde(default)]
    pub all_day: bool,

    /// Daily budget in minutes; 0 means the window grants no time
    pub allowed_minutes: u32,
}

/// Days specification
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawDays {
    Preset(String),
    List(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_group_with_sites() {
        let toml_str = r#"
            config_version = 1

            [[groups]]
            id = "social"
            name = "Social"
            sites = ["reddit.com", "reddit.com/r/funny"]

            [[groups.blocks]]
            id = "weekday-evening"
            days = "weekdays"
            start = "17:00"
            end = "21:00"
            allowed_minutes = 30
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.groups.len(), 1);
        assert_eq!(config.groups[0].id, "social");
        assert_eq!(config.groups[0].sites.len(), 2);
        assert_eq!(config.groups[0].blocks[0].allowed_minutes, 30);
    }

    #[test]
    fn parse_all_day_block() {
        let toml_str = r#"
            config_version = 1

            [[groups]]
            id = "news"
            name = "News"
            sites = ["news.ycombinator.com"]

            [[groups.blocks]]
            days = ["sat", "sun"]
            all_day = true
            allowed_minutes = 60
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        let block = &config.groups[0].blocks[0];
        assert!(block.all_day);
        assert!(block.id.is_none());
        assert!(block.start.is_none());
    }

    #[test]
    fn parse_group_without_blocks() {
        let toml_str = r#"
            config_version = 1

            [[groups]]
            id = "banned"
            name = "Banned"
            sites = ["example.com"]
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert!(config.groups[0].blocks.is_empty());
    }
}
