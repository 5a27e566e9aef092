//! Configuration validation

use crate::schema::{RawConfig, RawDays, RawGroup};
use std::collections::HashSet;
use thiserror::Error;
use warden_util::{PatternError, SitePattern};

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Group '{group_id}': {message}")]
    GroupError { group_id: String, message: String },

    #[error("Duplicate group ID: {0}")]
    DuplicateGroupId(String),

    #[error("Group '{group_id}': duplicate block ID '{block_id}'")]
    DuplicateBlockId { group_id: String, block_id: String },

    #[error("Group '{group_id}': site pattern '{pattern}': {error}")]
    InvalidSitePattern {
        group_id: String,
        pattern: String,
        error: PatternError,
    },

    #[error("Invalid time format '{value}': {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("Invalid day specification: {0}")]
    InvalidDaySpec(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // Check for duplicate group IDs
    let mut seen_ids = HashSet::new();
    for group in &config.groups {
        if !seen_ids.insert(&group.id) {
            errors.push(ValidationError::DuplicateGroupId(group.id.clone()));
        }
    }

    for group in &config.groups {
        errors.extend(validate_group(group));
    }

    errors
}

fn validate_group(group: &RawGroup) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if group.name.is_empty() {
        errors.push(ValidationError::GroupError {
            group_id: group.id.clone(),
            message: "name cannot be empty".into(),
        });
    }

    // Validate site patterns (after normalization, like the live path does)
    for raw_pattern in &group.sites {
        if let Err(e) = SitePattern::from_raw(raw_pattern) {
            errors.push(ValidationError::InvalidSitePattern {
                group_id: group.id.clone(),
                pattern: raw_pattern.clone(),
                error: e,
            });
        }
    }

    // Validate block IDs and windows
    let mut seen_block_ids = HashSet::new();
    for block in &group.blocks {
        if let Some(id) = &block.id {
            if !seen_block_ids.insert(id.clone()) {
                errors.push(ValidationError::DuplicateBlockId {
                    group_id: group.id.clone(),
                    block_id: id.clone(),
                });
            }
        }

        if let Err(e) = parse_days(&block.days) {
            errors.push(ValidationError::InvalidDaySpec(e));
        }

        if !block.all_day {
            for time in [&block.start, &block.end] {
                match time {
                    Some(value) => {
                        if let Err(e) = parse_time(value) {
                            errors.push(ValidationError::InvalidTimeFormat {
                                value: value.clone(),
                                message: e,
                            });
                        }
                    }
                    None => {
                        errors.push(ValidationError::GroupError {
                            group_id: group.id.clone(),
                            message: "blocks need start and end unless all_day is set".into(),
                        });
                    }
                }
            }
        }
    }

    errors
}

/// Parse HH:MM time format
pub fn parse_time(s: &str) -> Result<(u8, u8), String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err("Expected HH:MM format".into());
    }

    let hour: u8 = parts[0].parse().map_err(|_| "Invalid hour".to_string())?;
    let minute: u8 = parts[1].parse().map_err(|_| "Invalid minute".to_string())?;

    if hour >= 24 {
        return Err("Hour must be 0-23".into());
    }
    if minute >= 60 {
        return Err("Minute must be 0-59".into());
    }

    Ok((hour, minute))
}

/// Parse days specification into a weekday mask
pub fn parse_days(days: &RawDays) -> Result<u8, String> {
    match days {
        RawDays::Preset(preset) => match preset.to_lowercase().as_str() {
            "all" | "every" | "daily" => Ok(0x7F),
            "weekdays" => Ok(0x1F), // Mon-Fri
            "weekends" => Ok(0x60), // Sat-Sun
            other => Err(format!("Unknown day preset: {}", other)),
        },
        RawDays::List(list) => {
            let mut mask = 0u8;
            for day in list {
                let bit = match day.to_lowercase().as_str() {
                    "mon" | "monday" => 1 << 0,
                    "tue" | "tuesday" => 1 << 1,
                    "wed" | "wednesday" => 1 << 2,
                    "thu" | "thursday" => 1 << 3,
                    "fri" | "friday" => 1 << 4,
                    "sat" | "saturday" => 1 << 5,
                    "sun" | "sunday" => 1 << 6,
                    other => return Err(format!("Unknown day: {}", other)),
                };
                mask |= bit;
            }
            Ok(mask)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RawTimeBlock;

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("14:30").unwrap(), (14, 30));
        assert_eq!(parse_time("00:00").unwrap(), (0, 0));
        assert_eq!(parse_time("23:59").unwrap(), (23, 59));

        assert!(parse_time("24:00").is_err());
        assert!(parse_time("12:60").is_err());
        assert!(parse_time("invalid").is_err());
    }

    #[test]
    fn test_parse_days() {
        assert_eq!(parse_days(&RawDays::Preset("weekdays".into())).unwrap(), 0x1F);
        assert_eq!(parse_days(&RawDays::Preset("weekends".into())).unwrap(), 0x60);
        assert_eq!(parse_days(&RawDays::Preset("all".into())).unwrap(), 0x7F);

        assert_eq!(
            parse_days(&RawDays::List(vec!["mon".into(), "wed".into(), "fri".into()])).unwrap(),
            0b10101
        );
    }

    fn make_group(id: &str, sites: Vec<&str>) -> RawGroup {
        RawGroup {
            id: id.into(),
            name: id.into(),
            sites: sites.into_iter().map(String::from).collect(),
            blocks: vec![],
        }
    }

    #[test]
    fn test_duplicate_group_id_detection() {
        let config = RawConfig {
            config_version: 1,
            service: Default::default(),
            groups: vec![
                make_group("social", vec!["reddit.com"]),
                make_group("social", vec!["example.com"]),
            ],
        };

        let errors = validate_config(&config);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateGroupId(_))));
    }

    #[test]
    fn test_bad_site_pattern_reported() {
        let config = RawConfig {
            config_version: 1,
            service: Default::default(),
            groups: vec![make_group("social", vec!["not a domain"])],
        };

        let errors = validate_config(&config);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidSitePattern { .. })));
    }

    #[test]
    fn test_block_without_times_rejected() {
        let mut group = make_group("social", vec!["reddit.com"]);
        group.blocks.push(RawTimeBlock {
            id: None,
            days: RawDays::Preset("all".into()),
            start: None,
            end: None,
            all_day: false,
            allowed_minutes: 15,
        });

        let config = RawConfig {
            config_version: 1,
            service: Default::default(),
            groups: vec![group],
        };

        let errors = validate_config(&config);
        assert!(!errors.is_empty());
    }
}
