//! Schedule evaluation for weekly time blocks
//!
//! A block is active when the current weekday is in its day set and the
//! current minute falls between its start and end, end **inclusive**: the
//! block stays active through its final minute and the window closes one
//! minute after `end`.

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use warden_config::{Group, TimeBlock};
use warden_util::WallClock;

/// Is the block active at `now`?
pub fn is_active(block: &TimeBlock, now: DateTime<Local>) -> bool {
    if !block.days.contains(now.weekday()) {
        return false;
    }

    let minute = now.hour() * 60 + now.minute();
    block.start.minute_of_day() <= minute && minute <= block.end.minute_of_day()
}

/// The block governing the group at `now`: the first active one in
/// insertion order.
///
/// When blocks overlap, ordering is load-bearing: the block found first
/// determines which budget is charged.
pub fn active_block(group: &Group, now: DateTime<Local>) -> Option<&TimeBlock> {
    group.blocks.iter().find(|b| is_active(b, now))
}

/// The earliest future boundary crossing today, strictly after `now`:
/// any block's window opening (`start`) or closing (`end` plus one
/// minute, since the end is inclusive).
///
/// Boundaries are computed for the current day only. A block opening at
/// midnight tomorrow is picked up by the daily rollover alarm, not here.
pub fn next_boundary(groups: &[Group], now: DateTime<Local>) -> Option<DateTime<Local>> {
    let mut earliest: Option<DateTime<Local>> = None;

    for group in groups {
        for block in &group.blocks {
            if !block.days.contains(now.weekday()) {
                continue;
            }

            let mut candidates = Vec::new();
            if let Some(open) = today_at(now, block.start) {
                candidates.push(open);
            }
            // A block ending at 23:59 closes at midnight, which is no
            // longer today.
            if block.end.minute_of_day() + 1 < 24 * 60 {
                let close_minute = block.end.minute_of_day() + 1;
                let close = WallClock::new(
                    (close_minute / 60) as u8,
                    (close_minute % 60) as u8,
                )
                .and_then(|clock| today_at(now, clock));
                if let Some(close) = close {
                    candidates.push(close);
                }
            }

            for candidate in candidates {
                if candidate > now && earliest.is_none_or(|e| candidate < e) {
                    earliest = Some(candidate);
                }
            }
        }
    }

    earliest
}

/// `now`'s date at the given wall-clock minute, second zero
fn today_at(now: DateTime<Local>, clock: WallClock) -> Option<DateTime<Local>> {
    let naive = now.date_naive().and_time(clock.to_naive_time());
    Local.from_local_datetime(&naive).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use warden_config::parse_config;

    /// Monday 2026-03-02 at the given time
    fn monday(hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).unwrap()
    }

    fn policy_with_block(start: &str, end: &str) -> warden_config::Policy {
        parse_config(&format!(
            r#"
            config_version = 1

            [[groups]]
            id = "social"
            name = "Social"
            sites = ["reddit.com"]

            [[groups.blocks]]
            id = "weekday"
            days = "weekdays"
            start = "{start}"
            end = "{end}"
            allowed_minutes = 15
        "#
        ))
        .unwrap()
    }

    #[test]
    fn active_within_window_and_on_boundaries() {
        let policy = policy_with_block("14:00", "17:00");
        let block = &policy.groups[0].blocks[0];

        assert!(is_active(block, monday(14, 0)));
        assert!(is_active(block, monday(15, 30)));
        // End minute is inclusive
        assert!(is_active(block, monday(17, 0)));
        // One minute past the end the window is closed
        assert!(!is_active(block, monday(17, 1)));
        assert!(!is_active(block, monday(13, 59)));
    }

    #[test]
    fn inactive_on_excluded_day() {
        let policy = policy_with_block("14:00", "17:00");
        let block = &policy.groups[0].blocks[0];

        // Saturday 2026-03-07, inside the time range but not a weekday
        let saturday = Local.with_ymd_and_hms(2026, 3, 7, 15, 0, 0).unwrap();
        assert!(!is_active(block, saturday));
    }

    #[test]
    fn first_matching_block_governs() {
        let policy = parse_config(
            r#"
            config_version = 1

            [[groups]]
            id = "social"
            name = "Social"
            sites = ["reddit.com"]

            [[groups.blocks]]
            id = "first"
            days = "all"
            start = "14:00"
            end = "18:00"
            allowed_minutes = 15

            [[groups.blocks]]
            id = "second"
            days = "all"
            start = "15:00"
            end = "19:00"
            allowed_minutes = 60
        "#,
        )
        .unwrap();

        let group = &policy.groups[0];
        // Both overlap at 16:00; the first in insertion order wins
        let block = active_block(group, monday(16, 0)).unwrap();
        assert_eq!(block.id.as_str(), "first");

        // Only the second covers 18:30
        let block = active_block(group, monday(18, 30)).unwrap();
        assert_eq!(block.id.as_str(), "second");

        assert!(active_block(group, monday(13, 0)).is_none());
    }

    #[test]
    fn next_boundary_finds_opening_then_closing() {
        let policy = policy_with_block("14:00", "17:00");

        // Before the window: the next boundary is the opening
        let boundary = next_boundary(&policy.groups, monday(12, 0)).unwrap();
        assert_eq!(boundary, monday(14, 0));

        // Inside the window: the next boundary is one minute past the
        // inclusive end
        let boundary = next_boundary(&policy.groups, monday(15, 0)).unwrap();
        assert_eq!(boundary, monday(17, 1));

        // After the window closes there is nothing left today
        assert!(next_boundary(&policy.groups, monday(17, 30)).is_none());
    }

    #[test]
    fn next_boundary_is_strictly_future() {
        let policy = policy_with_block("14:00", "17:00");

        // Exactly at the opening, the only remaining boundary is the close
        let boundary = next_boundary(&policy.groups, monday(14, 0)).unwrap();
        assert_eq!(boundary, monday(17, 1));
    }

    #[test]
    fn next_boundary_skips_midnight_close() {
        let policy = policy_with_block("20:00", "23:59");

        // The close would land at midnight, which is no longer today
        assert!(next_boundary(&policy.groups, monday(21, 0)).is_none());
    }
}
