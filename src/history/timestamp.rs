//! Human-readable timestamps for recorded query instances.
//!
//! Instances carry a display timestamp such as `October 18th 2026, 3:04:05 pm`,
//! rendered either in the host's local zone or at a fixed UTC offset.

use chrono::{DateTime, Datelike, FixedOffset, Local, TimeZone, Utc};
use std::fmt::Display;

/// Formats the current time for a new instance.
///
/// # Arguments
///
/// * `utc_offset_minutes` - Fixed offset from UTC, or `None` for the local zone
///
/// Offsets outside chrono's supported range fall back to UTC.
pub fn current_timestamp(utc_offset_minutes: Option<i32>) -> String {
    match utc_offset_minutes {
        Some(minutes) => match FixedOffset::east_opt(minutes.saturating_mul(60)) {
            Some(offset) => format_timestamp(&Utc::now().with_timezone(&offset)),
            None => format_timestamp(&Utc::now()),
        },
        None => format_timestamp(&Local::now()),
    }
}

/// Formats a point in time as `Month Dth YYYY, h:mm:ss am`.
pub fn format_timestamp<Tz>(time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let day = time.day();
    format!(
        "{} {}{} {}",
        time.format("%B"),
        day,
        ordinal_suffix(day),
        time.format("%Y, %-I:%M:%S %P")
    )
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}
