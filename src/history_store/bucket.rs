// Bucket codec: calendar arithmetic (origin, offset) and the prepopulated point array.
// Pure functions; the SQL lives in aggregation.rs.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

use crate::models::{Point, Resolution};

const DOLLAR_REPLACEMENT: char = '\u{FF04}';
const DOT_REPLACEMENT: char = '\u{FF0E}';

/// Start of the period holding every point of the bucket `t` falls in, in UTC.
///
/// second → start of the minute, minute → start of the hour, hour → start of the
/// day, day → first of the month, month → January 1. Sub-second precision is dropped.
pub fn origin(t: DateTime<Utc>, resolution: Resolution) -> DateTime<Utc> {
    let (month, day, hour, minute) = match resolution {
        Resolution::Second => (t.month(), t.day(), t.hour(), t.minute()),
        Resolution::Minute => (t.month(), t.day(), t.hour(), 0),
        Resolution::Hour => (t.month(), t.day(), 0, 0),
        Resolution::Day => (t.month(), 1, 0, 0),
        Resolution::Month => (1, 1, 0, 0),
    };
    // Fields come from a valid UTC date, so the result is always unambiguous.
    Utc.with_ymd_and_hms(t.year(), month, day, hour, minute, 0)
        .single()
        .unwrap_or(t)
}

/// Position of `t` inside its bucket.
pub fn offset(resolution: Resolution, t: DateTime<Utc>) -> u32 {
    match resolution {
        Resolution::Second => t.second(),
        Resolution::Minute => t.minute(),
        Resolution::Hour => t.hour(),
        Resolution::Day => t.day(),
        Resolution::Month => t.month(),
    }
}

/// Lowest offset a bucket holds: day and month buckets are 1-based.
pub fn first_offset(resolution: Resolution) -> u32 {
    match resolution {
        Resolution::Day | Resolution::Month => 1,
        Resolution::Second | Resolution::Minute | Resolution::Hour => 0,
    }
}

pub fn points_per_bucket(resolution: Resolution) -> u32 {
    match resolution {
        Resolution::Second | Resolution::Minute => 60,
        Resolution::Hour => 24,
        Resolution::Day => 31,
        Resolution::Month => 12,
    }
}

/// Index into the stored point array for an offset.
pub fn slot(resolution: Resolution, offset: u32) -> usize {
    offset.saturating_sub(first_offset(resolution)) as usize
}

/// Full point array of a fresh bucket, every point never aggregated.
pub fn prepopulate(resolution: Resolution) -> Vec<Point> {
    let first = first_offset(resolution);
    (first..first + points_per_bucket(resolution))
        .map(Point::empty)
        .collect()
}

/// Makes a textual value usable as an occurrence key (`$` and `.` are replaced).
///
/// Not injective: a value already holding U+FF04 or U+FF0E shares its key with the
/// ASCII `$`/`.` spelling, and `unescape_key` returns the ASCII one.
pub fn escape_key(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '$' => DOLLAR_REPLACEMENT,
            '.' => DOT_REPLACEMENT,
            other => other,
        })
        .collect()
}

pub fn unescape_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            DOLLAR_REPLACEMENT => '$',
            DOT_REPLACEMENT => '.',
            other => other,
        })
        .collect()
}

pub(crate) fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}
