//! Bucket boundary arithmetic
//!
//! Hour and day boundaries are plain millisecond arithmetic (UTC has no
//! offsets). Month boundaries are calendar months.

use super::types::{Bucket, DateRange};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};

pub fn timestamp_to_utc(timestamp_ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms).unwrap_or_default()
}

fn floor_ms(at: DateTime<Utc>, width_ms: i64) -> DateTime<Utc> {
    let ms = at.timestamp_millis();
    timestamp_to_utc(ms - ms.rem_euclid(width_ms))
}

pub fn snap_to_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    floor_ms(at, Bucket::HOUR_MS)
}

pub fn snap_to_day(at: DateTime<Utc>) -> DateTime<Utc> {
    floor_ms(at, Bucket::DAY_MS)
}

/// Midnight on the first day of the month containing `at`
pub fn month_start(at: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(at.year(), at.month(), 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or_else(|| snap_to_day(at))
}

pub fn add_hours(at: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    at + Duration::hours(hours)
}

pub fn add_days(at: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    at + Duration::days(days)
}

/// Calendar month arithmetic; the day clamps to the end of shorter months
pub fn add_months(at: DateTime<Utc>, months: i32) -> DateTime<Utc> {
    let stepped = if months >= 0 {
        at.checked_add_months(Months::new(months.unsigned_abs()))
    } else {
        at.checked_sub_months(Months::new(months.unsigned_abs()))
    };
    stepped.unwrap_or(at)
}

pub fn floor_to_bucket(at: DateTime<Utc>, bucket: Bucket) -> DateTime<Utc> {
    match bucket {
        Bucket::Hour => snap_to_hour(at),
        Bucket::Day => snap_to_day(at),
        Bucket::Month => month_start(at),
    }
}

pub fn ceil_to_bucket(at: DateTime<Utc>, bucket: Bucket) -> DateTime<Utc> {
    let floor = floor_to_bucket(at, bucket);
    if floor == at {
        return floor;
    }
    step(floor, bucket)
}

/// Start of the bucket after the one starting at `at`
pub(crate) fn step(at: DateTime<Utc>, bucket: Bucket) -> DateTime<Utc> {
    match bucket {
        Bucket::Hour => add_hours(at, 1),
        Bucket::Day => add_days(at, 1),
        Bucket::Month => add_months(at, 1),
    }
}

/// Widen a range so partial edge buckets are fully included
pub fn normalize_range(range: &DateRange, bucket: Bucket) -> DateRange {
    DateRange::new(
        floor_to_bucket(range.start, bucket),
        ceil_to_bucket(range.end, bucket),
    )
}
