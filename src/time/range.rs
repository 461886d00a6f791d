//! Timeframe resolution

use super::bucket::{add_months, timestamp_to_utc};
use super::types::{DateRange, Timeframe};
use chrono::{DateTime, Duration, Utc};

/// Resolve a named timeframe to the window ending at `anchor`
///
/// `lifetime` starts at the epoch; `1m` and `1y` step calendar months.
pub fn resolve_range(timeframe: Timeframe, anchor: DateTime<Utc>) -> DateRange {
    let start = match timeframe {
        Timeframe::Lifetime => timestamp_to_utc(0),
        Timeframe::Last24Hours => anchor - Duration::hours(24),
        Timeframe::LastWeek => anchor - Duration::days(7),
        Timeframe::LastMonth => add_months(anchor, -1),
        Timeframe::LastYear => add_months(anchor, -12),
    };
    DateRange::new(start, anchor)
}

/// A raw instant is a single-instant range unless an end is supplied
pub fn resolve_instant(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> DateRange {
    DateRange::new(start, end.unwrap_or(start))
}
