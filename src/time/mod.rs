//! Time Resolution
//!
//! Pure helpers that turn named timeframes into UTC ranges, snap instants to
//! bucket boundaries and enumerate bucket starts. All instants are
//! `DateTime<Utc>`; backend timestamps are milliseconds since the epoch.
//!
//! - `types`: Timeframe, Bucket, DateRange, MetricScope, AnalyticBucket
//! - `bucket`: snapping, calendar stepping and key formatting
//! - `range`: timeframe → range resolution
//! - `series`: lazy bucket-start enumeration
//! - `clock`: injectable "now"

mod bucket;
mod clock;
mod range;
mod series;
mod types;

pub use bucket::{
    add_days, add_hours, add_months, ceil_to_bucket, floor_to_bucket, month_start,
    normalize_range, snap_to_day, snap_to_hour, timestamp_to_utc,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use range::{resolve_instant, resolve_range};
pub use series::{generate_time_series, BucketSeries};
pub use types::{AnalyticBucket, Bucket, DateRange, MetricScope, Timeframe};

/// Bucket width (100 years) that makes the backend return one aggregate
pub const FOREVER_MS: i64 = 3_153_600_000_000;
