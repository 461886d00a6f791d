//! Core time types

use crate::error::{AnalyticsError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named relative window resolved against "now"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "24h")]
    Last24Hours,
    #[serde(rename = "1w")]
    LastWeek,
    #[serde(rename = "1m")]
    LastMonth,
    #[serde(rename = "1y")]
    LastYear,
    #[serde(rename = "lifetime")]
    Lifetime,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [
        Timeframe::Last24Hours,
        Timeframe::LastWeek,
        Timeframe::LastMonth,
        Timeframe::LastYear,
        Timeframe::Lifetime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Last24Hours => "24h",
            Timeframe::LastWeek => "1w",
            Timeframe::LastMonth => "1m",
            Timeframe::LastYear => "1y",
            Timeframe::Lifetime => "lifetime",
        }
    }

    /// Coarsest bucket that still evenly covers the window
    pub fn default_bucket(&self) -> Bucket {
        match self {
            Timeframe::Last24Hours => Bucket::Hour,
            Timeframe::LastWeek | Timeframe::LastMonth => Bucket::Day,
            Timeframe::LastYear | Timeframe::Lifetime => Bucket::Month,
        }
    }

    pub fn is_lifetime(&self) -> bool {
        matches!(self, Timeframe::Lifetime)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| AnalyticsError::Config(format!("unknown timeframe '{}'", s)))
    }
}

/// Fixed-width time window used for downsampling and series generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Bucket {
    #[serde(rename = "h")]
    Hour,
    #[serde(rename = "d")]
    Day,
    /// 28-day fixed width on the backend, calendar month in keys
    #[serde(rename = "m")]
    Month,
}

impl Bucket {
    pub const HOUR_MS: i64 = 60 * 60 * 1000;
    pub const DAY_MS: i64 = 24 * Self::HOUR_MS;
    pub const MONTH_MS: i64 = 28 * Self::DAY_MS;

    pub fn width_ms(&self) -> i64 {
        match self {
            Bucket::Hour => Self::HOUR_MS,
            Bucket::Day => Self::DAY_MS,
            Bucket::Month => Self::MONTH_MS,
        }
    }

    /// Single-letter code used inside storage keys
    pub fn code(&self) -> char {
        match self {
            Bucket::Hour => 'h',
            Bucket::Day => 'd',
            Bucket::Month => 'm',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'h' => Some(Bucket::Hour),
            'd' => Some(Bucket::Day),
            'm' => Some(Bucket::Month),
            _ => None,
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        match self {
            Bucket::Hour => 3600,
            Bucket::Day => 86_400,
            Bucket::Month => 2_678_400,
        }
    }

    /// TTL that keeps `retention_count` buckets plus the current one
    pub fn expiration_seconds(&self, retention_count: u64) -> u64 {
        self.ttl_seconds() * (retention_count + 1)
    }

    /// Canonical key: `YYYY-MM-DD:HH`, `YYYY-MM-DD` or `YYYY-MM`
    pub fn format_key(&self, at: DateTime<Utc>) -> String {
        match self {
            Bucket::Hour => at.format("%Y-%m-%d:%H").to_string(),
            Bucket::Day => at.format("%Y-%m-%d").to_string(),
            Bucket::Month => at.format("%Y-%m").to_string(),
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Half-open UTC range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        DateRange { start, end }
    }

    pub fn start_ms(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_ms(&self) -> i64 {
        self.end.timestamp_millis()
    }

    pub fn span_ms(&self) -> i64 {
        self.end_ms() - self.start_ms()
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Either a named timeframe or an explicit range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricScope {
    Timeframe(Timeframe),
    Range(DateRange),
}

impl MetricScope {
    /// Concrete range for this scope relative to `anchor`
    pub fn resolve(&self, anchor: DateTime<Utc>) -> DateRange {
        match self {
            MetricScope::Timeframe(tf) => super::resolve_range(*tf, anchor),
            MetricScope::Range(range) => *range,
        }
    }

    pub fn is_lifetime(&self) -> bool {
        matches!(self, MetricScope::Timeframe(Timeframe::Lifetime))
    }
}

impl From<Timeframe> for MetricScope {
    fn from(tf: Timeframe) -> Self {
        MetricScope::Timeframe(tf)
    }
}

impl From<DateRange> for MetricScope {
    fn from(range: DateRange) -> Self {
        MetricScope::Range(range)
    }
}

/// One bucketed aggregate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyticBucket {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl AnalyticBucket {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        AnalyticBucket { timestamp, value }
    }

    pub fn from_millis(timestamp_ms: i64, value: f64) -> Self {
        AnalyticBucket {
            timestamp: super::timestamp_to_utc(timestamp_ms),
            value,
        }
    }
}
