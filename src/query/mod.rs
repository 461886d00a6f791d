//! Query engine
//!
//! Three query shapes over the stores:
//!
//! - `StandardQuery`: named scalar series, one aggregate or bucket series each
//! - `DimensionalQuery`: one filtered aggregate reduced across every
//!   matching dimensional series
//! - `GroupedQuery`: the same, broken down by one dimension onto a declared
//!   value set
//!
//! Bucketed variants fill empty buckets and align bucket edges to the range
//! start. Empty ranges answer 0 or an empty series without a backend call.

mod dimensional;
mod standard;

pub use dimensional::{DimensionalQuery, GroupedQuery};
pub use standard::{ts, MetricSource, StandardQuery};

use crate::backend::RangeBound;
use crate::services::{TsSample, TsSeries};
use crate::time::{resolve_range, AnalyticBucket, DateRange, MetricScope};
use chrono::{DateTime, Utc};

/// Window a query reads: the whole series or a concrete range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Window {
    Lifetime,
    Range(DateRange),
}

impl Window {
    pub(crate) fn from_scope(scope: &MetricScope, now: DateTime<Utc>) -> Self {
        if scope.is_lifetime() {
            Window::Lifetime
        } else {
            Window::Range(scope.resolve(now))
        }
    }

    pub(crate) fn from_timeframe(timeframe: crate::time::Timeframe, now: DateTime<Utc>) -> Self {
        if timeframe.is_lifetime() {
            Window::Lifetime
        } else {
            Window::Range(resolve_range(timeframe, now))
        }
    }
}

/// Inclusive backend bounds for `[start, end)`; `None` when the range is empty
pub(crate) fn inclusive_bounds(range: &DateRange) -> Option<(RangeBound, RangeBound)> {
    if range.is_empty() {
        return None;
    }
    Some((
        RangeBound::At(range.start_ms()),
        RangeBound::At(range.end_ms() - 1),
    ))
}

pub(crate) fn first_value(samples: &[TsSample]) -> f64 {
    samples.first().map_or(0.0, |s| s.value)
}

pub(crate) fn first_series_value(series: &[TsSeries]) -> f64 {
    series.first().map_or(0.0, |s| first_value(&s.samples))
}

pub(crate) fn to_buckets(samples: &[TsSample]) -> Vec<AnalyticBucket> {
    samples.iter().map(TsSample::to_bucket).collect()
}
