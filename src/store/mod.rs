//! Metric stores
//!
//! Each store owns the key layout of one metric and writes through the
//! context's services:
//!
//! - `TimeSeriesStore`: one series key, optional compaction children
//! - `DimensionalStore`: one series key per dimension combination
//! - `HllStore`: hour/day/month/lifetime cardinality sketches
//! - `BloomCounterStore`: first-seen filter feeding a summing count series

mod bloom_counter;
mod dimensional;
mod hll;
mod timeseries;

pub use bloom_counter::BloomCounterStore;
pub use dimensional::DimensionalStore;
pub use hll::HllStore;
pub use timeseries::TimeSeriesStore;

use crate::backend::TsPoint;
use crate::error::Result;
use crate::metrics::DimensionValues;
use crate::time::{AnalyticBucket, Bucket, MetricScope};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        TimeSeriesPoint { timestamp, value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionalPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub dimensions: DimensionValues,
}

/// One identifier observed at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniquePoint {
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

impl UniquePoint {
    pub fn new(id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        UniquePoint {
            id: id.into(),
            timestamp,
        }
    }
}

/// Step same-millisecond writes to one key back by 1 ms per repeat
///
/// The n-th write (0-based) at `t` on a key lands on `t - n`, in input
/// order, so none is lost to the duplicate policy.
pub(crate) fn spread_collisions(points: Vec<TsPoint>) -> Vec<TsPoint> {
    let mut seen: HashMap<(String, i64), i64> = HashMap::new();
    points
        .into_iter()
        .map(|mut point| {
            let index = seen
                .entry((point.key.clone(), point.timestamp_ms))
                .or_insert(0);
            point.timestamp_ms -= *index;
            *index += 1;
            point
        })
        .collect()
}

/// Uniform read/write surface of the approximate-counting stores
pub trait UniqueCounter: Send + Sync {
    fn init(&self) -> BoxFuture<'_, Result<()>>;

    fn record<'a>(&'a self, points: &'a [UniquePoint]) -> BoxFuture<'a, Result<()>>;

    /// Distinct count over a timeframe or explicit range
    fn get<'a>(&'a self, scope: &'a MetricScope) -> BoxFuture<'a, Result<f64>>;

    fn get_buckets<'a>(
        &'a self,
        scope: &'a MetricScope,
        bucket: Bucket,
    ) -> BoxFuture<'a, Result<Vec<AnalyticBucket>>>;
}
