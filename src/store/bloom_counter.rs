//! First-seen counter gated by a probabilistic set
//!
//! Ids the filter reports as new are counted per exact millisecond into a
//! summing companion series. A filter false positive undercounts by one;
//! there are no false negatives, so nothing is ever counted twice.

use super::{TimeSeriesStore, UniqueCounter, UniquePoint};
use crate::backend::{Aggregation, DuplicatePolicy, RangeAggregation, RangeBound, TsPoint};
use crate::config::{BloomConfig, TimeSeriesConfig};
use crate::context::AnalyticsContext;
use crate::error::Result;
use crate::metrics::MetricKeyEncoder;
use crate::services::TsSample;
use crate::time::{resolve_range, AnalyticBucket, Bucket, DateRange, MetricScope, Timeframe, FOREVER_MS};
use futures::future::{try_join, BoxFuture};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct BloomCounterStore {
    ctx: AnalyticsContext,
    bloom_key: String,
    count_store: TimeSeriesStore,
    bloom: BloomConfig,
    lifetime_series_timeframe: Timeframe,
}

impl BloomCounterStore {
    pub fn new(ctx: &AnalyticsContext, base_key: &str) -> Self {
        let count_config = TimeSeriesConfig::default().with_duplicate_policy(DuplicatePolicy::Sum);
        BloomCounterStore {
            ctx: ctx.clone(),
            bloom_key: MetricKeyEncoder::bloom_key(base_key),
            count_store: TimeSeriesStore::new(ctx, MetricKeyEncoder::count_key(base_key), count_config),
            bloom: BloomConfig::default(),
            lifetime_series_timeframe: Timeframe::LastYear,
        }
    }

    pub fn with_bloom_config(mut self, bloom: BloomConfig) -> Self {
        self.bloom = bloom;
        self
    }

    /// Window used when a lifetime series is requested
    pub fn with_lifetime_series_timeframe(mut self, timeframe: Timeframe) -> Self {
        if !timeframe.is_lifetime() {
            self.lifetime_series_timeframe = timeframe;
        }
        self
    }

    pub fn bloom_key(&self) -> &str {
        &self.bloom_key
    }

    pub fn count_key(&self) -> &str {
        self.count_store.key()
    }

    /// Reserve the filter and provision the count series
    pub async fn init(&self) -> Result<()> {
        try_join(
            self.ctx.bloom().reserve_first(&self.bloom_key, &self.bloom),
            self.count_store.init(),
        )
        .await?;
        Ok(())
    }

    /// Record `points`, returning the ones counted as first seen
    pub async fn record_with_result(&self, points: &[UniquePoint]) -> Result<Vec<UniquePoint>> {
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = points.iter().map(|p| p.id.clone()).collect();
        let seen_before = self.ctx.bloom().check_and_register(&self.bloom_key, &ids).await?;
        let fresh: Vec<UniquePoint> = points
            .iter()
            .zip(seen_before)
            .filter(|(_, seen)| !seen)
            .map(|(point, _)| point.clone())
            .collect();

        if !fresh.is_empty() {
            let mut per_ms: BTreeMap<i64, f64> = BTreeMap::new();
            for point in &fresh {
                *per_ms.entry(point.timestamp.timestamp_millis()).or_insert(0.0) += 1.0;
            }
            let writes: Vec<TsPoint> = per_ms
                .into_iter()
                .map(|(timestamp_ms, value)| TsPoint {
                    key: self.count_key().to_string(),
                    timestamp_ms,
                    value,
                })
                .collect();
            self.ctx.timeseries().add(&writes).await?;
        }

        Ok(fresh)
    }

    pub async fn record(&self, points: &[UniquePoint]) -> Result<()> {
        self.record_with_result(points).await?;
        Ok(())
    }

    async fn sum_between(&self, from: RangeBound, to: RangeBound) -> Result<f64> {
        let samples = self
            .ctx
            .timeseries()
            .range(self.count_key(), from, to, RangeAggregation::new(Aggregation::Sum, FOREVER_MS))
            .await?;
        Ok(samples.first().map_or(0.0, |s| s.value))
    }

    /// First-seen count in `[start, end)`
    pub async fn total(&self, range: &DateRange) -> Result<f64> {
        if range.is_empty() {
            return Ok(0.0);
        }
        self.sum_between(RangeBound::At(range.start_ms()), RangeBound::At(range.end_ms() - 1))
            .await
    }

    pub async fn lifetime(&self) -> Result<f64> {
        self.sum_between(RangeBound::Earliest, RangeBound::Latest).await
    }

    pub async fn buckets(&self, range: &DateRange, bucket: Bucket) -> Result<Vec<AnalyticBucket>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let samples = self
            .ctx
            .timeseries()
            .range(
                self.count_key(),
                RangeBound::At(range.start_ms()),
                RangeBound::At(range.end_ms() - 1),
                RangeAggregation::new(Aggregation::Sum, bucket.width_ms()).with_empty(),
            )
            .await?;
        Ok(samples.iter().map(TsSample::to_bucket).collect())
    }

    pub async fn get(&self, timeframe: Timeframe) -> Result<f64> {
        if timeframe.is_lifetime() {
            return self.lifetime().await;
        }
        let range = resolve_range(timeframe, self.ctx.now());
        let total = self.total(&range).await?;
        Ok(total)
    }

    pub async fn get_buckets(&self, timeframe: Timeframe, bucket: Bucket) -> Result<Vec<AnalyticBucket>> {
        let window = if timeframe.is_lifetime() {
            self.lifetime_series_timeframe
        } else {
            timeframe
        };
        let range = resolve_range(window, self.ctx.now());
        let buckets = self.buckets(&range, bucket).await?;
        Ok(buckets)
    }
}

impl UniqueCounter for BloomCounterStore {
    fn init(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(BloomCounterStore::init(self))
    }

    fn record<'a>(&'a self, points: &'a [UniquePoint]) -> BoxFuture<'a, Result<()>> {
        Box::pin(BloomCounterStore::record(self, points))
    }

    fn get<'a>(&'a self, scope: &'a MetricScope) -> BoxFuture<'a, Result<f64>> {
        Box::pin(async move {
            match scope {
                MetricScope::Timeframe(timeframe) => BloomCounterStore::get(self, *timeframe).await,
                MetricScope::Range(range) => self.total(range).await,
            }
        })
    }

    fn get_buckets<'a>(
        &'a self,
        scope: &'a MetricScope,
        bucket: Bucket,
    ) -> BoxFuture<'a, Result<Vec<AnalyticBucket>>> {
        Box::pin(async move {
            match scope {
                MetricScope::Timeframe(timeframe) => {
                    BloomCounterStore::get_buckets(self, *timeframe, bucket).await
                }
                MetricScope::Range(range) => self.buckets(range, bucket).await,
            }
        })
    }
}
