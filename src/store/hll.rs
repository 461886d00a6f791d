//! Rollup cardinality store
//!
//! Every observed id lands in an hour, a day and a month sketch plus one
//! lifetime sketch, all in a single batched write. Reads union the sketches
//! that cover the requested window at one resolution.

use super::{UniqueCounter, UniquePoint};
use crate::context::AnalyticsContext;
use crate::error::Result;
use crate::metrics::MetricKeyEncoder;
use crate::time::{
    generate_time_series, normalize_range, resolve_range, AnalyticBucket, Bucket, DateRange,
    MetricScope, Timeframe,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HllStore {
    ctx: AnalyticsContext,
    key: String,
    lifetime_series_timeframe: Timeframe,
}

impl HllStore {
    pub fn new(ctx: &AnalyticsContext, key: impl Into<String>) -> Self {
        HllStore {
            ctx: ctx.clone(),
            key: key.into(),
            lifetime_series_timeframe: Timeframe::LastYear,
        }
    }

    /// Window used when a lifetime series is requested
    pub fn with_lifetime_series_timeframe(mut self, timeframe: Timeframe) -> Self {
        if !timeframe.is_lifetime() {
            self.lifetime_series_timeframe = timeframe;
        }
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn lifetime_key(&self) -> String {
        MetricKeyEncoder::hll_lifetime_key(&self.key)
    }

    /// Bucket starts and sketch keys covering `range` at `bucket` resolution
    fn covering_keys(&self, range: &DateRange, bucket: Bucket) -> Vec<(DateTime<Utc>, String)> {
        let normalized = normalize_range(range, bucket);
        generate_time_series(&normalized, bucket)
            .map(|start| (start, MetricKeyEncoder::hll_bucket_key(&self.key, bucket, start)))
            .collect()
    }

    pub async fn init(&self) -> Result<()> {
        Ok(())
    }

    pub async fn record(&self, points: &[UniquePoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let mut entries: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for point in points {
            for bucket in [Bucket::Hour, Bucket::Day, Bucket::Month] {
                entries
                    .entry(MetricKeyEncoder::hll_bucket_key(&self.key, bucket, point.timestamp))
                    .or_default()
                    .insert(point.id.clone());
            }
            entries
                .entry(self.lifetime_key())
                .or_default()
                .insert(point.id.clone());
        }

        let entries: Vec<(String, Vec<String>)> = entries
            .into_iter()
            .map(|(key, ids)| (key, ids.into_iter().collect()))
            .collect();
        self.ctx.hll().add_multi(&entries).await?;
        Ok(())
    }

    /// Distinct ids over `range`, unioned from day sketches
    pub async fn total(&self, range: &DateRange) -> Result<u64> {
        self.total_by_bucket(range, Bucket::Day).await
    }

    pub async fn total_by_bucket(&self, range: &DateRange, bucket: Bucket) -> Result<u64> {
        let keys: Vec<String> = self
            .covering_keys(range, bucket)
            .into_iter()
            .map(|(_, key)| key)
            .collect();
        if keys.is_empty() {
            return Ok(0);
        }
        let count = self.ctx.hll().count(&keys).await?;
        Ok(count)
    }

    pub async fn lifetime(&self) -> Result<u64> {
        self.ctx.hll().count(&[self.lifetime_key()]).await
    }

    /// Per-bucket distinct counts, one entry per covered bucket
    pub async fn buckets(&self, range: &DateRange, bucket: Bucket) -> Result<Vec<AnalyticBucket>> {
        let covering = self.covering_keys(range, bucket);
        if covering.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = covering.iter().map(|(_, key)| key.clone()).collect();
        let counts = self.ctx.hll().count_each(&keys).await?;
        Ok(covering
            .into_iter()
            .enumerate()
            .map(|(i, (start, _))| {
                AnalyticBucket::new(start, counts.get(i).copied().unwrap_or(0) as f64)
            })
            .collect())
    }

    /// Named timeframes read at their default resolution
    pub async fn get(&self, timeframe: Timeframe) -> Result<u64> {
        if timeframe.is_lifetime() {
            return self.lifetime().await;
        }
        let range = resolve_range(timeframe, self.ctx.now());
        let count = self.total_by_bucket(&range, timeframe.default_bucket()).await?;
        Ok(count)
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

    /// Union the sketches covering `range` into one expiring snapshot key
    pub async fn materialize(&self, range: &DateRange, bucket: Bucket) -> Result<String> {
        let keys: Vec<String> = self
            .covering_keys(range, bucket)
            .into_iter()
            .map(|(_, key)| key)
            .collect();
        let dest = MetricKeyEncoder::hll_snapshot_key(&self.key, bucket, &normalize_range(range, bucket));
        let ttl = bucket.expiration_seconds(keys.len() as u64);
        self.ctx.hll().merge(&dest, &keys, Some(ttl)).await?;
        debug!(key = %dest, sources = keys.len(), ttl, "materialized cardinality snapshot");
        Ok(dest)
    }
}

impl UniqueCounter for HllStore {
    fn init(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(HllStore::init(self))
    }

    fn record<'a>(&'a self, points: &'a [UniquePoint]) -> BoxFuture<'a, Result<()>> {
        Box::pin(HllStore::record(self, points))
    }

    fn get<'a>(&'a self, scope: &'a MetricScope) -> BoxFuture<'a, Result<f64>> {
        Box::pin(async move {
            let count = match scope {
                MetricScope::Timeframe(timeframe) => HllStore::get(self, *timeframe).await?,
                MetricScope::Range(range) => self.total(range).await?,
            };
            Ok(count as f64)
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
                    HllStore::get_buckets(self, *timeframe, bucket).await
                }
                MetricScope::Range(range) => self.buckets(range, bucket).await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::time::FixedClock;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
    }

    fn setup(now: DateTime<Utc>) -> (InMemoryBackend, HllStore) {
        let backend = InMemoryBackend::new();
        let ctx = AnalyticsContext::new(Arc::new(backend.clone()))
            .with_clock(Arc::new(FixedClock::new(now)));
        (backend, HllStore::new(&ctx, "v"))
    }

    #[tokio::test]
    async fn test_record_writes_every_resolution_in_one_batch() {
        let (backend, store) = setup(at(20, 0));
        store
            .record(&[
                UniquePoint::new("a", at(1, 10)),
                UniquePoint::new("a", at(1, 11)),
                UniquePoint::new("b", at(2, 10)),
            ])
            .await
            .unwrap();

        assert_eq!(backend.call_count("multi().execAsPipeline"), 1);
        assert_eq!(backend.hll_len("v:h:2024-01-01:10"), 1);
        assert_eq!(backend.hll_len("v:d:2024-01-01"), 1);
        assert_eq!(backend.hll_len("v:m:2024-01"), 2);
        assert_eq!(backend.hll_len("v:all"), 2);
    }

    #[tokio::test]
    async fn test_totals_union_across_buckets() {
        let (_backend, store) = setup(at(20, 0));
        store
            .record(&[
                UniquePoint::new("a", at(1, 10)),
                UniquePoint::new("a", at(2, 10)),
                UniquePoint::new("b", at(3, 10)),
            ])
            .await
            .unwrap();

        let range = DateRange::new(at(1, 12), at(2, 12));
        // normalised to whole days, so day 1 and day 2 are both covered
        assert_eq!(store.total(&range).await.unwrap(), 1);
        assert_eq!(store.total(&DateRange::new(at(1, 0), at(4, 0))).await.unwrap(), 2);
        assert_eq!(store.lifetime().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_buckets_report_each_period() {
        let (_backend, store) = setup(at(20, 0));
        store
            .record(&[UniquePoint::new("a", at(1, 10)), UniquePoint::new("b", at(1, 11))])
            .await
            .unwrap();

        let buckets = store
            .buckets(&DateRange::new(at(1, 0), at(3, 0)), Bucket::Day)
            .await
            .unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0], AnalyticBucket::new(at(1, 0), 2.0));
        assert_eq!(buckets[1], AnalyticBucket::new(at(2, 0), 0.0));
    }

    #[tokio::test]
    async fn test_get_uses_default_bucket() {
        let now = at(10, 12);
        let (backend, store) = setup(now);
        store
            .record(&[UniquePoint::new("a", now - Duration::hours(2))])
            .await
            .unwrap();

        assert_eq!(store.get(Timeframe::Last24Hours).await.unwrap(), 1);
        assert_eq!(store.get(Timeframe::Lifetime).await.unwrap(), 1);
        assert!(backend.calls().iter().any(|c| c == "pfCount"));
    }

    #[tokio::test]
    async fn test_lifetime_series_uses_configured_window() {
        let now = at(10, 12);
        let (_backend, store) = setup(now);
        let store = store.with_lifetime_series_timeframe(Timeframe::LastWeek);
        let buckets = store.get_buckets(Timeframe::Lifetime, Bucket::Day).await.unwrap();
        assert_eq!(buckets.len(), 8);
    }

    #[tokio::test]
    async fn test_materialize_snapshot() {
        let (backend, store) = setup(at(20, 0));
        store
            .record(&[UniquePoint::new("a", at(1, 10)), UniquePoint::new("b", at(2, 10))])
            .await
            .unwrap();

        let key = store
            .materialize(&DateRange::new(at(1, 0), at(3, 0)), Bucket::Day)
            .await
            .unwrap();
        assert_eq!(backend.hll_len(&key), 2);
        assert_eq!(backend.ttl(&key), Some(Bucket::Day.expiration_seconds(2)));
    }
}
