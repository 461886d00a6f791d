//! Scalar metrics domain
//!
//! Plain series read through named aggregations, plus unique counters
//! backed by either rollup sketches or a first-seen filter. Stat names are
//! the aggregation names for series metrics and the metric name for
//! counters.

use crate::backend::Aggregation;
use crate::compare::{previous_period, ChangeReport};
use crate::config::{BloomConfig, TimeSeriesConfig};
use crate::context::AnalyticsContext;
use crate::error::{AnalyticsError, Result};
use crate::metrics::MetricKeyEncoder;
use crate::query::{ts, StandardQuery};
use crate::store::{
    BloomCounterStore, HllStore, TimeSeriesPoint, TimeSeriesStore, UniqueCounter, UniquePoint,
};
use crate::time::{AnalyticBucket, Bucket, MetricScope, Timeframe};
use futures::future::try_join_all;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

#[derive(Debug, Clone)]
enum MetricDef {
    TimeSeries {
        aggregations: Vec<(String, Aggregation)>,
        config: TimeSeriesConfig,
    },
    Hll,
    BloomCounter {
        bloom: Option<BloomConfig>,
    },
}

enum ScalarMetric {
    TimeSeries(TimeSeriesStore),
    Hll(HllStore),
    BloomCounter(BloomCounterStore),
}

impl ScalarMetric {
    fn unique(&self) -> Option<&dyn UniqueCounter> {
        match self {
            ScalarMetric::TimeSeries(_) => None,
            ScalarMetric::Hll(store) => Some(store),
            ScalarMetric::BloomCounter(store) => Some(store),
        }
    }

    async fn init(&self) -> Result<()> {
        match self {
            ScalarMetric::TimeSeries(store) => store.init().await,
            ScalarMetric::Hll(store) => store.init().await,
            ScalarMetric::BloomCounter(store) => store.init().await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyticsMetricsBuilder {
    ctx: AnalyticsContext,
    prefix: String,
    metrics: Vec<(String, MetricDef)>,
    compactions: Vec<(String, Aggregation, Bucket)>,
    lifetime_series_timeframe: Timeframe,
}

impl AnalyticsMetricsBuilder {
    pub fn new(ctx: &AnalyticsContext, prefix: impl Into<String>) -> Self {
        AnalyticsMetricsBuilder {
            ctx: ctx.clone(),
            prefix: prefix.into(),
            metrics: Vec::new(),
            compactions: Vec::new(),
            lifetime_series_timeframe: Timeframe::LastYear,
        }
    }

    fn define(mut self, name: String, def: MetricDef) -> Self {
        self.metrics.retain(|(n, _)| *n != name);
        self.metrics.push((name, def));
        self
    }

    /// Series `<prefix>:<name>` read under each `(stat name, aggregation)`
    pub fn timeseries_metric<I, S>(
        self,
        name: impl Into<String>,
        aggregations: I,
        config: TimeSeriesConfig,
    ) -> Self
    where
        I: IntoIterator<Item = (S, Aggregation)>,
        S: Into<String>,
    {
        let def = MetricDef::TimeSeries {
            aggregations: aggregations
                .into_iter()
                .map(|(stat, agg)| (stat.into(), agg))
                .collect(),
            config,
        };
        self.define(name.into(), def)
    }

    /// Downsampled child of the series metric `metric`, checked at `build`
    pub fn compaction(mut self, metric: impl Into<String>, aggregation: Aggregation, bucket: Bucket) -> Self {
        self.compactions.push((metric.into(), aggregation, bucket));
        self
    }

    pub fn hll_metric(self, name: impl Into<String>) -> Self {
        self.define(name.into(), MetricDef::Hll)
    }

    pub fn bloom_counter_metric(self, name: impl Into<String>, bloom: Option<BloomConfig>) -> Self {
        self.define(name.into(), MetricDef::BloomCounter { bloom })
    }

    /// Window used by counters when a lifetime series is requested
    pub fn lifetime_series_timeframe(mut self, timeframe: Timeframe) -> Self {
        self.lifetime_series_timeframe = timeframe;
        self
    }

    pub fn build(self) -> Result<AnalyticsMetrics> {
        for (metric, _, _) in &self.compactions {
            match self.metrics.iter().find(|(n, _)| n == metric) {
                Some((_, MetricDef::TimeSeries { .. })) => {}
                Some(_) => {
                    return Err(AnalyticsError::MetricKindMismatch {
                        metric: metric.clone(),
                        expected: "timeseries".to_string(),
                    })
                }
                None => return Err(AnalyticsError::UnknownMetric(metric.clone())),
            }
        }

        let mut stores = Vec::with_capacity(self.metrics.len());
        let mut query = StandardQuery::new(&self.ctx);
        let mut stat_names = BTreeSet::new();

        for (name, def) in self.metrics {
            let key = MetricKeyEncoder::base_key(&self.prefix, &name)?;
            let metric = match def {
                MetricDef::TimeSeries {
                    aggregations,
                    config,
                } => {
                    let mut store = TimeSeriesStore::new(&self.ctx, key, config);
                    for (_, aggregation, bucket) in self.compactions.iter().filter(|(m, _, _)| *m == name) {
                        store.compact(*aggregation, *bucket)?;
                    }
                    for (stat, aggregation) in aggregations {
                        if !stat_names.insert(stat.clone()) {
                            return Err(duplicate_stat(&stat));
                        }
                        query = query.metric(stat, ts(store.key(), aggregation));
                    }
                    ScalarMetric::TimeSeries(store)
                }
                MetricDef::Hll => {
                    if !stat_names.insert(name.clone()) {
                        return Err(duplicate_stat(&name));
                    }
                    ScalarMetric::Hll(
                        HllStore::new(&self.ctx, key)
                            .with_lifetime_series_timeframe(self.lifetime_series_timeframe),
                    )
                }
                MetricDef::BloomCounter { bloom } => {
                    if !stat_names.insert(name.clone()) {
                        return Err(duplicate_stat(&name));
                    }
                    let mut store = BloomCounterStore::new(&self.ctx, &key)
                        .with_lifetime_series_timeframe(self.lifetime_series_timeframe);
                    if let Some(bloom) = bloom {
                        bloom.validate()?;
                        store = store.with_bloom_config(bloom);
                    }
                    ScalarMetric::BloomCounter(store)
                }
            };
            stores.push((name, metric));
        }

        Ok(AnalyticsMetrics {
            ctx: self.ctx,
            prefix: self.prefix,
            stores,
            query,
        })
    }
}

fn duplicate_stat(name: &str) -> AnalyticsError {
    AnalyticsError::InvalidMeasure {
        measure: name.to_string(),
        reason: "stat name declared twice".to_string(),
    }
}

pub type MetricStats = BTreeMap<String, f64>;
pub type MetricSeries = BTreeMap<String, Vec<AnalyticBucket>>;

pub struct AnalyticsMetrics {
    ctx: AnalyticsContext,
    prefix: String,
    stores: Vec<(String, ScalarMetric)>,
    query: StandardQuery,
}

impl std::fmt::Debug for AnalyticsMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsMetrics")
            .field("prefix", &self.prefix)
            .field("metrics", &self.metric_names().collect::<Vec<_>>())
            .finish()
    }
}

impl AnalyticsMetrics {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.stores.iter().map(|(name, _)| name.as_str())
    }

    fn find(&self, name: &str) -> Result<&ScalarMetric> {
        self.stores
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, metric)| metric)
            .ok_or_else(|| AnalyticsError::UnknownMetric(name.to_string()))
    }

    pub fn timeseries_store(&self, name: &str) -> Option<&TimeSeriesStore> {
        match self.find(name) {
            Ok(ScalarMetric::TimeSeries(store)) => Some(store),
            _ => None,
        }
    }

    pub fn unique_store(&self, name: &str) -> Option<&dyn UniqueCounter> {
        self.find(name).ok().and_then(ScalarMetric::unique)
    }

    fn counters(&self) -> impl Iterator<Item = (&str, &dyn UniqueCounter)> {
        self.stores
            .iter()
            .filter_map(|(name, metric)| metric.unique().map(|c| (name.as_str(), c)))
    }

    pub async fn init(&self) -> Result<()> {
        try_join_all(self.stores.iter().map(|(_, metric)| metric.init())).await?;
        Ok(())
    }

    pub async fn stats(&self, scope: &MetricScope) -> Result<MetricStats> {
        let (mut stats, counts) = futures::try_join!(
            self.query.scope(scope),
            try_join_all(self.counters().map(|(_, counter)| counter.get(scope)))
        )?;
        stats.extend(
            self.counters()
                .map(|(name, _)| name.to_string())
                .zip(counts),
        );
        Ok(stats)
    }

    pub async fn series(&self, scope: &MetricScope, bucket: Bucket) -> Result<MetricSeries> {
        let (mut series, buckets) = futures::try_join!(
            self.query.buckets_by_scope(scope, bucket),
            try_join_all(
                self.counters()
                    .map(|(_, counter)| counter.get_buckets(scope, bucket))
            )
        )?;
        series.extend(
            self.counters()
                .map(|(name, _)| name.to_string())
                .zip(buckets),
        );
        Ok(series)
    }

    pub async fn change(
        &self,
        scope: &MetricScope,
        previous: Option<MetricScope>,
    ) -> Result<ChangeReport<MetricStats>> {
        let previous = match previous {
            Some(previous) => previous,
            None => previous_period(scope, self.ctx.now())?.into(),
        };
        let (current, previous) = futures::try_join!(self.stats(scope), self.stats(&previous))?;
        Ok(ChangeReport::compute(current, previous))
    }

    pub async fn record(&self, metric: &str, points: &[TimeSeriesPoint]) -> Result<()> {
        match self.find(metric)? {
            ScalarMetric::TimeSeries(store) => store.record(points).await,
            _ => Err(AnalyticsError::MetricKindMismatch {
                metric: metric.to_string(),
                expected: "timeseries".to_string(),
            }),
        }
    }

    pub async fn record_unique(&self, metric: &str, points: &[UniquePoint]) -> Result<()> {
        match self.find(metric)?.unique() {
            Some(counter) => counter.record(points).await,
            None => Err(AnalyticsError::MetricKindMismatch {
                metric: metric.to_string(),
                expected: "unique counter".to_string(),
            }),
        }
    }

    /// Backfill compactions of the named series metrics; empty means all
    pub async fn backfill_compactions(&self, metrics: &[&str]) -> Result<usize> {
        let targets: Vec<&TimeSeriesStore> = if metrics.is_empty() {
            self.stores
                .iter()
                .filter_map(|(_, metric)| match metric {
                    ScalarMetric::TimeSeries(store) => Some(store),
                    _ => None,
                })
                .collect()
        } else {
            metrics
                .iter()
                .map(|name| match self.find(name)? {
                    ScalarMetric::TimeSeries(store) => Ok(store),
                    _ => Err(AnalyticsError::MetricKindMismatch {
                        metric: name.to_string(),
                        expected: "timeseries".to_string(),
                    }),
                })
                .collect::<Result<_>>()?
        };

        let written = try_join_all(targets.iter().map(|store| store.backfill_compactions())).await?;
        let total: usize = written.into_iter().sum();
        info!(prefix = %self.prefix, metrics = targets.len(), buckets = total, "backfilled compactions");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::compare::{ChangeStatus, ChangeTree};
    use crate::time::FixedClock;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
    }

    fn builder(ctx: &AnalyticsContext) -> AnalyticsMetricsBuilder {
        AnalyticsMetricsBuilder::new(ctx, "app")
            .timeseries_metric(
                "volume",
                [("volume", Aggregation::Sum), ("peak", Aggregation::Max)],
                TimeSeriesConfig::default(),
            )
            .compaction("volume", Aggregation::Sum, Bucket::Day)
            .hll_metric("visitors")
            .bloom_counter_metric("signups", None)
    }

    async fn setup() -> (InMemoryBackend, AnalyticsMetrics) {
        let backend = InMemoryBackend::new();
        let ctx = AnalyticsContext::new(Arc::new(backend.clone()))
            .with_clock(Arc::new(FixedClock::new(at(10, 0))));
        let metrics = builder(&ctx).build().unwrap();
        metrics.init().await.unwrap();

        metrics
            .record(
                "volume",
                &[
                    TimeSeriesPoint::new(at(8, 1), 10.0),
                    TimeSeriesPoint::new(at(8, 2), 5.0),
                    TimeSeriesPoint::new(at(2, 1), 4.0),
                ],
            )
            .await
            .unwrap();
        let ids = [
            UniquePoint::new("a", at(8, 1)),
            UniquePoint::new("b", at(8, 2)),
            UniquePoint::new("a", at(9, 1)),
        ];
        metrics.record_unique("visitors", &ids).await.unwrap();
        metrics.record_unique("signups", &ids).await.unwrap();
        (backend, metrics)
    }

    #[tokio::test]
    async fn test_stats_merge_series_and_counters() {
        let (_backend, metrics) = setup().await;
        let stats = metrics.stats(&Timeframe::LastWeek.into()).await.unwrap();
        assert_eq!(stats["volume"], 15.0);
        assert_eq!(stats["peak"], 10.0);
        assert_eq!(stats["visitors"], 2.0);
        assert_eq!(stats["signups"], 2.0);
        assert_eq!(stats.len(), 4);

        let lifetime = metrics.stats(&Timeframe::Lifetime.into()).await.unwrap();
        assert_eq!(lifetime["volume"], 19.0);
        assert_eq!(lifetime["signups"], 2.0);
    }

    #[tokio::test]
    async fn test_series_has_every_stat() {
        let (_backend, metrics) = setup().await;
        let series = metrics
            .series(&Timeframe::LastWeek.into(), Bucket::Day)
            .await
            .unwrap();
        assert_eq!(series["volume"].len(), 7);
        assert_eq!(series["visitors"].len(), 7);
        assert!(series.contains_key("signups"));
    }

    #[tokio::test]
    async fn test_change_against_previous_window() {
        let (_backend, metrics) = setup().await;
        let report = metrics.change(&Timeframe::LastWeek.into(), None).await.unwrap();
        assert_eq!(report.previous["volume"], 4.0);

        let volume = report.percent.get("volume").and_then(ChangeTree::as_leaf).unwrap();
        assert_eq!(volume.status, ChangeStatus::Increase);
        assert_eq!(volume.value, Some(275.0));
        let visitors = report.percent.get("visitors").and_then(ChangeTree::as_leaf).unwrap();
        assert_eq!(visitors.status, ChangeStatus::New);
    }

    #[tokio::test]
    async fn test_record_checks_metric_kind() {
        let (_backend, metrics) = setup().await;
        let when = at(9, 0);
        assert!(matches!(
            metrics.record("visitors", &[TimeSeriesPoint::new(when, 1.0)]).await,
            Err(AnalyticsError::MetricKindMismatch { .. })
        ));
        assert!(matches!(
            metrics.record_unique("volume", &[UniquePoint::new("x", when)]).await,
            Err(AnalyticsError::MetricKindMismatch { .. })
        ));
        assert!(matches!(
            metrics.record("nope", &[]).await,
            Err(AnalyticsError::UnknownMetric(_))
        ));
    }

    #[tokio::test]
    async fn test_backfill_compactions() {
        let (backend, metrics) = setup().await;
        assert_eq!(metrics.backfill_compactions(&[]).await.unwrap(), 2);
        assert_eq!(backend.samples("app:volume:SUM").len(), 2);
        assert!(matches!(
            metrics.backfill_compactions(&["visitors"]).await,
            Err(AnalyticsError::MetricKindMismatch { .. })
        ));
    }

    #[test]
    fn test_store_accessors() {
        let ctx = AnalyticsContext::new(Arc::new(InMemoryBackend::new()));
        let metrics = builder(&ctx).build().unwrap();
        assert_eq!(metrics.timeseries_store("volume").unwrap().key(), "app:volume");
        assert!(metrics.timeseries_store("visitors").is_none());
        assert!(metrics.unique_store("signups").is_some());
        assert!(metrics.unique_store("volume").is_none());
        assert_eq!(
            metrics.metric_names().collect::<Vec<_>>(),
            vec!["volume", "visitors", "signups"]
        );
    }

    #[test]
    fn test_build_rejects_bad_definitions() {
        let ctx = AnalyticsContext::new(Arc::new(InMemoryBackend::new()));
        assert!(matches!(
            builder(&ctx).compaction("visitors", Aggregation::Sum, Bucket::Day).build(),
            Err(AnalyticsError::MetricKindMismatch { .. })
        ));
        assert!(matches!(
            builder(&ctx).compaction("nope", Aggregation::Sum, Bucket::Day).build(),
            Err(AnalyticsError::UnknownMetric(_))
        ));
        assert!(matches!(
            builder(&ctx)
                .timeseries_metric("other", [("visitors", Aggregation::Sum)], TimeSeriesConfig::default())
                .build(),
            Err(AnalyticsError::InvalidMeasure { .. })
        ));
        assert!(matches!(
            builder(&ctx).hll_metric("bad=name").build(),
            Err(AnalyticsError::InvalidIdentifier { .. })
        ));
    }
}
