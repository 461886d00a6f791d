//! Standard multi-metric query

use super::{first_value, inclusive_bounds, to_buckets, Window};
use crate::backend::{Aggregation, RangeAggregation, RangeBound};
use crate::context::AnalyticsContext;
use crate::error::Result;
use crate::time::{AnalyticBucket, Bucket, DateRange, MetricScope, Timeframe, FOREVER_MS};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Series key and the aggregation to read it with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSource {
    pub key: String,
    pub aggregation: Aggregation,
}

pub fn ts(key: impl Into<String>, aggregation: Aggregation) -> MetricSource {
    MetricSource {
        key: key.into(),
        aggregation,
    }
}

#[derive(Debug, Clone)]
pub struct StandardQuery {
    ctx: AnalyticsContext,
    metrics: Vec<(String, MetricSource)>,
}

impl StandardQuery {
    pub fn new(ctx: &AnalyticsContext) -> Self {
        StandardQuery {
            ctx: ctx.clone(),
            metrics: Vec::new(),
        }
    }

    /// Add or replace the metric called `name`
    pub fn metric(mut self, name: impl Into<String>, source: MetricSource) -> Self {
        let name = name.into();
        match self.metrics.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = source,
            None => self.metrics.push((name, source)),
        }
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(|(name, _)| name.as_str())
    }

    async fn stat(&self, source: &MetricSource, window: Window) -> Result<f64> {
        let (from, to, align) = match window {
            Window::Lifetime => (RangeBound::Earliest, RangeBound::Latest, 0),
            Window::Range(range) => match inclusive_bounds(&range) {
                Some((from, to)) => (from, to, range.start_ms()),
                None => return Ok(0.0),
            },
        };
        let aggregation = RangeAggregation::new(source.aggregation, FOREVER_MS).align(align);
        let samples = self
            .ctx
            .timeseries()
            .range(&source.key, from, to, aggregation)
            .await?;
        Ok(first_value(&samples))
    }

    async fn series(&self, source: &MetricSource, window: Window, bucket: Bucket) -> Result<Vec<AnalyticBucket>> {
        let (from, to, align) = match window {
            Window::Lifetime => (RangeBound::Earliest, RangeBound::Latest, 0),
            Window::Range(range) => match inclusive_bounds(&range) {
                Some((from, to)) => (from, to, range.start_ms()),
                None => return Ok(Vec::new()),
            },
        };
        let aggregation = RangeAggregation::new(source.aggregation, bucket.width_ms())
            .align(align)
            .with_empty();
        let samples = self
            .ctx
            .timeseries()
            .range(&source.key, from, to, aggregation)
            .await?;
        Ok(to_buckets(&samples))
    }

    async fn stats(&self, window: Window) -> Result<BTreeMap<String, f64>> {
        let values = try_join_all(
            self.metrics
                .iter()
                .map(|(_, source)| self.stat(source, window)),
        )
        .await?;
        Ok(self.names().map(str::to_string).zip(values).collect())
    }

    async fn all_series(&self, window: Window, bucket: Bucket) -> Result<BTreeMap<String, Vec<AnalyticBucket>>> {
        let series = try_join_all(
            self.metrics
                .iter()
                .map(|(_, source)| self.series(source, window, bucket)),
        )
        .await?;
        Ok(self.names().map(str::to_string).zip(series).collect())
    }

    pub async fn lifetime(&self) -> Result<BTreeMap<String, f64>> {
        self.stats(Window::Lifetime).await
    }

    pub async fn range(&self, range: &DateRange) -> Result<BTreeMap<String, f64>> {
        self.stats(Window::Range(*range)).await
    }

    pub async fn timeframe(&self, timeframe: Timeframe) -> Result<BTreeMap<String, f64>> {
        self.stats(Window::from_timeframe(timeframe, self.ctx.now()))
            .await
    }

    pub async fn scope(&self, scope: &MetricScope) -> Result<BTreeMap<String, f64>> {
        self.stats(Window::from_scope(scope, self.ctx.now())).await
    }

    pub async fn buckets(
        &self,
        range: &DateRange,
        bucket: Bucket,
    ) -> Result<BTreeMap<String, Vec<AnalyticBucket>>> {
        self.all_series(Window::Range(*range), bucket).await
    }

    /// Whole-history series; month buckets unless told otherwise
    pub async fn lifetime_buckets(
        &self,
        bucket: Option<Bucket>,
    ) -> Result<BTreeMap<String, Vec<AnalyticBucket>>> {
        self.all_series(Window::Lifetime, bucket.unwrap_or(Bucket::Month))
            .await
    }

    pub async fn buckets_by_timeframe(
        &self,
        timeframe: Timeframe,
        bucket: Bucket,
    ) -> Result<BTreeMap<String, Vec<AnalyticBucket>>> {
        self.all_series(Window::from_timeframe(timeframe, self.ctx.now()), bucket)
            .await
    }

    pub async fn buckets_by_scope(
        &self,
        scope: &MetricScope,
        bucket: Bucket,
    ) -> Result<BTreeMap<String, Vec<AnalyticBucket>>> {
        self.all_series(Window::from_scope(scope, self.ctx.now()), bucket)
            .await
    }
}
