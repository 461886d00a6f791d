//! Filtered aggregates across dimensional series
//!
//! `DimensionalQuery` reduces every matching series into one value by
//! grouping on the shared `baseKey` label. `GroupedQuery` groups on a
//! dimension instead and maps the groups back onto a declared value set,
//! matching labels case-insensitively.

use super::{first_series_value, first_value, inclusive_bounds, to_buckets, Window};
use crate::backend::{Aggregation, RangeAggregation, RangeBound};
use crate::context::AnalyticsContext;
use crate::error::Result;
use crate::metrics::{SeriesFilter, BASE_KEY_LABEL};
use crate::services::TsSeries;
use crate::time::{AnalyticBucket, Bucket, DateRange, MetricScope, Timeframe, FOREVER_MS};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Backend request shape for one read
struct Read {
    from: RangeBound,
    to: RangeBound,
    aggregation: RangeAggregation,
}

/// Single-aggregate read; `span` picks the bucket width for ranges
fn stat_read(aggregation: Aggregation, window: Window, span: impl Fn(&DateRange) -> i64) -> Option<Read> {
    match window {
        Window::Lifetime => Some(Read {
            from: RangeBound::Earliest,
            to: RangeBound::Latest,
            aggregation: RangeAggregation::new(aggregation, FOREVER_MS),
        }),
        Window::Range(range) => inclusive_bounds(&range).map(|(from, to)| Read {
            from,
            to,
            aggregation: RangeAggregation::new(aggregation, span(&range)).align(range.start_ms()),
        }),
    }
}

fn bucket_read(aggregation: Aggregation, window: Window, bucket: Bucket) -> Option<Read> {
    let per_bucket = RangeAggregation::new(aggregation, bucket.width_ms()).with_empty();
    match window {
        Window::Lifetime => Some(Read {
            from: RangeBound::Earliest,
            to: RangeBound::Latest,
            aggregation: per_bucket,
        }),
        Window::Range(range) => inclusive_bounds(&range).map(|(from, to)| Read {
            from,
            to,
            aggregation: per_bucket.align(range.start_ms()),
        }),
    }
}

#[derive(Debug, Clone)]
pub struct DimensionalQuery {
    ctx: AnalyticsContext,
    filter: SeriesFilter,
    aggregation: Aggregation,
    reducer: Aggregation,
}

impl DimensionalQuery {
    pub fn new(ctx: &AnalyticsContext, filter: SeriesFilter, aggregation: Aggregation) -> Self {
        DimensionalQuery {
            ctx: ctx.clone(),
            filter,
            aggregation,
            reducer: Aggregation::Sum,
        }
    }

    /// Cross-series reducer; LAST is applied as SUM
    pub fn with_reducer(mut self, reducer: Aggregation) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn filter(&self) -> &SeriesFilter {
        &self.filter
    }

    async fn fetch(&self, read: Read) -> Result<Vec<TsSeries>> {
        self.ctx
            .timeseries()
            .mrange_group_by(
                &self.filter,
                read.from,
                read.to,
                read.aggregation,
                BASE_KEY_LABEL,
                self.reducer,
            )
            .await
    }

    async fn stat(&self, window: Window) -> Result<f64> {
        match stat_read(self.aggregation, window, |_| FOREVER_MS) {
            Some(read) => Ok(first_series_value(&self.fetch(read).await?)),
            None => Ok(0.0),
        }
    }

    async fn series(&self, window: Window, bucket: Bucket) -> Result<Vec<AnalyticBucket>> {
        match bucket_read(self.aggregation, window, bucket) {
            Some(read) => {
                let series = self.fetch(read).await?;
                Ok(series
                    .first()
                    .map(|s| to_buckets(&s.samples))
                    .unwrap_or_default())
            }
            None => Ok(Vec::new()),
        }
    }

    pub async fn lifetime(&self) -> Result<f64> {
        self.stat(Window::Lifetime).await
    }

    pub async fn range(&self, range: &DateRange) -> Result<f64> {
        self.stat(Window::Range(*range)).await
    }

    pub async fn timeframe(&self, timeframe: Timeframe) -> Result<f64> {
        self.stat(Window::from_timeframe(timeframe, self.ctx.now())).await
    }

    pub async fn scope(&self, scope: &MetricScope) -> Result<f64> {
        self.stat(Window::from_scope(scope, self.ctx.now())).await
    }

    pub async fn buckets(&self, range: &DateRange, bucket: Bucket) -> Result<Vec<AnalyticBucket>> {
        self.series(Window::Range(*range), bucket).await
    }

    pub async fn buckets_by_timeframe(&self, timeframe: Timeframe, bucket: Bucket) -> Result<Vec<AnalyticBucket>> {
        self.series(Window::from_timeframe(timeframe, self.ctx.now()), bucket)
            .await
    }

    pub async fn buckets_by_scope(&self, scope: &MetricScope, bucket: Bucket) -> Result<Vec<AnalyticBucket>> {
        self.series(Window::from_scope(scope, self.ctx.now()), bucket)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct GroupedQuery {
    ctx: AnalyticsContext,
    filter: SeriesFilter,
    aggregation: Aggregation,
    group_by: String,
    values: Vec<String>,
    reducer: Aggregation,
    /// lowercase label -> declared value
    canonical: HashMap<String, String>,
}

impl GroupedQuery {
    pub fn new<I, S>(
        ctx: &AnalyticsContext,
        filter: SeriesFilter,
        aggregation: Aggregation,
        group_by: impl Into<String>,
        values: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        let canonical = values
            .iter()
            .map(|v| (v.to_lowercase(), v.clone()))
            .collect();
        GroupedQuery {
            ctx: ctx.clone(),
            filter,
            aggregation,
            group_by: group_by.into(),
            values,
            reducer: Aggregation::Sum,
            canonical,
        }
    }

    /// Cross-series reducer; LAST is applied as SUM
    pub fn with_reducer(mut self, reducer: Aggregation) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn group_by(&self) -> &str {
        &self.group_by
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Declared value for a backend label, exact match first
    fn canonical_group(&self, raw: &str) -> Option<&str> {
        if let Some(exact) = self.values.iter().find(|v| *v == raw) {
            return Some(exact.as_str());
        }
        self.canonical.get(&raw.to_lowercase()).map(String::as_str)
    }

    /// Series paired with their declared group; unknown labels are dropped
    fn resolve<'s>(&'s self, series: &'s [TsSeries]) -> impl Iterator<Item = (&'s str, &'s TsSeries)> + 's {
        series.iter().filter_map(move |s| {
            let raw = s.labels.get(&self.group_by).filter(|v| !v.is_empty())?;
            match self.canonical_group(raw) {
                Some(group) => Some((group, s)),
                None => {
                    debug!(label = %self.group_by, value = %raw, "dropping unrecognised group");
                    None
                }
            }
        })
    }

    fn totals(&self, series: &[TsSeries]) -> BTreeMap<String, f64> {
        let mut output: BTreeMap<String, f64> =
            self.values.iter().map(|v| (v.clone(), 0.0)).collect();
        for (group, s) in self.resolve(series) {
            if let Some(total) = output.get_mut(group) {
                *total += first_value(&s.samples);
            }
        }
        output
    }

    fn bucketed(&self, series: &[TsSeries]) -> BTreeMap<String, Vec<AnalyticBucket>> {
        let mut merged: BTreeMap<&str, BTreeMap<i64, f64>> = BTreeMap::new();
        for (group, s) in self.resolve(series) {
            let by_ts = merged.entry(group).or_default();
            for sample in &s.samples {
                *by_ts.entry(sample.timestamp_ms).or_insert(0.0) += sample.value;
            }
        }

        let mut output: BTreeMap<String, Vec<AnalyticBucket>> =
            self.values.iter().map(|v| (v.clone(), Vec::new())).collect();
        for (group, by_ts) in merged {
            output.insert(
                group.to_string(),
                by_ts
                    .into_iter()
                    .map(|(ts, value)| AnalyticBucket::from_millis(ts, value))
                    .collect(),
            );
        }
        output
    }

    async fn fetch(&self, read: Read) -> Result<Vec<TsSeries>> {
        self.ctx
            .timeseries()
            .mrange_group_by(
                &self.filter,
                read.from,
                read.to,
                read.aggregation,
                &self.group_by,
                self.reducer,
            )
            .await
    }

    async fn stat(&self, window: Window) -> Result<BTreeMap<String, f64>> {
        // one bucket spanning the whole range
        match stat_read(self.aggregation, window, DateRange::span_ms) {
            Some(read) => {
                let series = self.fetch(read).await?;
                Ok(self.totals(&series))
            }
            None => Ok(self.totals(&[])),
        }
    }

    async fn series(&self, window: Window, bucket: Bucket) -> Result<BTreeMap<String, Vec<AnalyticBucket>>> {
        match bucket_read(self.aggregation, window, bucket) {
            Some(read) => {
                let series = self.fetch(read).await?;
                Ok(self.bucketed(&series))
            }
            None => Ok(self.bucketed(&[])),
        }
    }

    pub async fn lifetime(&self) -> Result<BTreeMap<String, f64>> {
        self.stat(Window::Lifetime).await
    }

    pub async fn range(&self, range: &DateRange) -> Result<BTreeMap<String, f64>> {
        self.stat(Window::Range(*range)).await
    }

    pub async fn timeframe(&self, timeframe: Timeframe) -> Result<BTreeMap<String, f64>> {
        self.stat(Window::from_timeframe(timeframe, self.ctx.now())).await
    }

    pub async fn scope(&self, scope: &MetricScope) -> Result<BTreeMap<String, f64>> {
        self.stat(Window::from_scope(scope, self.ctx.now())).await
    }

    pub async fn buckets(
        &self,
        range: &DateRange,
        bucket: Bucket,
    ) -> Result<BTreeMap<String, Vec<AnalyticBucket>>> {
        self.series(Window::Range(*range), bucket).await
    }

    pub async fn buckets_by_timeframe(
        &self,
        timeframe: Timeframe,
        bucket: Bucket,
    ) -> Result<BTreeMap<String, Vec<AnalyticBucket>>> {
        self.series(Window::from_timeframe(timeframe, self.ctx.now()), bucket)
            .await
    }

    pub async fn buckets_by_scope(
        &self,
        scope: &MetricScope,
        bucket: Bucket,
    ) -> Result<BTreeMap<String, Vec<AnalyticBucket>>> {
        self.series(Window::from_scope(scope, self.ctx.now()), bucket)
            .await
    }
}
