//! Time-series service

use crate::backend::{Aggregation, GroupBy, LabeledSeries, RangeAggregation, RangeBound, Sample, TsPoint};
use crate::config::TimeSeriesConfig;
use crate::context::AnalyticsContext;
use crate::error::Result;
use crate::metrics::SeriesFilter;
use crate::time::{AnalyticBucket, Bucket};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Sample with empty buckets normalised to 0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TsSample {
    pub timestamp_ms: i64,
    pub value: f64,
}

impl TsSample {
    pub fn to_bucket(&self) -> AnalyticBucket {
        AnalyticBucket::from_millis(self.timestamp_ms, self.value)
    }
}

impl From<Sample> for TsSample {
    fn from(sample: Sample) -> Self {
        TsSample {
            timestamp_ms: sample.timestamp_ms,
            value: sample.value.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TsSeries {
    pub key: String,
    pub labels: BTreeMap<String, String>,
    pub samples: Vec<TsSample>,
}

impl From<LabeledSeries> for TsSeries {
    fn from(series: LabeledSeries) -> Self {
        TsSeries {
            key: series.key,
            labels: series.labels,
            samples: series.samples.into_iter().map(TsSample::from).collect(),
        }
    }
}

/// Downsampling rule from a source series into a derived key
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompactionRule {
    pub aggregation: Aggregation,
    pub bucket_ms: i64,
    pub retention_hrs: u64,
}

impl CompactionRule {
    pub fn new(aggregation: Aggregation, bucket: Bucket) -> Self {
        CompactionRule {
            aggregation,
            bucket_ms: bucket.width_ms(),
            retention_hrs: 0,
        }
    }
}

pub struct TimeSeriesService<'a> {
    ctx: &'a AnalyticsContext,
}

impl<'a> TimeSeriesService<'a> {
    pub(crate) fn new(ctx: &'a AnalyticsContext) -> Self {
        TimeSeriesService { ctx }
    }

    /// Create the key; an existing key is success and is only altered when
    /// `reconcile_existing` is set
    pub async fn ensure_key(&self, key: &str, config: &TimeSeriesConfig) -> Result<()> {
        let options = config.create_options();
        match self.ctx.backend().ts_create(key, &options).await {
            Ok(()) => {
                debug!(key = %key, "provisioned time series");
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                if !config.reconcile_existing {
                    debug!(key = %key, "time series already exists");
                    return Ok(());
                }
                info!(key = %key, "reconciling existing time series settings");
                self.ctx.backend().ts_alter(key, &options).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ensure the destination key (LAST policy) and the downsampling rule
    pub async fn ensure_compaction_rule(
        &self,
        source_key: &str,
        dest_key: &str,
        rule: &CompactionRule,
    ) -> Result<()> {
        let dest_config = TimeSeriesConfig {
            retention_hrs: rule.retention_hrs,
            ..TimeSeriesConfig::default()
        };
        self.ensure_key(dest_key, &dest_config).await?;

        match self
            .ctx
            .backend()
            .ts_create_rule(source_key, dest_key, rule.aggregation, rule.bucket_ms, 0)
            .await
        {
            Ok(()) => {
                debug!(source = %source_key, dest = %dest_key, agg = %rule.aggregation, "declared compaction rule");
                Ok(())
            }
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn add(&self, points: &[TsPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        self.ctx.backend().ts_madd(points).await?;
        Ok(())
    }

    pub async fn range(
        &self,
        key: &str,
        from: RangeBound,
        to: RangeBound,
        aggregation: RangeAggregation,
    ) -> Result<Vec<TsSample>> {
        let samples = self
            .ctx
            .backend()
            .ts_range(key, from, to, Some(aggregation))
            .await?;
        Ok(samples.into_iter().map(TsSample::from).collect())
    }

    pub async fn range_raw(&self, key: &str, from: RangeBound, to: RangeBound) -> Result<Vec<TsSample>> {
        let samples = self.ctx.backend().ts_range(key, from, to, None).await?;
        Ok(samples.into_iter().map(TsSample::from).collect())
    }

    pub async fn mrange(
        &self,
        filter: &SeriesFilter,
        from: RangeBound,
        to: RangeBound,
        aggregation: RangeAggregation,
    ) -> Result<Vec<TsSeries>> {
        let filters = filter.expressions();
        let series = self
            .ctx
            .backend()
            .ts_mrange_with_labels(from, to, &filters, Some(aggregation))
            .await?;
        Ok(series.into_iter().map(TsSeries::from).collect())
    }

    /// Multi-range reduced per value of `label`
    ///
    /// LAST is reduced as SUM across series. Without native group-by the
    /// reduction happens here over a plain multi-range.
    pub async fn mrange_group_by(
        &self,
        filter: &SeriesFilter,
        from: RangeBound,
        to: RangeBound,
        aggregation: RangeAggregation,
        label: &str,
        reducer: Aggregation,
    ) -> Result<Vec<TsSeries>> {
        let effective = reducer.cross_series();
        if effective != reducer {
            debug!(requested = %reducer, using = %effective, "substituting cross-series reducer");
        }
        let group_by = GroupBy {
            label: label.to_string(),
            reducer: effective,
        };
        let filters = filter.expressions();
        let backend = self.ctx.backend();

        let series = if self.ctx.capabilities().supports_native_group_by {
            backend
                .ts_mrange_group_by(from, to, &filters, &group_by, Some(aggregation))
                .await?
        } else {
            let raw = backend
                .ts_mrange_with_labels(from, to, &filters, Some(aggregation))
                .await?;
            reduce_groups(raw, &group_by)
        };
        Ok(series.into_iter().map(TsSeries::from).collect())
    }

    /// Re-write the full source history, pre-aggregated, into `dest_key`
    pub async fn backfill_compaction(
        &self,
        source_key: &str,
        dest_key: &str,
        aggregation: Aggregation,
        bucket_ms: i64,
    ) -> Result<usize> {
        let samples = self
            .range(
                source_key,
                RangeBound::Earliest,
                RangeBound::Latest,
                RangeAggregation::new(aggregation, bucket_ms),
            )
            .await?;
        if samples.is_empty() {
            return Ok(0);
        }

        let points: Vec<TsPoint> = samples
            .iter()
            .map(|s| TsPoint {
                key: dest_key.to_string(),
                timestamp_ms: s.timestamp_ms,
                value: s.value,
            })
            .collect();
        self.add(&points).await?;
        info!(source = %source_key, dest = %dest_key, buckets = points.len(), "backfilled compaction");
        Ok(points.len())
    }
}

/// In-process group-by for backends without native reduction
fn reduce_groups(series: Vec<LabeledSeries>, group_by: &GroupBy) -> Vec<LabeledSeries> {
    let mut groups: BTreeMap<String, BTreeMap<i64, Vec<f64>>> = BTreeMap::new();
    for s in series {
        let Some(group) = s.labels.get(&group_by.label) else {
            continue;
        };
        let by_ts = groups.entry(group.clone()).or_default();
        for sample in s.samples {
            let slot = by_ts.entry(sample.timestamp_ms).or_default();
            if let Some(value) = sample.value {
                slot.push(value);
            }
        }
    }

    groups
        .into_iter()
        .map(|(group, by_ts)| LabeledSeries {
            key: format!("{}={}", group_by.label, group),
            labels: BTreeMap::from([(group_by.label.clone(), group)]),
            samples: by_ts
                .into_iter()
                .map(|(timestamp_ms, values)| Sample {
                    timestamp_ms,
                    value: group_by.reducer.reduce(&values),
                })
                .collect(),
        })
        .collect()
}
