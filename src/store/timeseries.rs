//! Scalar time-series store

use super::{spread_collisions, TimeSeriesPoint};
use crate::backend::{Aggregation, TsPoint};
use crate::config::TimeSeriesConfig;
use crate::context::AnalyticsContext;
use crate::error::{AnalyticsError, Result};
use crate::metrics::MetricKeyEncoder;
use crate::services::CompactionRule;
use crate::time::Bucket;
use futures::future::try_join_all;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct TimeSeriesStore {
    ctx: AnalyticsContext,
    key: String,
    config: TimeSeriesConfig,
    compactions: BTreeMap<String, CompactionRule>,
}

impl TimeSeriesStore {
    pub fn new(ctx: &AnalyticsContext, key: impl Into<String>, config: TimeSeriesConfig) -> Self {
        TimeSeriesStore {
            ctx: ctx.clone(),
            key: key.into(),
            config,
            compactions: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn config(&self) -> &TimeSeriesConfig {
        &self.config
    }

    pub fn compaction_keys(&self) -> impl Iterator<Item = &str> {
        self.compactions.keys().map(String::as_str)
    }

    pub fn compaction(&self, key: &str) -> Option<&CompactionRule> {
        self.compactions.get(key)
    }

    /// Declare a downsampled child `<key>:<AGG>`; takes effect at `init`
    pub fn compact(&mut self, aggregation: Aggregation, bucket: Bucket) -> Result<String> {
        let key = MetricKeyEncoder::compaction_key(&self.key, aggregation);
        if self.compactions.contains_key(&key) {
            return Err(AnalyticsError::CompactionAlreadyExists {
                source_key: self.key.clone(),
                key,
            });
        }
        self.compactions
            .insert(key.clone(), CompactionRule::new(aggregation, bucket));
        Ok(key)
    }

    /// Ensure the key, then each compaction rule in turn
    pub async fn init(&self) -> Result<()> {
        let ts = self.ctx.timeseries();
        ts.ensure_key(&self.key, &self.config).await?;
        for (dest, rule) in &self.compactions {
            ts.ensure_compaction_rule(&self.key, dest, rule).await?;
        }
        Ok(())
    }

    pub async fn record(&self, points: &[TimeSeriesPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let points = spread_collisions(
            points
                .iter()
                .map(|p| TsPoint {
                    key: self.key.clone(),
                    timestamp_ms: p.timestamp.timestamp_millis(),
                    value: p.value,
                })
                .collect(),
        );
        self.ctx.timeseries().add(&points).await?;
        Ok(())
    }

    /// Rewrite pre-existing history into every compaction; returns buckets written
    pub async fn backfill_compactions(&self) -> Result<usize> {
        let ts = self.ctx.timeseries();
        let written = try_join_all(self.compactions.iter().map(|(dest, rule)| {
            ts.backfill_compaction(&self.key, dest, rule.aggregation, rule.bucket_ms)
        }))
        .await?;
        Ok(written.into_iter().sum())
    }
}
