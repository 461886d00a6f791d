//! Dimensional time-series store
//!
//! One series key per dimension combination under a shared base key. Every
//! key carries the `baseKey` label, the static labels and its assignment, so
//! multi-series queries can filter and group on them.

use super::{spread_collisions, DimensionalPoint};
use crate::backend::TsPoint;
use crate::config::TimeSeriesConfig;
use crate::context::AnalyticsContext;
use crate::error::Result;
use crate::metrics::{DimensionFilter, DimensionSet, DimensionValues, SeriesFilter};
use futures::future::try_join_all;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DimensionalStore {
    ctx: AnalyticsContext,
    base_key: String,
    dimensions: DimensionSet,
    config: TimeSeriesConfig,
    static_labels: BTreeMap<String, String>,
    /// Keys this process already provisioned; the backend stays authoritative
    provisioned: Arc<Mutex<HashSet<String>>>,
}

impl DimensionalStore {
    pub fn new(
        ctx: &AnalyticsContext,
        base_key: impl Into<String>,
        dimensions: DimensionSet,
        config: TimeSeriesConfig,
    ) -> Self {
        DimensionalStore {
            ctx: ctx.clone(),
            base_key: base_key.into(),
            dimensions,
            config,
            static_labels: BTreeMap::new(),
            provisioned: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_static_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.static_labels = labels;
        self
    }

    pub fn base_key(&self) -> &str {
        &self.base_key
    }

    pub fn dimensions(&self) -> &DimensionSet {
        &self.dimensions
    }

    pub fn provisioned_count(&self) -> usize {
        self.provisioned.lock().len()
    }

    pub fn build_key(&self, values: &DimensionValues) -> Result<String> {
        self.dimensions.build_key(&self.base_key, values)
    }

    fn key_config(&self, values: &DimensionValues) -> Result<TimeSeriesConfig> {
        let labels = self
            .dimensions
            .labels(&self.base_key, &self.static_labels, values)?;
        Ok(TimeSeriesConfig {
            labels,
            ..self.config.clone()
        })
    }

    async fn provision(&self, keys: Vec<(String, TimeSeriesConfig)>) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let ts = self.ctx.timeseries();
        try_join_all(
            keys.iter()
                .map(|(key, config)| ts.ensure_key(key, config)),
        )
        .await?;

        let mut provisioned = self.provisioned.lock();
        provisioned.extend(keys.into_iter().map(|(key, _)| key));
        Ok(())
    }

    /// Provision the whole key space when every dimension is closed
    pub async fn init(&self) -> Result<()> {
        let combinations = self.dimensions.known_combinations();
        if combinations.is_empty() {
            return Ok(());
        }
        let keys = combinations
            .iter()
            .map(|values| Ok((self.build_key(values)?, self.key_config(values)?)))
            .collect::<Result<Vec<_>>>()?;
        debug!(base_key = %self.base_key, keys = keys.len(), "provisioning dimensional key space");
        self.provision(keys).await
    }

    /// Write points, provisioning unseen combinations first
    pub async fn record(&self, points: &[DimensionalPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let mut ts_points = Vec::with_capacity(points.len());
        let mut fresh: BTreeMap<String, TimeSeriesConfig> = BTreeMap::new();
        {
            let provisioned = self.provisioned.lock();
            for point in points {
                let key = self.build_key(&point.dimensions)?;
                if !provisioned.contains(&key) && !fresh.contains_key(&key) {
                    fresh.insert(key.clone(), self.key_config(&point.dimensions)?);
                }
                ts_points.push(TsPoint {
                    key,
                    timestamp_ms: point.timestamp.timestamp_millis(),
                    value: point.value,
                });
            }
        }

        self.provision(fresh.into_iter().collect()).await?;
        self.ctx
            .timeseries()
            .add(&spread_collisions(ts_points))
            .await?;
        Ok(())
    }

    /// Filter over this store's series, narrowed by dimension constraints
    pub fn filter(&self, filter: &DimensionFilter) -> Result<SeriesFilter> {
        self.dimensions
            .filter(&self.base_key, &self.static_labels, filter)
    }
}
