//! Analytics facade
//!
//! Entry point binding one backend handle to one configuration. Creation
//! checks the backend contract (unless disabled), applies capability
//! overrides and then hands out stores, queries and domain builders that
//! share the same context.

use crate::backend::{assert_client_contract, Aggregation, Backend};
use crate::config::{AnalyticsConfig, TimeSeriesConfig};
use crate::context::AnalyticsContext;
use crate::domain::{AnalyticsDomainBuilder, AnalyticsMetricsBuilder};
use crate::error::Result;
use crate::metrics::{DimensionSet, DimensionalMetric, DimensionalMetricDef, SeriesFilter};
use crate::query::{DimensionalQuery, GroupedQuery, StandardQuery};
use crate::services::{BloomService, HllService, TimeSeriesService};
use crate::store::{BloomCounterStore, DimensionalStore, HllStore, TimeSeriesStore};
use crate::time::Clock;
use std::sync::Arc;
use tracing::info;

/// The three backend adapters bound to one context
pub struct Services<'a> {
    pub timeseries: TimeSeriesService<'a>,
    pub hll: HllService<'a>,
    pub bloom: BloomService<'a>,
}

#[derive(Debug, Clone)]
pub struct Analytics {
    ctx: AnalyticsContext,
    config: AnalyticsConfig,
}

impl Analytics {
    /// Default configuration; fails when the backend breaks the contract
    pub fn new(backend: Arc<dyn Backend>) -> Result<Self> {
        Self::with_config(backend, AnalyticsConfig::default())
    }

    pub fn with_config(backend: Arc<dyn Backend>, config: AnalyticsConfig) -> Result<Self> {
        config.validate()?;
        if config.validate_client_contract {
            assert_client_contract(backend.as_ref())?;
        }
        let ctx = AnalyticsContext::new(backend).with_overrides(&config.capabilities);
        info!(
            pipelining = ctx.capabilities().supports_pipelining,
            native_group_by = ctx.capabilities().supports_native_group_by,
            "analytics ready"
        );
        Ok(Analytics { ctx, config })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.ctx = self.ctx.with_clock(clock);
        self
    }

    pub fn context(&self) -> &AnalyticsContext {
        &self.ctx
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn services(&self) -> Services<'_> {
        Services {
            timeseries: self.ctx.timeseries(),
            hll: self.ctx.hll(),
            bloom: self.ctx.bloom(),
        }
    }

    /// Series store; `None` uses the configured series defaults
    pub fn timeseries_store(&self, key: impl Into<String>, config: Option<TimeSeriesConfig>) -> TimeSeriesStore {
        TimeSeriesStore::new(
            &self.ctx,
            key,
            config.unwrap_or_else(|| self.config.timeseries.clone()),
        )
    }

    pub fn dimensional_store(
        &self,
        base_key: impl Into<String>,
        dimensions: DimensionSet,
        config: Option<TimeSeriesConfig>,
    ) -> DimensionalStore {
        DimensionalStore::new(
            &self.ctx,
            base_key,
            dimensions,
            config.unwrap_or_else(|| self.config.timeseries.clone()),
        )
    }

    pub fn hll_store(&self, key: impl Into<String>) -> HllStore {
        HllStore::new(&self.ctx, key)
            .with_lifetime_series_timeframe(self.config.lifetime_series_timeframe)
    }

    pub fn bloom_counter_store(&self, base_key: &str) -> BloomCounterStore {
        BloomCounterStore::new(&self.ctx, base_key)
            .with_bloom_config(self.config.bloom)
            .with_lifetime_series_timeframe(self.config.lifetime_series_timeframe)
    }

    pub fn standard_query(&self) -> StandardQuery {
        StandardQuery::new(&self.ctx)
    }

    pub fn dimensional_query(&self, filter: SeriesFilter, aggregation: Aggregation) -> DimensionalQuery {
        DimensionalQuery::new(&self.ctx, filter, aggregation)
    }

    pub fn grouped_query<I, S>(
        &self,
        filter: SeriesFilter,
        aggregation: Aggregation,
        group_by: impl Into<String>,
        values: I,
    ) -> GroupedQuery
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        GroupedQuery::new(&self.ctx, filter, aggregation, group_by, values)
    }

    pub fn dimensional_metric(&self, def: DimensionalMetricDef) -> Result<DimensionalMetric> {
        DimensionalMetric::new(def)
    }

    pub fn domain(&self, prefix: impl Into<String>) -> AnalyticsDomainBuilder {
        AnalyticsDomainBuilder::new(&self.ctx, prefix)
    }

    pub fn metrics(&self, prefix: impl Into<String>) -> AnalyticsMetricsBuilder {
        AnalyticsMetricsBuilder::new(&self.ctx, prefix)
            .lifetime_series_timeframe(self.config.lifetime_series_timeframe)
    }
}
