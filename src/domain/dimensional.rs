//! Dimensional analytics domain
//!
//! A domain is a prefix, a set of dimensional stores and a set of named
//! measures over them. Each measure is an aggregate of one store, optionally
//! narrowed by a dimension filter and optionally broken down by one closed
//! dimension.
//!
//! ```ignore
//! let domain = AnalyticsDomainBuilder::new(&ctx, "analytics")
//!     .timeseries_store("tx", [Dimension::closed("coin", ["btc", "eth"])], TimeSeriesConfig::default())
//!     .measure("volume", Measure::from_store("tx").agg(Aggregation::Sum).breakdown("coin"))
//!     .build()?;
//! ```

use crate::backend::Aggregation;
use crate::compare::{previous_period, ChangeReport, StatTree, ToStatTree};
use crate::config::TimeSeriesConfig;
use crate::context::AnalyticsContext;
use crate::error::{AnalyticsError, Result};
use crate::metrics::{
    Dimension, DimensionFilter, DimensionalMetric, DimensionalMetricDef, FilterValue,
};
use crate::query::{DimensionalQuery, GroupedQuery};
use crate::store::{DimensionalPoint, DimensionalStore};
use crate::time::{AnalyticBucket, Bucket, MetricScope};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Measure declaration; `agg` is required
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub store: String,
    pub aggregation: Option<Aggregation>,
    pub reducer: Option<Aggregation>,
    #[serde(default)]
    pub filter: DimensionFilter,
    pub breakdown: Option<String>,
}

impl Measure {
    pub fn from_store(store: impl Into<String>) -> Self {
        Measure {
            store: store.into(),
            aggregation: None,
            reducer: None,
            filter: DimensionFilter::new(),
            breakdown: None,
        }
    }

    pub fn agg(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    pub fn reducer(mut self, reducer: Aggregation) -> Self {
        self.reducer = Some(reducer);
        self
    }

    pub fn filter(mut self, dimension: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.filter.insert(dimension.into(), value.into());
        self
    }

    pub fn breakdown(mut self, dimension: impl Into<String>) -> Self {
        self.breakdown = Some(dimension.into());
        self
    }
}

/// Scalar result of one measure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasureStat {
    Total(f64),
    Breakdown {
        overall: f64,
        breakdown: BTreeMap<String, f64>,
    },
}

impl MeasureStat {
    pub fn overall(&self) -> f64 {
        match self {
            MeasureStat::Total(value) => *value,
            MeasureStat::Breakdown { overall, .. } => *overall,
        }
    }
}

impl ToStatTree for MeasureStat {
    fn to_stat_tree(&self) -> StatTree {
        match self {
            MeasureStat::Total(value) => value.to_stat_tree(),
            MeasureStat::Breakdown { overall, breakdown } => StatTree::Node(BTreeMap::from([
                ("overall".to_string(), overall.to_stat_tree()),
                ("breakdown".to_string(), breakdown.to_stat_tree()),
            ])),
        }
    }
}

/// Bucketed result of one measure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasureSeries {
    Total(Vec<AnalyticBucket>),
    Breakdown {
        overall: Vec<AnalyticBucket>,
        breakdown: BTreeMap<String, Vec<AnalyticBucket>>,
    },
}

pub type DomainStats = BTreeMap<String, MeasureStat>;
pub type DomainSeries = BTreeMap<String, MeasureSeries>;

#[derive(Debug, Clone)]
struct StoreDef {
    name: String,
    dimensions: Vec<Dimension>,
    config: TimeSeriesConfig,
}

#[derive(Debug, Clone)]
struct MeasurePlan {
    name: String,
    overall: DimensionalQuery,
    breakdown: Option<GroupedQuery>,
}

impl MeasurePlan {
    async fn stat(&self, scope: &MetricScope) -> Result<MeasureStat> {
        match &self.breakdown {
            None => Ok(MeasureStat::Total(self.overall.scope(scope).await?)),
            Some(grouped) => {
                let (overall, breakdown) =
                    futures::try_join!(self.overall.scope(scope), grouped.scope(scope))?;
                Ok(MeasureStat::Breakdown { overall, breakdown })
            }
        }
    }

    async fn series(&self, scope: &MetricScope, bucket: Bucket) -> Result<MeasureSeries> {
        match &self.breakdown {
            None => Ok(MeasureSeries::Total(
                self.overall.buckets_by_scope(scope, bucket).await?,
            )),
            Some(grouped) => {
                let (overall, breakdown) = futures::try_join!(
                    self.overall.buckets_by_scope(scope, bucket),
                    grouped.buckets_by_scope(scope, bucket)
                )?;
                Ok(MeasureSeries::Breakdown { overall, breakdown })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyticsDomainBuilder {
    ctx: AnalyticsContext,
    prefix: String,
    stores: Vec<StoreDef>,
    measures: Vec<(String, Measure)>,
}

impl AnalyticsDomainBuilder {
    pub fn new(ctx: &AnalyticsContext, prefix: impl Into<String>) -> Self {
        AnalyticsDomainBuilder {
            ctx: ctx.clone(),
            prefix: prefix.into(),
            stores: Vec::new(),
            measures: Vec::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Declare (or redeclare) the store `<prefix>:<name>`
    pub fn timeseries_store(
        mut self,
        name: impl Into<String>,
        dimensions: impl IntoIterator<Item = Dimension>,
        config: TimeSeriesConfig,
    ) -> Self {
        let def = StoreDef {
            name: name.into(),
            dimensions: dimensions.into_iter().collect(),
            config,
        };
        self.stores.retain(|s| s.name != def.name);
        self.stores.push(def);
        self
    }

    pub fn measure(mut self, name: impl Into<String>, measure: Measure) -> Self {
        let name = name.into();
        self.measures.retain(|(n, _)| *n != name);
        self.measures.push((name, measure));
        self
    }

    /// Validate every store and measure and wire up their queries
    pub fn build(self) -> Result<AnalyticsDomain> {
        let mut metrics = BTreeMap::new();
        let mut stores = BTreeMap::new();
        for def in self.stores {
            let metric = DimensionalMetric::new(
                DimensionalMetricDef {
                    dimensions: def.dimensions,
                    config: def.config,
                    ..DimensionalMetricDef::new(self.prefix.as_str(), def.name.as_str())
                },
            )?;
            stores.insert(def.name.clone(), metric.create_store(&self.ctx));
            metrics.insert(def.name, metric);
        }

        let plans = self
            .measures
            .into_iter()
            .map(|(name, measure)| plan_measure(&self.ctx, &metrics, name, measure))
            .collect::<Result<Vec<_>>>()?;

        debug!(prefix = %self.prefix, stores = stores.len(), measures = plans.len(), "built analytics domain");
        Ok(AnalyticsDomain {
            ctx: self.ctx,
            prefix: self.prefix,
            stores,
            plans,
        })
    }
}

fn plan_measure(
    ctx: &AnalyticsContext,
    metrics: &BTreeMap<String, DimensionalMetric>,
    name: String,
    measure: Measure,
) -> Result<MeasurePlan> {
    let invalid = |reason: String| AnalyticsError::InvalidMeasure {
        measure: name.clone(),
        reason,
    };
    let metric = metrics
        .get(&measure.store)
        .ok_or_else(|| invalid(format!("unknown store \"{}\"", measure.store)))?;
    let aggregation = measure
        .aggregation
        .ok_or_else(|| invalid(format!("measure from store \"{}\" is missing agg", measure.store)))?;
    let reducer = measure.reducer.unwrap_or(Aggregation::Sum);
    let filter = metric.filter(&measure.filter)?;

    let overall = DimensionalQuery::new(ctx, filter.clone(), aggregation).with_reducer(reducer);
    let breakdown = match &measure.breakdown {
        None => None,
        Some(by) => {
            let dimension = metric
                .dimensions()
                .get(by)
                .ok_or_else(|| invalid(format!("unknown breakdown dimension \"{by}\"")))?;
            if dimension.is_open() {
                return Err(invalid(format!(
                    "breakdown dimension \"{by}\" has no declared values"
                )));
            }
            Some(
                GroupedQuery::new(ctx, filter, aggregation, by.as_str(), dimension.values.clone())
                    .with_reducer(reducer),
            )
        }
    };

    Ok(MeasurePlan {
        name,
        overall,
        breakdown,
    })
}

#[derive(Debug, Clone)]
pub struct AnalyticsDomain {
    ctx: AnalyticsContext,
    prefix: String,
    stores: BTreeMap<String, DimensionalStore>,
    plans: Vec<MeasurePlan>,
}

impl AnalyticsDomain {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn measure_names(&self) -> impl Iterator<Item = &str> {
        self.plans.iter().map(|p| p.name.as_str())
    }

    pub fn store(&self, name: &str) -> Option<&DimensionalStore> {
        self.stores.get(name)
    }

    /// Provision every store's key space
    pub async fn init(&self) -> Result<()> {
        try_join_all(self.stores.values().map(DimensionalStore::init)).await?;
        Ok(())
    }

    pub async fn record(&self, store: &str, points: &[DimensionalPoint]) -> Result<()> {
        let target = self
            .stores
            .get(store)
            .ok_or_else(|| AnalyticsError::UnknownMetric(store.to_string()))?;
        target.record(points).await
    }

    fn all(&self) -> QueryRunner<'_> {
        QueryRunner {
            domain: self,
            selected: self.plans.iter().collect(),
        }
    }

    /// Runner over a subset of measures; empty selects all
    pub fn query(&self, measures: &[&str]) -> Result<QueryRunner<'_>> {
        if measures.is_empty() {
            return Ok(self.all());
        }
        let selected = measures
            .iter()
            .map(|name| {
                self.plans
                    .iter()
                    .find(|p| p.name == *name)
                    .ok_or_else(|| AnalyticsError::UnknownMetric(name.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(QueryRunner {
            domain: self,
            selected,
        })
    }

    pub async fn stats(&self, scope: &MetricScope) -> Result<DomainStats> {
        self.all().stats(scope).await
    }

    pub async fn series(&self, scope: &MetricScope, bucket: Bucket) -> Result<DomainSeries> {
        self.all().series(scope, bucket).await
    }

    pub async fn change(
        &self,
        scope: &MetricScope,
        previous: Option<MetricScope>,
    ) -> Result<ChangeReport<DomainStats>> {
        self.all().change(scope, previous).await
    }
}

/// Measures selected from one domain
#[derive(Debug, Clone)]
pub struct QueryRunner<'d> {
    domain: &'d AnalyticsDomain,
    selected: Vec<&'d MeasurePlan>,
}

impl QueryRunner<'_> {
    pub fn measure_names(&self) -> impl Iterator<Item = &str> {
        self.selected.iter().map(|p| p.name.as_str())
    }

    pub async fn stats(&self, scope: &MetricScope) -> Result<DomainStats> {
        let stats = try_join_all(self.selected.iter().map(|plan| plan.stat(scope))).await?;
        Ok(self
            .measure_names()
            .map(str::to_string)
            .zip(stats)
            .collect())
    }

    pub async fn series(&self, scope: &MetricScope, bucket: Bucket) -> Result<DomainSeries> {
        let series = try_join_all(
            self.selected
                .iter()
                .map(|plan| plan.series(scope, bucket)),
        )
        .await?;
        Ok(self
            .measure_names()
            .map(str::to_string)
            .zip(series)
            .collect())
    }

    /// Current against `previous`, or the equal-length window before `scope`
    pub async fn change(
        &self,
        scope: &MetricScope,
        previous: Option<MetricScope>,
    ) -> Result<ChangeReport<DomainStats>> {
        let previous = match previous {
            Some(previous) => previous,
            None => previous_period(scope, self.domain.ctx.now())?.into(),
        };
        let (current, previous) = futures::try_join!(self.stats(scope), self.stats(&previous))?;
        Ok(ChangeReport::compute(current, previous))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::compare::{ChangeStatus, ChangeTree};
    use crate::metrics::dimension_values;
    use crate::time::{DateRange, FixedClock, Timeframe};
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
    }

    fn builder(ctx: &AnalyticsContext) -> AnalyticsDomainBuilder {
        AnalyticsDomainBuilder::new(ctx, "analytics")
            .timeseries_store(
                "tx",
                [
                    Dimension::closed("coin", ["btc", "eth"]),
                    Dimension::closed("category", ["deposit", "withdrawal"]),
                ],
                TimeSeriesConfig::default(),
            )
            .measure(
                "volume",
                Measure::from_store("tx").agg(Aggregation::Sum).breakdown("coin"),
            )
            .measure(
                "deposits",
                Measure::from_store("tx")
                    .agg(Aggregation::Sum)
                    .filter("category", "deposit"),
            )
    }

    fn point(when: DateTime<Utc>, value: f64, coin: &str, category: &str) -> DimensionalPoint {
        DimensionalPoint {
            timestamp: when,
            value,
            dimensions: dimension_values([("coin", coin), ("category", category)]),
        }
    }

    async fn setup() -> (InMemoryBackend, AnalyticsDomain) {
        let backend = InMemoryBackend::new();
        let ctx = AnalyticsContext::new(Arc::new(backend.clone()))
            .with_clock(Arc::new(FixedClock::new(at(10, 0))));
        let domain = builder(&ctx).build().unwrap();
        domain.init().await.unwrap();
        domain
            .record(
                "tx",
                &[
                    point(at(8, 1), 10.0, "btc", "deposit"),
                    point(at(8, 2), 5.0, "eth", "withdrawal"),
                    point(at(2, 1), 4.0, "btc", "deposit"),
                ],
            )
            .await
            .unwrap();
        (backend, domain)
    }

    #[tokio::test]
    async fn test_stats_with_breakdown() {
        let (_backend, domain) = setup().await;
        let stats = domain.stats(&Timeframe::LastWeek.into()).await.unwrap();

        match &stats["volume"] {
            MeasureStat::Breakdown { overall, breakdown } => {
                assert_eq!(*overall, 15.0);
                assert_eq!(breakdown["btc"], 10.0);
                assert_eq!(breakdown["eth"], 5.0);
            }
            other => panic!("expected a breakdown, got {other:?}"),
        }
        assert_eq!(stats["deposits"], MeasureStat::Total(10.0));
    }

    #[tokio::test]
    async fn test_init_provisions_key_space() {
        let (backend, domain) = setup().await;
        assert_eq!(backend.series_keys().len(), 4);
        assert_eq!(domain.store("tx").unwrap().provisioned_count(), 4);
    }

    #[tokio::test]
    async fn test_series_with_breakdown() {
        let (_backend, domain) = setup().await;
        let range: MetricScope = DateRange::new(at(8, 0), at(10, 0)).into();
        let series = domain.series(&range, Bucket::Day).await.unwrap();
        match &series["volume"] {
            MeasureSeries::Breakdown { overall, breakdown } => {
                let values: Vec<f64> = overall.iter().map(|b| b.value).collect();
                assert_eq!(values, vec![15.0, 0.0]);
                assert_eq!(breakdown["eth"][0].value, 5.0);
            }
            other => panic!("expected a breakdown, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_change_against_previous_week() {
        let (_backend, domain) = setup().await;
        let report = domain
            .change(&Timeframe::LastWeek.into(), None)
            .await
            .unwrap();
        assert_eq!(report.previous["deposits"], MeasureStat::Total(4.0));

        let deposits = report.percent.get("deposits").and_then(ChangeTree::as_leaf).unwrap();
        assert_eq!(deposits.status, ChangeStatus::Increase);
        assert_eq!(deposits.value, Some(150.0));

        let eth = report
            .percent
            .get("volume")
            .and_then(|v| v.get("breakdown"))
            .and_then(|b| b.get("eth"))
            .and_then(ChangeTree::as_leaf)
            .unwrap();
        assert_eq!(eth.status, ChangeStatus::New);
        assert_eq!(
            report.absolute.get("volume").and_then(|v| v.get("overall")).and_then(ChangeTree::as_leaf),
            Some(&11.0)
        );
    }

    #[tokio::test]
    async fn test_lifetime_change_needs_explicit_previous() {
        let (_backend, domain) = setup().await;
        let err = domain
            .change(&Timeframe::Lifetime.into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::UndefinedPreviousPeriod(_)));

        let explicit = DateRange::new(at(1, 0), at(3, 0)).into();
        let report = domain
            .change(&Timeframe::Lifetime.into(), Some(explicit))
            .await
            .unwrap();
        assert_eq!(report.current["deposits"], MeasureStat::Total(14.0));
    }

    #[tokio::test]
    async fn test_query_selects_measures() {
        let (_backend, domain) = setup().await;
        let runner = domain.query(&["deposits"]).unwrap();
        let stats = runner.stats(&Timeframe::LastWeek.into()).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert!(stats.contains_key("deposits"));

        assert!(matches!(
            domain.query(&["missing"]),
            Err(AnalyticsError::UnknownMetric(_))
        ));
        assert_eq!(domain.query(&[]).unwrap().measure_names().count(), 2);
    }

    #[test]
    fn test_build_rejects_bad_measures() {
        let ctx = AnalyticsContext::new(Arc::new(InMemoryBackend::new()));

        let missing_agg = builder(&ctx).measure("bad", Measure::from_store("tx")).build();
        assert!(matches!(missing_agg, Err(AnalyticsError::InvalidMeasure { .. })));

        let unknown_store = builder(&ctx)
            .measure("bad", Measure::from_store("nope").agg(Aggregation::Sum))
            .build();
        assert!(matches!(unknown_store, Err(AnalyticsError::InvalidMeasure { .. })));

        let unknown_breakdown = builder(&ctx)
            .measure("bad", Measure::from_store("tx").agg(Aggregation::Sum).breakdown("chain"))
            .build();
        assert!(matches!(unknown_breakdown, Err(AnalyticsError::InvalidMeasure { .. })));

        let bad_filter = builder(&ctx)
            .measure("bad", Measure::from_store("tx").agg(Aggregation::Sum).filter("coin", "doge"))
            .build();
        assert!(matches!(bad_filter, Err(AnalyticsError::InvalidDimensionValue { .. })));
    }

    #[tokio::test]
    async fn test_record_unknown_store() {
        let (_backend, domain) = setup().await;
        let err = domain.record("nope", &[]).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::UnknownMetric(_)));
    }
}
