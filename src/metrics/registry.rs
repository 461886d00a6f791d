//! Dimensional metric definitions
//!
//! A definition is plain data (prefix, suffix, ordered dimensions, series
//! config, static labels). `DimensionalMetric::new` validates it once; the
//! resulting handle derives keys, labels, points and filters and builds the
//! backing store.

use super::dimension::{Dimension, DimensionSet, DimensionValues};
use super::filter::{DimensionFilter, SeriesFilter};
use super::key_encoder::MetricKeyEncoder;
use crate::config::TimeSeriesConfig;
use crate::context::AnalyticsContext;
use crate::error::Result;
use crate::store::{DimensionalPoint, DimensionalStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionalMetricDef {
    pub prefix: String,
    pub suffix: String,
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub config: TimeSeriesConfig,
    #[serde(default)]
    pub static_labels: BTreeMap<String, String>,
}

impl DimensionalMetricDef {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        DimensionalMetricDef {
            prefix: prefix.into(),
            suffix: suffix.into(),
            dimensions: Vec::new(),
            config: TimeSeriesConfig::default(),
            static_labels: BTreeMap::new(),
        }
    }

    pub fn dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    pub fn config(mut self, config: TimeSeriesConfig) -> Self {
        self.config = config;
        self
    }

    pub fn static_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.static_labels.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct DimensionalMetric {
    base_key: String,
    dimensions: DimensionSet,
    config: TimeSeriesConfig,
    static_labels: BTreeMap<String, String>,
}

impl DimensionalMetric {
    pub fn new(def: DimensionalMetricDef) -> Result<Self> {
        let base_key = MetricKeyEncoder::base_key(&def.prefix, &def.suffix)?;
        let dimensions = DimensionSet::new(base_key.clone(), def.dimensions)?;
        for (name, value) in &def.static_labels {
            MetricKeyEncoder::validate_identifier("static label name", name)?;
            MetricKeyEncoder::validate_identifier("static label value", value)?;
        }
        Ok(DimensionalMetric {
            base_key,
            dimensions,
            config: def.config,
            static_labels: def.static_labels,
        })
    }

    pub fn base_key(&self) -> &str {
        &self.base_key
    }

    pub fn dimensions(&self) -> &DimensionSet {
        &self.dimensions
    }

    pub fn static_labels(&self) -> &BTreeMap<String, String> {
        &self.static_labels
    }

    pub fn key(&self, values: &DimensionValues) -> Result<String> {
        self.dimensions.build_key(&self.base_key, values)
    }

    pub fn labels(&self, values: &DimensionValues) -> Result<BTreeMap<String, String>> {
        self.dimensions
            .labels(&self.base_key, &self.static_labels, values)
    }

    pub fn point(
        &self,
        timestamp: DateTime<Utc>,
        value: f64,
        dimensions: DimensionValues,
    ) -> Result<DimensionalPoint> {
        self.dimensions.validate_assignment(&dimensions, false)?;
        Ok(DimensionalPoint {
            timestamp,
            value,
            dimensions,
        })
    }

    pub fn points<I>(&self, inputs: I) -> Result<Vec<DimensionalPoint>>
    where
        I: IntoIterator<Item = (DateTime<Utc>, f64, DimensionValues)>,
    {
        inputs
            .into_iter()
            .map(|(timestamp, value, dimensions)| self.point(timestamp, value, dimensions))
            .collect()
    }

    pub fn filter(&self, filter: &DimensionFilter) -> Result<SeriesFilter> {
        self.dimensions
            .filter(&self.base_key, &self.static_labels, filter)
    }

    /// Store over this metric's key space, carrying its static labels
    pub fn create_store(&self, ctx: &AnalyticsContext) -> DimensionalStore {
        DimensionalStore::new(ctx, self.base_key.clone(), self.dimensions.clone(), self.config.clone())
            .with_static_labels(self.static_labels.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::error::AnalyticsError;
    use crate::metrics::{dimension_filter, dimension_values};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn def() -> DimensionalMetricDef {
        DimensionalMetricDef::new("analytics", "tx_amount")
            .dimension(Dimension::closed("coin", ["btc", "eth"]))
            .dimension(Dimension::closed("category", ["deposit", "withdrawal"]))
            .static_label("env", "prod")
    }

    #[test]
    fn test_key_and_labels() {
        let metric = DimensionalMetric::new(def()).unwrap();
        let values = dimension_values([("coin", "btc"), ("category", "deposit")]);
        assert_eq!(metric.base_key(), "analytics:tx_amount");
        assert_eq!(
            metric.key(&values).unwrap(),
            "analytics:tx_amount:coin=btc:category=deposit"
        );
        let labels = metric.labels(&values).unwrap();
        assert_eq!(labels["baseKey"], "analytics:tx_amount");
        assert_eq!(labels["env"], "prod");
        assert_eq!(labels["coin"], "btc");
    }

    #[test]
    fn test_rejects_invalid_definitions() {
        let err = DimensionalMetric::new(DimensionalMetricDef::new("", "x")).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidIdentifier { ref field, .. } if field == "prefix"));

        let err = DimensionalMetric::new(DimensionalMetricDef::new("a", "x").static_label("k", "a=b"))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidIdentifier { ref field, .. } if field == "static label value"));
    }

    #[test]
    fn test_point_validation() {
        let metric = DimensionalMetric::new(def()).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert!(metric
            .point(at, 1.0, dimension_values([("coin", "btc"), ("category", "deposit")]))
            .is_ok());
        let err = metric
            .point(at, 1.0, dimension_values([("coin", "sol"), ("category", "deposit")]))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidDimensionValue { .. }));

        let points = metric.points(vec![
            (at, 1.0, dimension_values([("coin", "btc"), ("category", "deposit")])),
            (at, 2.0, dimension_values([("coin", "eth")])),
        ]);
        assert!(matches!(points, Err(AnalyticsError::MissingDimension { .. })));
    }

    #[test]
    fn test_filter_includes_static_labels() {
        let metric = DimensionalMetric::new(def()).unwrap();
        let filter = metric
            .filter(&dimension_filter([("coin", "eth")]))
            .unwrap();
        assert_eq!(
            filter.expressions(),
            vec!["baseKey=analytics:tx_amount", "env=prod", "coin=eth"]
        );
        assert!(matches!(
            metric.filter(&dimension_filter([("chain", "x")])),
            Err(AnalyticsError::UnknownDimension { .. })
        ));
    }

    #[tokio::test]
    async fn test_store_carries_static_labels() {
        let backend = InMemoryBackend::new();
        let ctx = AnalyticsContext::new(Arc::new(backend.clone()));
        let metric = DimensionalMetric::new(def()).unwrap();
        let store = metric.create_store(&ctx);
        store.init().await.unwrap();

        let options = backend
            .series_options("analytics:tx_amount:coin=eth:category=withdrawal")
            .unwrap();
        assert_eq!(options.labels["env"], "prod");
    }
}
