//! Dimension vocabulary for a metric
//!
//! A `DimensionSet` is the ordered list of axes a metric is broken down
//! by. Declaration order fixes key segment order, and the Cartesian product
//! of closed value sets is the metric's key space.

use super::filter::{DimensionFilter, FilterValue, SeriesFilter, BASE_KEY_LABEL};
use super::key_encoder::MetricKeyEncoder;
use crate::error::{AnalyticsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Concrete value per dimension name
pub type DimensionValues = BTreeMap<String, String>;

/// Named axis with a closed value set, or an open one when `values` is empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl Dimension {
    pub fn closed<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Dimension {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Any well-formed value is accepted; keys are provisioned on first write
    pub fn open(name: impl Into<String>) -> Self {
        Dimension {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.values.is_empty()
    }

    pub fn allows(&self, value: &str) -> bool {
        self.is_open() || self.values.iter().any(|v| v == value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionSet {
    metric: String,
    dimensions: Vec<Dimension>,
}

impl DimensionSet {
    /// Validate names and declared values once, up front
    pub fn new(metric: impl Into<String>, dimensions: Vec<Dimension>) -> Result<Self> {
        let mut seen = HashSet::new();
        for dim in &dimensions {
            MetricKeyEncoder::validate_identifier("dimension name", &dim.name)?;
            if !seen.insert(dim.name.as_str()) {
                return Err(AnalyticsError::invalid_identifier(
                    "dimension name",
                    &dim.name,
                    "declared twice",
                ));
            }
            let field = format!("dimension value for {}", dim.name);
            for value in &dim.values {
                MetricKeyEncoder::validate_identifier(&field, value)?;
            }
        }
        Ok(DimensionSet {
            metric: metric.into(),
            dimensions,
        })
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.dimensions.iter().map(|d| d.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    fn lookup(&self, name: &str) -> Result<&Dimension> {
        self.get(name).ok_or_else(|| AnalyticsError::UnknownDimension {
            metric: self.metric.clone(),
            dimension: name.to_string(),
            known: self.names().collect::<Vec<_>>().join(", "),
        })
    }

    pub fn check_value(&self, name: &str, value: &str) -> Result<()> {
        let dim = self.lookup(name)?;
        MetricKeyEncoder::validate_identifier(&format!("dimension value for {}", name), value)?;
        if !dim.allows(value) {
            return Err(AnalyticsError::InvalidDimensionValue {
                metric: self.metric.clone(),
                dimension: name.to_string(),
                value: value.to_string(),
            });
        }
        Ok(())
    }

    /// Unknown names first, then (unless `partial`) missing ones, then values
    pub fn validate_assignment(&self, values: &DimensionValues, partial: bool) -> Result<()> {
        for name in values.keys() {
            self.lookup(name)?;
        }
        if !partial {
            for dim in &self.dimensions {
                if values.get(&dim.name).map_or(true, |v| v.is_empty()) {
                    return Err(AnalyticsError::MissingDimension {
                        metric: self.metric.clone(),
                        dimension: dim.name.clone(),
                    });
                }
            }
        }
        for (name, value) in values {
            self.check_value(name, value)?;
        }
        Ok(())
    }

    /// Key for a complete assignment, segments in declaration order
    pub fn build_key(&self, base_key: &str, values: &DimensionValues) -> Result<String> {
        self.validate_assignment(values, false)?;
        Ok(MetricKeyEncoder::build_key(
            base_key,
            self.dimensions
                .iter()
                .filter_map(|d| values.get(&d.name).map(|v| (d.name.as_str(), v.as_str()))),
        ))
    }

    /// `baseKey`, then static labels, then the assignment
    pub fn labels(
        &self,
        base_key: &str,
        static_labels: &BTreeMap<String, String>,
        values: &DimensionValues,
    ) -> Result<BTreeMap<String, String>> {
        self.validate_assignment(values, false)?;
        let mut labels = BTreeMap::new();
        labels.insert(BASE_KEY_LABEL.to_string(), base_key.to_string());
        labels.extend(static_labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        labels.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(labels)
    }

    /// Every assignment of the key space; empty when any dimension is open
    pub fn known_combinations(&self) -> Vec<DimensionValues> {
        if self.dimensions.iter().any(Dimension::is_open) {
            return Vec::new();
        }

        let mut combinations = vec![DimensionValues::new()];
        for dim in &self.dimensions {
            combinations = combinations
                .into_iter()
                .flat_map(|combo| {
                    dim.values.iter().map(move |value| {
                        let mut next = combo.clone();
                        next.insert(dim.name.clone(), value.clone());
                        next
                    })
                })
                .collect();
        }
        combinations
    }

    /// Series filter over `base_key` and static labels, narrowed by `filter`
    pub fn filter(
        &self,
        base_key: &str,
        static_labels: &BTreeMap<String, String>,
        filter: &DimensionFilter,
    ) -> Result<SeriesFilter> {
        let mut series = SeriesFilter::for_base_key(base_key);
        for (name, value) in static_labels {
            series.set(name.clone(), value.as_str());
        }
        for (name, value) in filter {
            self.lookup(name)?;
            for item in value.values() {
                self.check_value(name, item)?;
            }
            series.set(name.clone(), value.clone());
        }
        Ok(series)
    }
}

/// Convenience for `FilterValue` construction in filters
pub fn dimension_filter<I, K, V>(entries: I) -> DimensionFilter
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<FilterValue>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Convenience for building a `DimensionValues` map
pub fn dimension_values<I, K, V>(entries: I) -> DimensionValues
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin_category() -> DimensionSet {
        DimensionSet::new(
            "a:tx",
            vec![
                Dimension::closed("coin", ["btc", "eth"]),
                Dimension::closed("category", ["deposit", "withdrawal"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_build_key_declaration_order() {
        let dims = coin_category();
        let values = dimension_values([("category", "deposit"), ("coin", "btc")]);
        assert_eq!(
            dims.build_key("a:tx", &values).unwrap(),
            "a:tx:coin=btc:category=deposit"
        );
    }

    #[test]
    fn test_build_key_missing_dimension() {
        let dims = coin_category();
        let err = dims
            .build_key("a:tx", &dimension_values([("coin", "btc")]))
            .unwrap_err();
        assert!(matches!(
            err,
            AnalyticsError::MissingDimension { ref dimension, .. } if dimension == "category"
        ));
    }

    #[test]
    fn test_unknown_and_invalid_values() {
        let dims = coin_category();
        let err = dims
            .validate_assignment(&dimension_values([("chain", "x")]), true)
            .unwrap_err();
        match err {
            AnalyticsError::UnknownDimension { known, .. } => assert_eq!(known, "coin, category"),
            other => panic!("unexpected error: {other}"),
        }

        let err = dims.check_value("coin", "doge").unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidDimensionValue { .. }));
    }

    #[test]
    fn test_rejects_bad_declarations() {
        assert!(DimensionSet::new("m", vec![Dimension::closed("c=x", ["a"])]).is_err());
        assert!(DimensionSet::new("m", vec![Dimension::closed("c", ["a=b"])]).is_err());
        assert!(DimensionSet::new("m", vec![Dimension::open("c"), Dimension::open("c")]).is_err());
    }

    #[test]
    fn test_known_combinations() {
        let combos = coin_category().known_combinations();
        assert_eq!(combos.len(), 4);
        assert_eq!(combos[0], dimension_values([("coin", "btc"), ("category", "deposit")]));

        let open = DimensionSet::new(
            "m",
            vec![Dimension::closed("coin", ["btc"]), Dimension::open("user")],
        )
        .unwrap();
        assert!(open.known_combinations().is_empty());
    }

    #[test]
    fn test_open_dimension_accepts_any_wellformed_value() {
        let dims = DimensionSet::new("m", vec![Dimension::open("user")]).unwrap();
        assert!(dims.check_value("user", "u-42").is_ok());
        assert!(dims.check_value("user", "").is_err());
        assert!(dims.check_value("user", "a=b").is_err());
    }

    #[test]
    fn test_distinct_assignments_give_distinct_keys() {
        let dims = coin_category();
        let keys: HashSet<String> = dims
            .known_combinations()
            .iter()
            .map(|values| dims.build_key("a:tx", values).unwrap())
            .collect();
        assert_eq!(keys.len(), 4);
    }

    #[test]
    fn test_filter_validates_and_orders_terms() {
        let dims = coin_category();
        let statics = BTreeMap::from([("env".to_string(), "prod".to_string())]);
        let filter = dims
            .filter(
                "a:tx",
                &statics,
                &dimension_filter([("coin", FilterValue::from(["btc", "eth"]))]),
            )
            .unwrap();
        assert_eq!(
            filter.expressions(),
            vec!["baseKey=a:tx", "env=prod", "coin=(btc,eth)"]
        );

        let err = dims
            .filter("a:tx", &statics, &dimension_filter([("coin", ["btc", "doge"])]))
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidDimensionValue { .. }));
    }

    #[test]
    fn test_labels() {
        let dims = coin_category();
        let labels = dims
            .labels(
                "a:tx",
                &BTreeMap::new(),
                &dimension_values([("coin", "eth"), ("category", "withdrawal")]),
            )
            .unwrap();
        assert_eq!(labels["baseKey"], "a:tx");
        assert_eq!(labels["coin"], "eth");
        assert_eq!(labels.len(), 3);
    }
}
