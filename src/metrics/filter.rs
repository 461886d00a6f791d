//! Label filters for multi-series queries

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label every dimensional series carries with its base key
pub const BASE_KEY_LABEL: &str = "baseKey";

/// A single value or a set of alternatives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    One(String),
    AnyOf(Vec<String>),
}

impl FilterValue {
    pub fn values(&self) -> &[String] {
        match self {
            FilterValue::One(value) => std::slice::from_ref(value),
            FilterValue::AnyOf(values) => values,
        }
    }

    /// `name=value` or `name=(a,b)`
    pub fn expression(&self, name: &str) -> String {
        match self {
            FilterValue::One(value) => format!("{}={}", name, value),
            FilterValue::AnyOf(values) => format!("{}=({})", name, values.join(",")),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::One(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::One(value)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(values: Vec<String>) -> Self {
        FilterValue::AnyOf(values)
    }
}

impl From<Vec<&str>> for FilterValue {
    fn from(values: Vec<&str>) -> Self {
        FilterValue::AnyOf(values.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for FilterValue {
    fn from(values: [&str; N]) -> Self {
        FilterValue::AnyOf(values.iter().map(|v| v.to_string()).collect())
    }
}

/// Per-dimension constraints supplied by callers
pub type DimensionFilter = BTreeMap<String, FilterValue>;

/// Ordered label constraints sent to the backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesFilter {
    terms: Vec<(String, FilterValue)>,
}

impl SeriesFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter matching every series under `base_key`
    pub fn for_base_key(base_key: &str) -> Self {
        Self::new().with(BASE_KEY_LABEL, base_key)
    }

    /// Add or replace the constraint on `name`
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FilterValue>) {
        let name = name.into();
        let value = value.into();
        match self.terms.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.terms.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FilterValue> {
        self.terms.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn terms(&self) -> &[(String, FilterValue)] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Backend filter expressions, one per constraint, in insertion order
    pub fn expressions(&self) -> Vec<String> {
        self.terms
            .iter()
            .map(|(name, value)| value.expression(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expressions() {
        let filter = SeriesFilter::for_base_key("a:tx")
            .with("category", "deposit")
            .with("coin", ["btc", "eth"]);
        assert_eq!(
            filter.expressions(),
            vec!["baseKey=a:tx", "category=deposit", "coin=(btc,eth)"]
        );
    }

    #[test]
    fn test_set_replaces_existing_term() {
        let mut filter = SeriesFilter::for_base_key("a:tx").with("coin", "btc");
        filter.set("coin", "eth");
        assert_eq!(filter.terms().len(), 2);
        assert_eq!(filter.get("coin"), Some(&FilterValue::from("eth")));
    }

    #[test]
    fn test_filter_value_serde_untagged() {
        let one: FilterValue = serde_json::from_str("\"btc\"").unwrap();
        assert_eq!(one.values(), ["btc".to_string()]);
        let many: FilterValue = serde_json::from_str("[\"btc\",\"eth\"]").unwrap();
        assert_eq!(many.values().len(), 2);
    }
}
