//! Period-over-period change
//!
//! Scalar percent change with explicit statuses for the zero and missing
//! cases, the same rule applied leaf-wise over nested stat trees, and
//! inference of the window immediately before a scope.

use crate::error::{AnalyticsError, Result};
use crate::time::{DateRange, MetricScope};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Increase,
    Decrease,
    NoChange,
    /// Previous was zero, current is positive; the ratio is undefined
    New,
    /// Current dropped to zero from a non-zero previous
    Vanished,
    StableAtZero,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentChange {
    pub status: ChangeStatus,
    pub value: Option<f64>,
}

impl PercentChange {
    fn of(status: ChangeStatus, value: Option<f64>) -> Self {
        PercentChange { status, value }
    }
}

pub fn calculate_percent_change(current: Option<f64>, previous: Option<f64>) -> PercentChange {
    let finite = |v: Option<f64>| v.filter(|x| x.is_finite());
    let (Some(current), Some(previous)) = (finite(current), finite(previous)) else {
        return PercentChange::of(ChangeStatus::Unavailable, None);
    };

    if previous == 0.0 {
        if current > 0.0 {
            return PercentChange::of(ChangeStatus::New, None);
        }
        return PercentChange::of(ChangeStatus::StableAtZero, Some(0.0));
    }
    if current == 0.0 {
        return PercentChange::of(ChangeStatus::Vanished, Some(-100.0));
    }
    if current == previous {
        return PercentChange::of(ChangeStatus::NoChange, Some(0.0));
    }

    let pct = (current - previous) / previous * 100.0;
    let status = if pct > 0.0 {
        ChangeStatus::Increase
    } else {
        ChangeStatus::Decrease
    };
    PercentChange::of(status, Some(pct))
}

/// Nested numeric result: a leaf value or named children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatTree {
    Value(Option<f64>),
    Node(BTreeMap<String, StatTree>),
}

impl StatTree {
    fn leaf(&self) -> Option<f64> {
        match self {
            StatTree::Value(v) => *v,
            StatTree::Node(_) => None,
        }
    }
}

/// Anything that can be compared structurally
pub trait ToStatTree {
    fn to_stat_tree(&self) -> StatTree;
}

impl ToStatTree for StatTree {
    fn to_stat_tree(&self) -> StatTree {
        self.clone()
    }
}

impl ToStatTree for f64 {
    fn to_stat_tree(&self) -> StatTree {
        StatTree::Value(Some(*self))
    }
}

impl ToStatTree for u64 {
    fn to_stat_tree(&self) -> StatTree {
        StatTree::Value(Some(*self as f64))
    }
}

impl<T: ToStatTree> ToStatTree for Option<T> {
    fn to_stat_tree(&self) -> StatTree {
        match self {
            Some(inner) => inner.to_stat_tree(),
            None => StatTree::Value(None),
        }
    }
}

impl<T: ToStatTree> ToStatTree for BTreeMap<String, T> {
    fn to_stat_tree(&self) -> StatTree {
        StatTree::Node(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_stat_tree()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChangeTree<T> {
    Leaf(T),
    Node(BTreeMap<String, ChangeTree<T>>),
}

impl<T> ChangeTree<T> {
    pub fn as_leaf(&self) -> Option<&T> {
        match self {
            ChangeTree::Leaf(leaf) => Some(leaf),
            ChangeTree::Node(_) => None,
        }
    }

    /// Child by name; `None` on leaves
    pub fn get(&self, key: &str) -> Option<&ChangeTree<T>> {
        match self {
            ChangeTree::Leaf(_) => None,
            ChangeTree::Node(children) => children.get(key),
        }
    }
}

fn zip_children<'t, T>(
    current: &'t BTreeMap<String, StatTree>,
    previous: &'t BTreeMap<String, StatTree>,
    leaf: &impl Fn(&StatTree, &StatTree) -> ChangeTree<T>,
) -> BTreeMap<String, ChangeTree<T>> {
    let missing = StatTree::Value(None);
    let keys: BTreeSet<&String> = current.keys().chain(previous.keys()).collect();
    keys.into_iter()
        .map(|key| {
            let c = current.get(key).unwrap_or(&missing);
            let p = previous.get(key).unwrap_or(&missing);
            (key.clone(), leaf(c, p))
        })
        .collect()
}

/// Percent change per leaf; a key missing on one side is unavailable
pub fn percent_change_tree(current: &StatTree, previous: &StatTree) -> ChangeTree<PercentChange> {
    match (current, previous) {
        (StatTree::Node(c), StatTree::Node(p)) => {
            ChangeTree::Node(zip_children(c, p, &percent_change_tree))
        }
        _ => ChangeTree::Leaf(calculate_percent_change(current.leaf(), previous.leaf())),
    }
}

/// `current - previous` per leaf; anything but two numbers gives 0
pub fn absolute_change_tree(current: &StatTree, previous: &StatTree) -> ChangeTree<f64> {
    match (current, previous) {
        (StatTree::Value(Some(c)), StatTree::Value(Some(p))) => ChangeTree::Leaf(c - p),
        (StatTree::Node(c), StatTree::Node(p)) => {
            ChangeTree::Node(zip_children(c, p, &absolute_change_tree))
        }
        _ => ChangeTree::Leaf(0.0),
    }
}

/// Equal-length window ending where `scope` starts
///
/// Lifetime has no prior window and an empty range has no length; both
/// need an explicit previous scope.
pub fn previous_period(scope: &MetricScope, now: DateTime<Utc>) -> Result<DateRange> {
    if scope.is_lifetime() {
        return Err(AnalyticsError::UndefinedPreviousPeriod(
            "lifetime has no preceding window; pass a previous scope explicitly".to_string(),
        ));
    }
    let current = scope.resolve(now);
    let span = current.span_ms();
    if span <= 0 {
        return Err(AnalyticsError::UndefinedPreviousPeriod(
            "empty range".to_string(),
        ));
    }
    Ok(DateRange::new(
        current.start - Duration::milliseconds(span),
        current.start,
    ))
}

/// Current and previous results with their differences
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeReport<T> {
    pub current: T,
    pub previous: T,
    pub percent: ChangeTree<PercentChange>,
    pub absolute: ChangeTree<f64>,
}

impl<T: ToStatTree> ChangeReport<T> {
    pub fn compute(current: T, previous: T) -> Self {
        let (c, p) = (current.to_stat_tree(), previous.to_stat_tree());
        ChangeReport {
            percent: percent_change_tree(&c, &p),
            absolute: absolute_change_tree(&c, &p),
            current,
            previous,
        }
    }
}
