//! Storage Backend Abstraction
//!
//! The analytics layer never talks to a wire protocol. It drives a
//! `Backend`: the probabilistic-set, time-series and cardinality primitives
//! a Redis Stack deployment exposes, plus a deferred pipeline for batching.
//!
//! Implementations:
//! - `InMemoryBackend`: for unit tests, simulations and the demo binary
//! - client adapters live outside this crate and implement the same trait

mod contract;
mod memory;

pub use contract::{assert_client_contract, Capabilities, REQUIRED_METHODS};
pub use memory::InMemoryBackend;

use crate::error::BackendError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Per-bucket aggregation and cross-series reducer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregation {
    Sum,
    Avg,
    Count,
    Last,
    Max,
    Min,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Sum => "SUM",
            Aggregation::Avg => "AVG",
            Aggregation::Count => "COUNT",
            Aggregation::Last => "LAST",
            Aggregation::Max => "MAX",
            Aggregation::Min => "MIN",
        }
    }

    /// Reducer to use when collapsing several series into one
    ///
    /// LAST has no cross-series meaning and is reduced as SUM.
    pub fn cross_series(self) -> Aggregation {
        match self {
            Aggregation::Last => Aggregation::Sum,
            other => other,
        }
    }

    /// Value an empty bucket reports
    pub fn empty_value(&self) -> Option<f64> {
        match self {
            Aggregation::Sum | Aggregation::Count => Some(0.0),
            _ => None,
        }
    }

    /// Fold values in arrival order; `None` when there is nothing to fold
    pub fn reduce(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let folded = match self {
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Aggregation::Count => values.len() as f64,
            Aggregation::Last => values[values.len() - 1],
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        };
        Some(folded)
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a series resolves two writes at the same timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DuplicatePolicy {
    Sum,
    #[default]
    Last,
    Min,
    Max,
    Block,
}

/// Range endpoint: `-`, `+` or an explicit millisecond timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    Earliest,
    Latest,
    At(i64),
}

impl fmt::Display for RangeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeBound::Earliest => f.write_str("-"),
            RangeBound::Latest => f.write_str("+"),
            RangeBound::At(ms) => write!(f, "{}", ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TsCreateOptions {
    /// 0 keeps samples forever
    pub retention_ms: u64,
    pub duplicate_policy: DuplicatePolicy,
    pub labels: BTreeMap<String, String>,
}

/// `AGGREGATION type bucket ALIGN align [EMPTY]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeAggregation {
    pub aggregation: Aggregation,
    pub bucket_ms: i64,
    pub align_ms: i64,
    pub empty: bool,
}

impl RangeAggregation {
    pub fn new(aggregation: Aggregation, bucket_ms: i64) -> Self {
        RangeAggregation {
            aggregation,
            bucket_ms,
            align_ms: 0,
            empty: false,
        }
    }

    pub fn align(mut self, align_ms: i64) -> Self {
        self.align_ms = align_ms;
        self
    }

    pub fn with_empty(mut self) -> Self {
        self.empty = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBy {
    pub label: String,
    pub reducer: Aggregation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TsPoint {
    pub key: String,
    pub timestamp_ms: i64,
    pub value: f64,
}

/// Raw sample; `None` is an empty bucket the backend reported as NaN
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp_ms: i64,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSeries {
    pub key: String,
    pub labels: BTreeMap<String, String>,
    pub samples: Vec<Sample>,
}

/// Command buffered in a `Pipeline`
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineCommand {
    PfAdd { key: String, items: Vec<String> },
    PfCount { key: String },
}

/// Deferred command buffer executed in one round trip
///
/// Replies come back in command order. No atomicity is implied.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    commands: Vec<PipelineCommand>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pf_add(&mut self, key: impl Into<String>, items: Vec<String>) -> &mut Self {
        self.commands.push(PipelineCommand::PfAdd {
            key: key.into(),
            items,
        });
        self
    }

    pub fn pf_count(&mut self, key: impl Into<String>) -> &mut Self {
        self.commands.push(PipelineCommand::PfCount { key: key.into() });
        self
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[PipelineCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<PipelineCommand> {
        self.commands
    }
}

/// Primitives the analytics layer needs from its storage backend
///
/// Every method returns a boxed future so the trait stays object safe and
/// can be shared as `Arc<dyn Backend>`.
pub trait Backend: Send + Sync + 'static {
    /// Primitive paths this handle actually serves
    fn capabilities(&self) -> Capabilities;

    // Probabilistic set

    fn bf_reserve<'a>(
        &'a self,
        key: &'a str,
        error_rate: f64,
        capacity: u64,
    ) -> BoxFuture<'a, BackendResult<()>>;

    /// Insert items; `true` where the item was newly added
    fn bf_madd<'a>(
        &'a self,
        key: &'a str,
        items: &'a [String],
    ) -> BoxFuture<'a, BackendResult<Vec<bool>>>;

    fn bf_mexists<'a>(
        &'a self,
        key: &'a str,
        items: &'a [String],
    ) -> BoxFuture<'a, BackendResult<Vec<bool>>>;

    // Time series

    fn ts_create<'a>(
        &'a self,
        key: &'a str,
        options: &'a TsCreateOptions,
    ) -> BoxFuture<'a, BackendResult<()>>;

    fn ts_alter<'a>(
        &'a self,
        key: &'a str,
        options: &'a TsCreateOptions,
    ) -> BoxFuture<'a, BackendResult<()>>;

    fn ts_create_rule<'a>(
        &'a self,
        source_key: &'a str,
        dest_key: &'a str,
        aggregation: Aggregation,
        bucket_ms: i64,
        align_ms: i64,
    ) -> BoxFuture<'a, BackendResult<()>>;

    fn ts_madd<'a>(&'a self, points: &'a [TsPoint]) -> BoxFuture<'a, BackendResult<()>>;

    fn ts_range<'a>(
        &'a self,
        key: &'a str,
        from: RangeBound,
        to: RangeBound,
        aggregation: Option<RangeAggregation>,
    ) -> BoxFuture<'a, BackendResult<Vec<Sample>>>;

    fn ts_mrange_with_labels<'a>(
        &'a self,
        from: RangeBound,
        to: RangeBound,
        filters: &'a [String],
        aggregation: Option<RangeAggregation>,
    ) -> BoxFuture<'a, BackendResult<Vec<LabeledSeries>>>;

    fn ts_mrange_group_by<'a>(
        &'a self,
        from: RangeBound,
        to: RangeBound,
        filters: &'a [String],
        group_by: &'a GroupBy,
        aggregation: Option<RangeAggregation>,
    ) -> BoxFuture<'a, BackendResult<Vec<LabeledSeries>>>;

    // Approximate cardinality

    /// `true` when the estimated cardinality changed
    fn pf_add<'a>(&'a self, key: &'a str, items: &'a [String]) -> BoxFuture<'a, BackendResult<bool>>;

    /// Cardinality of the union of `keys`
    fn pf_count<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, BackendResult<u64>>;

    fn pf_merge<'a>(
        &'a self,
        dest_key: &'a str,
        source_keys: &'a [String],
    ) -> BoxFuture<'a, BackendResult<()>>;

    fn expire<'a>(&'a self, key: &'a str, ttl_seconds: u64) -> BoxFuture<'a, BackendResult<()>>;

    // Batching

    /// Run the buffered commands in one round trip, replies in order
    fn exec_pipeline(&self, pipeline: Pipeline) -> BoxFuture<'_, BackendResult<Vec<i64>>>;
}
