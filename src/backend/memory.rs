//! In-memory backend for tests and simulation
//!
//! Implements every primitive of the client contract over plain maps:
//! time series honour duplicate policies, retention, compaction rules,
//! aggregation with ALIGN/EMPTY, label filters and group-by reducers.
//! Cardinality and membership structures are exact sets, so "approximate"
//! counts are exact here.
//!
//! Test hooks: a call log, one-shot error injection per primitive path and
//! configurable capabilities.

use super::{
    Aggregation, Backend, BackendResult, Capabilities, DuplicatePolicy, GroupBy, LabeledSeries,
    Pipeline, PipelineCommand, RangeAggregation, RangeBound, Sample, TsCreateOptions, TsPoint,
};
use crate::error::BackendError;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

const DEFAULT_BLOOM_ERROR_RATE: f64 = 0.01;
const DEFAULT_BLOOM_CAPACITY: u64 = 100;

#[derive(Debug, Clone)]
struct Rule {
    dest: String,
    aggregation: Aggregation,
    bucket_ms: i64,
    align_ms: i64,
}

#[derive(Debug, Clone)]
struct Series {
    options: TsCreateOptions,
    samples: BTreeMap<i64, f64>,
    rules: Vec<Rule>,
}

#[derive(Debug)]
struct Bloom {
    error_rate: f64,
    capacity: u64,
    items: HashSet<String>,
}

#[derive(Debug, Default)]
struct State {
    series: HashMap<String, Series>,
    hll: HashMap<String, BTreeSet<String>>,
    blooms: HashMap<String, Bloom>,
    ttls: HashMap<String, u64>,
    calls: Vec<String>,
    failures: HashMap<String, BackendError>,
}

/// Label matcher parsed from `k=v` or `k=(a,b)`
enum Matcher {
    Eq(String, String),
    AnyOf(String, Vec<String>),
}

impl Matcher {
    fn parse(expr: &str) -> BackendResult<Self> {
        let (label, value) = expr
            .split_once('=')
            .ok_or_else(|| BackendError::Other(format!("TSDB: failed parsing labels '{}'", expr)))?;
        if let Some(inner) = value.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
            let values = inner.split(',').map(|v| v.trim().to_string()).collect();
            return Ok(Matcher::AnyOf(label.to_string(), values));
        }
        Ok(Matcher::Eq(label.to_string(), value.to_string()))
    }

    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Matcher::Eq(label, value) => labels.get(label) == Some(value),
            Matcher::AnyOf(label, values) => labels
                .get(label)
                .map(|actual| values.iter().any(|v| v == actual))
                .unwrap_or(false),
        }
    }
}

fn bucket_start(timestamp_ms: i64, bucket_ms: i64, align_ms: i64) -> i64 {
    align_ms + (timestamp_ms - align_ms).div_euclid(bucket_ms) * bucket_ms
}

fn bound_ms(bound: RangeBound) -> i64 {
    match bound {
        RangeBound::Earliest => i64::MIN,
        RangeBound::Latest => i64::MAX,
        RangeBound::At(ms) => ms,
    }
}

fn select(samples: &BTreeMap<i64, f64>, from: RangeBound, to: RangeBound) -> Vec<(i64, f64)> {
    let (lo, hi) = (bound_ms(from), bound_ms(to));
    if lo > hi {
        return Vec::new();
    }
    samples.range(lo..=hi).map(|(ts, v)| (*ts, *v)).collect()
}

fn aggregate(
    points: &[(i64, f64)],
    agg: &RangeAggregation,
    from: RangeBound,
    to: RangeBound,
) -> BackendResult<Vec<Sample>> {
    if agg.bucket_ms <= 0 {
        return Err(BackendError::Other(
            "TSDB: bucketDuration must be greater than zero".to_string(),
        ));
    }

    let mut buckets: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for (ts, value) in points {
        buckets
            .entry(bucket_start(*ts, agg.bucket_ms, agg.align_ms))
            .or_default()
            .push(*value);
    }

    if !agg.empty {
        return Ok(buckets
            .iter()
            .map(|(start, values)| Sample {
                timestamp_ms: *start,
                value: agg.aggregation.reduce(values),
            })
            .collect());
    }

    // EMPTY: report every bucket across the requested bounds, or across the
    // data when a bound is open
    let first = match from {
        RangeBound::At(ms) => Some(bucket_start(ms, agg.bucket_ms, agg.align_ms)),
        _ => buckets.keys().next().copied(),
    };
    let last = match to {
        RangeBound::At(ms) => Some(bucket_start(ms, agg.bucket_ms, agg.align_ms)),
        _ => buckets.keys().next_back().copied(),
    };

    let mut filled = Vec::new();
    if let (Some(first), Some(last)) = (first, last) {
        let mut cursor = first;
        while cursor <= last {
            let value = buckets
                .get(&cursor)
                .and_then(|values| agg.aggregation.reduce(values))
                .or_else(|| agg.aggregation.empty_value());
            filled.push(Sample {
                timestamp_ms: cursor,
                value,
            });
            cursor += agg.bucket_ms;
        }
    }
    Ok(filled)
}

fn series_samples(
    series: &Series,
    from: RangeBound,
    to: RangeBound,
    aggregation: Option<&RangeAggregation>,
) -> BackendResult<Vec<Sample>> {
    let points = select(&series.samples, from, to);
    match aggregation {
        Some(agg) => aggregate(&points, agg, from, to),
        None => Ok(points
            .into_iter()
            .map(|(timestamp_ms, value)| Sample {
                timestamp_ms,
                value: Some(value),
            })
            .collect()),
    }
}

fn key_missing(key: &str) -> BackendError {
    BackendError::NotFound(key.to_string())
}

impl State {
    fn upsert(&mut self, key: &str, timestamp_ms: i64, value: f64) -> BackendResult<()> {
        let series = self.series.get_mut(key).ok_or_else(|| key_missing(key))?;

        if series.options.retention_ms > 0 {
            if let Some((&newest, _)) = series.samples.last_key_value() {
                if timestamp_ms < newest - series.options.retention_ms as i64 {
                    return Ok(());
                }
            }
        }

        match series.samples.entry(timestamp_ms) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => {
                let current = *slot.get();
                let resolved = match series.options.duplicate_policy {
                    DuplicatePolicy::Block => {
                        return Err(BackendError::Other(
                            "TSDB: Error at upsert, update is not supported when DUPLICATE_POLICY is set to BLOCK mode"
                                .to_string(),
                        ))
                    }
                    DuplicatePolicy::Last => value,
                    DuplicatePolicy::Sum => current + value,
                    DuplicatePolicy::Min => current.min(value),
                    DuplicatePolicy::Max => current.max(value),
                };
                slot.insert(resolved);
            }
        }

        // Downsample the touched bucket into every rule destination
        let rules = series.rules.clone();
        for rule in rules {
            let start = bucket_start(timestamp_ms, rule.bucket_ms, rule.align_ms);
            let values: Vec<f64> = match self.series.get(key) {
                Some(source) => source
                    .samples
                    .range(start..start + rule.bucket_ms)
                    .map(|(_, v)| *v)
                    .collect(),
                None => Vec::new(),
            };
            if let (Some(rolled), Some(dest)) =
                (rule.aggregation.reduce(&values), self.series.get_mut(&rule.dest))
            {
                dest.samples.insert(start, rolled);
            }
        }
        Ok(())
    }

    fn matching(&self, filters: &[String]) -> BackendResult<Vec<(&String, &Series)>> {
        let matchers = filters
            .iter()
            .map(|f| Matcher::parse(f))
            .collect::<BackendResult<Vec<_>>>()?;
        let mut found: Vec<(&String, &Series)> = self
            .series
            .iter()
            .filter(|(_, series)| matchers.iter().all(|m| m.matches(&series.options.labels)))
            .collect();
        found.sort_by(|a, b| a.0.cmp(b.0));
        Ok(found)
    }
}

/// In-memory backend; clones share state
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    state: Arc<RwLock<State>>,
    capabilities: Capabilities,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::full())
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        InMemoryBackend {
            state: Arc::new(RwLock::new(State::default())),
            capabilities,
        }
    }

    /// Log the call, refuse unsupported paths and fire injected failures
    fn enter(&self, state: &mut State, path: &'static str) -> BackendResult<()> {
        state.calls.push(path.to_string());
        if !self.capabilities.supports(path) {
            return Err(BackendError::Unsupported(path.to_string()));
        }
        match state.failures.remove(path) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Fail the next call to `path` with `err`
    pub fn fail_next(&self, path: &str, err: BackendError) {
        self.state.write().failures.insert(path.to_string(), err);
    }

    /// Primitive paths called so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.read().calls.clone()
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.state.read().calls.iter().filter(|c| *c == path).count()
    }

    pub fn clear_calls(&self) {
        self.state.write().calls.clear();
    }

    pub fn series_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.read().series.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn samples(&self, key: &str) -> Vec<(i64, f64)> {
        self.state
            .read()
            .series
            .get(key)
            .map(|s| s.samples.iter().map(|(ts, v)| (*ts, *v)).collect())
            .unwrap_or_default()
    }

    pub fn series_options(&self, key: &str) -> Option<TsCreateOptions> {
        self.state.read().series.get(key).map(|s| s.options.clone())
    }

    /// `(dest, aggregation, bucket_ms)` for each rule on `key`
    pub fn rules(&self, key: &str) -> Vec<(String, Aggregation, i64)> {
        self.state
            .read()
            .series
            .get(key)
            .map(|s| {
                s.rules
                    .iter()
                    .map(|r| (r.dest.clone(), r.aggregation, r.bucket_ms))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn hll_len(&self, key: &str) -> usize {
        self.state.read().hll.get(key).map(|s| s.len()).unwrap_or(0)
    }

    pub fn ttl(&self, key: &str) -> Option<u64> {
        self.state.read().ttls.get(key).copied()
    }

    /// `(error_rate, capacity)` of a reserved filter
    pub fn bloom_reservation(&self, key: &str) -> Option<(f64, u64)> {
        self.state
            .read()
            .blooms
            .get(key)
            .map(|b| (b.error_rate, b.capacity))
    }

    fn do_bf_reserve(&self, key: &str, error_rate: f64, capacity: u64) -> BackendResult<()> {
        let mut state = self.state.write();
        self.enter(&mut state, "bf.reserve")?;
        if error_rate <= 0.0 || error_rate >= 1.0 {
            return Err(BackendError::Other("ERR (0 < error rate range < 1)".to_string()));
        }
        if capacity == 0 {
            return Err(BackendError::Other(
                "ERR (capacity should be larger than 0)".to_string(),
            ));
        }
        if state.blooms.contains_key(key) {
            return Err(BackendError::Other("ERR item exists".to_string()));
        }
        state.blooms.insert(
            key.to_string(),
            Bloom {
                error_rate,
                capacity,
                items: HashSet::new(),
            },
        );
        Ok(())
    }

    fn do_bf_madd(&self, key: &str, items: &[String]) -> BackendResult<Vec<bool>> {
        let mut state = self.state.write();
        self.enter(&mut state, "bf.mAdd")?;
        let bloom = state.blooms.entry(key.to_string()).or_insert_with(|| Bloom {
            error_rate: DEFAULT_BLOOM_ERROR_RATE,
            capacity: DEFAULT_BLOOM_CAPACITY,
            items: HashSet::new(),
        });
        Ok(items.iter().map(|item| bloom.items.insert(item.clone())).collect())
    }

    fn do_bf_mexists(&self, key: &str, items: &[String]) -> BackendResult<Vec<bool>> {
        let mut state = self.state.write();
        self.enter(&mut state, "bf.mExists")?;
        Ok(match state.blooms.get(key) {
            Some(bloom) => items.iter().map(|i| bloom.items.contains(i)).collect(),
            None => vec![false; items.len()],
        })
    }

    fn do_ts_create(&self, key: &str, options: &TsCreateOptions) -> BackendResult<()> {
        let mut state = self.state.write();
        self.enter(&mut state, "ts.create")?;
        if state.series.contains_key(key) {
            return Err(BackendError::Other("ERR TSDB: key already exists".to_string()));
        }
        state.series.insert(
            key.to_string(),
            Series {
                options: options.clone(),
                samples: BTreeMap::new(),
                rules: Vec::new(),
            },
        );
        Ok(())
    }

    fn do_ts_alter(&self, key: &str, options: &TsCreateOptions) -> BackendResult<()> {
        let mut state = self.state.write();
        self.enter(&mut state, "ts.alter")?;
        let series = state.series.get_mut(key).ok_or_else(|| key_missing(key))?;
        series.options = options.clone();
        Ok(())
    }

    fn do_ts_create_rule(
        &self,
        source_key: &str,
        dest_key: &str,
        aggregation: Aggregation,
        bucket_ms: i64,
        align_ms: i64,
    ) -> BackendResult<()> {
        let mut state = self.state.write();
        self.enter(&mut state, "ts.createRule")?;
        if source_key == dest_key {
            return Err(BackendError::Other(
                "ERR TSDB: the source key and destination key should be different".to_string(),
            ));
        }
        if bucket_ms <= 0 {
            return Err(BackendError::Other(
                "ERR TSDB: bucketDuration must be greater than zero".to_string(),
            ));
        }
        if !state.series.contains_key(dest_key) {
            return Err(key_missing(dest_key));
        }
        let dest_has_source = state
            .series
            .values()
            .any(|s| s.rules.iter().any(|r| r.dest == dest_key));
        if dest_has_source {
            return Err(BackendError::Other(
                "ERR TSDB: the destination key already has a src rule".to_string(),
            ));
        }
        let source = state
            .series
            .get_mut(source_key)
            .ok_or_else(|| key_missing(source_key))?;
        source.rules.push(Rule {
            dest: dest_key.to_string(),
            aggregation,
            bucket_ms,
            align_ms,
        });
        Ok(())
    }

    fn do_ts_madd(&self, points: &[TsPoint]) -> BackendResult<()> {
        let mut state = self.state.write();
        self.enter(&mut state, "ts.mAdd")?;
        if let Some(missing) = points.iter().find(|p| !state.series.contains_key(&p.key)) {
            return Err(key_missing(&missing.key));
        }
        for point in points {
            state.upsert(&point.key, point.timestamp_ms, point.value)?;
        }
        Ok(())
    }

    fn do_ts_range(
        &self,
        key: &str,
        from: RangeBound,
        to: RangeBound,
        aggregation: Option<RangeAggregation>,
    ) -> BackendResult<Vec<Sample>> {
        let mut state = self.state.write();
        self.enter(&mut state, "ts.range")?;
        let series = state.series.get(key).ok_or_else(|| key_missing(key))?;
        series_samples(series, from, to, aggregation.as_ref())
    }

    fn do_ts_mrange(
        &self,
        from: RangeBound,
        to: RangeBound,
        filters: &[String],
        aggregation: Option<RangeAggregation>,
    ) -> BackendResult<Vec<LabeledSeries>> {
        let mut state = self.state.write();
        self.enter(&mut state, "ts.mRangeWithLabels")?;
        state
            .matching(filters)?
            .into_iter()
            .map(|(key, series)| {
                Ok(LabeledSeries {
                    key: key.clone(),
                    labels: series.options.labels.clone(),
                    samples: series_samples(series, from, to, aggregation.as_ref())?,
                })
            })
            .collect()
    }

    fn do_ts_mrange_group_by(
        &self,
        from: RangeBound,
        to: RangeBound,
        filters: &[String],
        group_by: &GroupBy,
        aggregation: Option<RangeAggregation>,
    ) -> BackendResult<Vec<LabeledSeries>> {
        let mut state = self.state.write();
        self.enter(&mut state, "ts.mRangeWithLabelsGroupBy")?;
        if group_by.reducer == Aggregation::Last {
            return Err(BackendError::Other(
                "TSDB: failed parsing reducer 'LAST'".to_string(),
            ));
        }

        let mut groups: BTreeMap<String, (Vec<String>, BTreeMap<i64, Vec<f64>>)> = BTreeMap::new();
        for (key, series) in state.matching(filters)? {
            let Some(group) = series.options.labels.get(&group_by.label) else {
                continue;
            };
            let (sources, by_ts) = groups.entry(group.clone()).or_default();
            sources.push(key.clone());
            for sample in series_samples(series, from, to, aggregation.as_ref())? {
                let slot = by_ts.entry(sample.timestamp_ms).or_default();
                if let Some(value) = sample.value {
                    slot.push(value);
                }
            }
        }

        Ok(groups
            .into_iter()
            .map(|(group, (sources, by_ts))| {
                let mut labels = BTreeMap::new();
                labels.insert(group_by.label.clone(), group.clone());
                labels.insert(
                    "__reducer__".to_string(),
                    group_by.reducer.as_str().to_ascii_lowercase(),
                );
                labels.insert("__source__".to_string(), sources.join(","));
                LabeledSeries {
                    key: format!("{}={}", group_by.label, group),
                    labels,
                    samples: by_ts
                        .into_iter()
                        .map(|(timestamp_ms, values)| Sample {
                            timestamp_ms,
                            value: group_by.reducer.reduce(&values),
                        })
                        .collect(),
                }
            })
            .collect())
    }

    fn do_pf_add(&self, key: &str, items: &[String]) -> BackendResult<bool> {
        let mut state = self.state.write();
        self.enter(&mut state, "pfAdd")?;
        Ok(Self::hll_insert(&mut state, key, items))
    }

    fn hll_insert(state: &mut State, key: &str, items: &[String]) -> bool {
        let set = state.hll.entry(key.to_string()).or_default();
        let mut changed = false;
        for item in items {
            changed |= set.insert(item.clone());
        }
        changed
    }

    fn hll_union(state: &State, keys: &[String]) -> u64 {
        let mut union: HashSet<&String> = HashSet::new();
        for key in keys {
            if let Some(set) = state.hll.get(key) {
                union.extend(set.iter());
            }
        }
        union.len() as u64
    }

    fn do_pf_count(&self, keys: &[String]) -> BackendResult<u64> {
        let mut state = self.state.write();
        self.enter(&mut state, "pfCount")?;
        if keys.is_empty() {
            return Err(BackendError::Other(
                "ERR wrong number of arguments for 'pfcount' command".to_string(),
            ));
        }
        Ok(Self::hll_union(&state, keys))
    }

    fn do_pf_merge(&self, dest_key: &str, source_keys: &[String]) -> BackendResult<()> {
        let mut state = self.state.write();
        self.enter(&mut state, "pfMerge")?;
        let mut merged = state.hll.get(dest_key).cloned().unwrap_or_default();
        for key in source_keys {
            if let Some(set) = state.hll.get(key) {
                merged.extend(set.iter().cloned());
            }
        }
        state.hll.insert(dest_key.to_string(), merged);
        Ok(())
    }

    fn do_expire(&self, key: &str, ttl_seconds: u64) -> BackendResult<()> {
        let mut state = self.state.write();
        self.enter(&mut state, "expire")?;
        state.ttls.insert(key.to_string(), ttl_seconds);
        Ok(())
    }

    fn do_exec_pipeline(&self, pipeline: Pipeline) -> BackendResult<Vec<i64>> {
        let mut state = self.state.write();
        self.enter(&mut state, "multi().execAsPipeline")?;
        let mut replies = Vec::with_capacity(pipeline.len());
        for command in pipeline.into_commands() {
            match command {
                PipelineCommand::PfAdd { key, items } => {
                    if !self.capabilities.supports("multi().pfAdd") {
                        return Err(BackendError::Unsupported("multi().pfAdd".to_string()));
                    }
                    replies.push(i64::from(Self::hll_insert(&mut state, &key, &items)));
                }
                PipelineCommand::PfCount { key } => {
                    if !self.capabilities.supports("multi().pfCount") {
                        return Err(BackendError::Unsupported("multi().pfCount".to_string()));
                    }
                    replies.push(Self::hll_union(&state, std::slice::from_ref(&key)) as i64);
                }
            }
        }
        Ok(replies)
    }
}

impl Backend for InMemoryBackend {
    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn bf_reserve<'a>(
        &'a self,
        key: &'a str,
        error_rate: f64,
        capacity: u64,
    ) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move { self.do_bf_reserve(key, error_rate, capacity) })
    }

    fn bf_madd<'a>(
        &'a self,
        key: &'a str,
        items: &'a [String],
    ) -> BoxFuture<'a, BackendResult<Vec<bool>>> {
        Box::pin(async move { self.do_bf_madd(key, items) })
    }

    fn bf_mexists<'a>(
        &'a self,
        key: &'a str,
        items: &'a [String],
    ) -> BoxFuture<'a, BackendResult<Vec<bool>>> {
        Box::pin(async move { self.do_bf_mexists(key, items) })
    }

    fn ts_create<'a>(
        &'a self,
        key: &'a str,
        options: &'a TsCreateOptions,
    ) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move { self.do_ts_create(key, options) })
    }

    fn ts_alter<'a>(
        &'a self,
        key: &'a str,
        options: &'a TsCreateOptions,
    ) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move { self.do_ts_alter(key, options) })
    }

    fn ts_create_rule<'a>(
        &'a self,
        source_key: &'a str,
        dest_key: &'a str,
        aggregation: Aggregation,
        bucket_ms: i64,
        align_ms: i64,
    ) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            self.do_ts_create_rule(source_key, dest_key, aggregation, bucket_ms, align_ms)
        })
    }

    fn ts_madd<'a>(&'a self, points: &'a [TsPoint]) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move { self.do_ts_madd(points) })
    }

    fn ts_range<'a>(
        &'a self,
        key: &'a str,
        from: RangeBound,
        to: RangeBound,
        aggregation: Option<RangeAggregation>,
    ) -> BoxFuture<'a, BackendResult<Vec<Sample>>> {
        Box::pin(async move { self.do_ts_range(key, from, to, aggregation) })
    }

    fn ts_mrange_with_labels<'a>(
        &'a self,
        from: RangeBound,
        to: RangeBound,
        filters: &'a [String],
        aggregation: Option<RangeAggregation>,
    ) -> BoxFuture<'a, BackendResult<Vec<LabeledSeries>>> {
        Box::pin(async move { self.do_ts_mrange(from, to, filters, aggregation) })
    }

    fn ts_mrange_group_by<'a>(
        &'a self,
        from: RangeBound,
        to: RangeBound,
        filters: &'a [String],
        group_by: &'a GroupBy,
        aggregation: Option<RangeAggregation>,
    ) -> BoxFuture<'a, BackendResult<Vec<LabeledSeries>>> {
        Box::pin(async move { self.do_ts_mrange_group_by(from, to, filters, group_by, aggregation) })
    }

    fn pf_add<'a>(&'a self, key: &'a str, items: &'a [String]) -> BoxFuture<'a, BackendResult<bool>> {
        Box::pin(async move { self.do_pf_add(key, items) })
    }

    fn pf_count<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, BackendResult<u64>> {
        Box::pin(async move { self.do_pf_count(keys) })
    }

    fn pf_merge<'a>(
        &'a self,
        dest_key: &'a str,
        source_keys: &'a [String],
    ) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move { self.do_pf_merge(dest_key, source_keys) })
    }

    fn expire<'a>(&'a self, key: &'a str, ttl_seconds: u64) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move { self.do_expire(key, ttl_seconds) })
    }

    fn exec_pipeline(&self, pipeline: Pipeline) -> BoxFuture<'_, BackendResult<Vec<i64>>> {
        Box::pin(async move { self.do_exec_pipeline(pipeline) })
    }
}
