//! Hot path benchmarks for profiling-driven optimization.
//!
//! Run with: `cargo bench --bench hot_paths`
//! Compare baselines: `cargo bench --bench hot_paths -- --baseline main`
//!
//! Covers the per-write and per-query paths: key encoding, filter
//! expression building, change trees and a grouped read against the
//! in-memory backend.

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use redis_analytics::backend::InMemoryBackend;
use redis_analytics::compare::{absolute_change_tree, percent_change_tree, ToStatTree};
use redis_analytics::metrics::{
    dimension_filter, dimension_values, Dimension, DimensionSet, MetricKeyEncoder, SeriesFilter,
};
use redis_analytics::store::DimensionalPoint;
use redis_analytics::{Aggregation, Analytics, AnalyticsConfig, DateRange, TimeSeriesConfig};
use std::collections::BTreeMap;
use std::sync::Arc;

fn dimensions() -> DimensionSet {
    DimensionSet::new(
        "tx",
        vec![
            Dimension::closed("coin", ["btc", "eth", "sol", "tron"]),
            Dimension::closed("category", ["deposit", "withdrawal", "swap"]),
            Dimension::open("venue"),
        ],
    )
    .unwrap()
}

/// Key building on every dimensional write
fn bench_key_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_encoding");
    group.throughput(Throughput::Elements(1));

    let set = dimensions();
    let values = dimension_values([("coin", "eth"), ("category", "swap"), ("venue", "dex-1")]);
    group.bench_function("validated_build_key", |b| {
        b.iter(|| set.build_key(black_box("analytics:tx"), black_box(&values)))
    });

    group.bench_function("raw_build_key", |b| {
        b.iter(|| {
            MetricKeyEncoder::build_key(
                black_box("analytics:tx"),
                [("coin", "eth"), ("category", "swap"), ("venue", "dex-1")],
            )
        })
    });

    let key = "analytics:tx:coin=eth:category=swap:venue=dex:1";
    group.bench_function("decode_dimensions", |b| {
        b.iter(|| MetricKeyEncoder::decode_dimensions(black_box("analytics:tx"), black_box(key)))
    });

    group.finish();
}

/// Filter expressions built per query
fn bench_filter_expressions(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_expressions");
    let set = dimensions();
    let statics = BTreeMap::from([("env".to_string(), "prod".to_string())]);

    for alternatives in [1usize, 2, 4] {
        let coins: Vec<&str> = ["btc", "eth", "sol", "tron"][..alternatives].to_vec();
        let filter = dimension_filter([("coin", coins), ("category", vec!["deposit"])]);
        group.bench_function(format!("alternatives_{}", alternatives), |b| {
            b.iter(|| {
                set.filter(black_box("analytics:tx"), &statics, black_box(&filter))
                    .map(|f| f.expressions())
            })
        });
    }

    let plain = SeriesFilter::for_base_key("analytics:tx").with("coin", "btc");
    group.bench_function("expressions_only", |b| b.iter(|| black_box(&plain).expressions()));

    group.finish();
}

/// Percent and absolute trees over a breakdown-shaped result
fn bench_change_trees(c: &mut Criterion) {
    let mut group = c.benchmark_group("change_trees");

    for width in [4usize, 64] {
        let current: BTreeMap<String, BTreeMap<String, f64>> = (0..8)
            .map(|m| {
                let inner = (0..width).map(|i| (format!("v{}", i), (m * i) as f64)).collect();
                (format!("measure_{}", m), inner)
            })
            .collect();
        let previous: BTreeMap<String, BTreeMap<String, f64>> = current
            .iter()
            .map(|(k, inner)| {
                let halved = inner.iter().map(|(i, v)| (i.clone(), v / 2.0)).collect();
                (k.clone(), halved)
            })
            .collect();
        let (c_tree, p_tree) = (current.to_stat_tree(), previous.to_stat_tree());

        group.throughput(Throughput::Elements((8 * width) as u64));
        group.bench_function(format!("percent_width_{}", width), |b| {
            b.iter(|| percent_change_tree(black_box(&c_tree), black_box(&p_tree)))
        });
        group.bench_function(format!("absolute_width_{}", width), |b| {
            b.iter(|| absolute_change_tree(black_box(&c_tree), black_box(&p_tree)))
        });
    }

    group.finish();
}

/// Grouped read against the in-memory backend, native and in-process
fn bench_grouped_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("grouped_query");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let range = DateRange::new(start, start + Duration::days(7));

    for native in [true, false] {
        let mut config = AnalyticsConfig::test();
        config.capabilities.supports_native_group_by = Some(native);
        let analytics =
            Analytics::with_config(Arc::new(InMemoryBackend::new()), config).unwrap();
        let store = analytics.dimensional_store("analytics:tx", dimensions(), Some(TimeSeriesConfig::default()));

        let points: Vec<DimensionalPoint> = (0..7 * 24)
            .map(|h| DimensionalPoint {
                timestamp: start + Duration::hours(h),
                value: (h % 10) as f64,
                dimensions: dimension_values([
                    ("coin", ["btc", "eth", "sol", "tron"][(h % 4) as usize]),
                    ("category", ["deposit", "withdrawal", "swap"][(h % 3) as usize]),
                    ("venue", "dex"),
                ]),
            })
            .collect();
        rt.block_on(store.record(&points)).unwrap();

        let query = analytics.grouped_query(
            SeriesFilter::for_base_key("analytics:tx"),
            Aggregation::Sum,
            "coin",
            ["btc", "eth", "sol", "tron"],
        );
        let name = if native { "native" } else { "in_process" };
        group.bench_function(format!("{}_total", name), |b| {
            b.iter(|| rt.block_on(query.range(black_box(&range))))
        });
        group.bench_function(format!("{}_hourly", name), |b| {
            b.iter(|| rt.block_on(query.buckets(black_box(&range), redis_analytics::Bucket::Hour)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_key_encoding,
    bench_filter_expressions,
    bench_change_trees,
    bench_grouped_query,
);

criterion_main!(benches);
