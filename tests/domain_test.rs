//! Domain Integration Tests
//!
//! Builds dimensional domains and scalar metric sets through the facade and
//! checks stats, series and period-over-period change reports end to end.

use chrono::{DateTime, TimeZone, Utc};
use redis_analytics::backend::InMemoryBackend;
use redis_analytics::compare::{ChangeStatus, ChangeTree};
use redis_analytics::domain::{AnalyticsDomain, Measure, MeasureSeries, MeasureStat};
use redis_analytics::metrics::{dimension_values, Dimension};
use redis_analytics::store::{DimensionalPoint, TimeSeriesPoint, UniquePoint};
use redis_analytics::time::FixedClock;
use redis_analytics::{
    Aggregation, Analytics, AnalyticsConfig, AnalyticsError, Bucket, DateRange, MetricScope,
    TimeSeriesConfig, Timeframe,
};
use std::sync::Arc;

fn at(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, h, 0, 0).unwrap()
}

fn analytics_with(config: AnalyticsConfig) -> Analytics {
    Analytics::with_config(Arc::new(InMemoryBackend::new()), config)
        .unwrap()
        .with_clock(Arc::new(FixedClock::new(at(10, 0))))
}

fn tx(when: DateTime<Utc>, value: f64, coin: &str, category: &str) -> DimensionalPoint {
    DimensionalPoint {
        timestamp: when,
        value,
        dimensions: dimension_values([("coin", coin), ("category", category)]),
    }
}

async fn exchange_domain(analytics: &Analytics) -> AnalyticsDomain {
    let domain = analytics
        .domain("exchange")
        .timeseries_store(
            "tx",
            [
                Dimension::closed("coin", ["btc", "eth", "sol"]),
                Dimension::closed("category", ["deposit", "withdrawal"]),
            ],
            TimeSeriesConfig::default(),
        )
        .measure(
            "volume",
            Measure::from_store("tx").agg(Aggregation::Sum).breakdown("coin"),
        )
        .measure(
            "withdrawals",
            Measure::from_store("tx")
                .agg(Aggregation::Sum)
                .filter("category", "withdrawal"),
        )
        .measure(
            "largest",
            Measure::from_store("tx").agg(Aggregation::Max).reducer(Aggregation::Max),
        )
        .build()
        .unwrap();
    domain.init().await.unwrap();
    domain
        .record(
            "tx",
            &[
                tx(at(8, 1), 10.0, "btc", "deposit"),
                tx(at(8, 1), 5.0, "eth", "deposit"),
                tx(at(9, 3), 2.0, "btc", "withdrawal"),
                tx(at(1, 5), 8.0, "btc", "deposit"),
            ],
        )
        .await
        .unwrap();
    domain
}

// ============================================================================
// Dimensional Domain
// ============================================================================

#[tokio::test]
async fn test_domain_stats_over_last_week() {
    let analytics = analytics_with(AnalyticsConfig::test());
    let domain = exchange_domain(&analytics).await;
    let stats = domain.stats(&Timeframe::LastWeek.into()).await.unwrap();

    match &stats["volume"] {
        MeasureStat::Breakdown { overall, breakdown } => {
            assert_eq!(*overall, 17.0);
            assert_eq!(breakdown["btc"], 12.0);
            assert_eq!(breakdown["eth"], 5.0);
            assert_eq!(breakdown["sol"], 0.0);
        }
        other => panic!("expected a breakdown, got {other:?}"),
    }
    assert_eq!(stats["withdrawals"].overall(), 2.0);
    assert_eq!(stats["largest"].overall(), 10.0);
}

#[tokio::test]
async fn test_domain_results_match_without_native_group_by() {
    let mut config = AnalyticsConfig::test();
    config.capabilities.supports_native_group_by = Some(false);
    config.capabilities.supports_pipelining = Some(false);
    let fallback = exchange_domain(&analytics_with(config)).await;
    let native = exchange_domain(&analytics_with(AnalyticsConfig::test())).await;

    let scope: MetricScope = Timeframe::LastWeek.into();
    assert_eq!(
        fallback.stats(&scope).await.unwrap(),
        native.stats(&scope).await.unwrap()
    );
    assert_eq!(
        fallback.series(&scope, Bucket::Day).await.unwrap(),
        native.series(&scope, Bucket::Day).await.unwrap()
    );
}

#[tokio::test]
async fn test_domain_series_by_day() {
    let analytics = analytics_with(AnalyticsConfig::test());
    let domain = exchange_domain(&analytics).await;
    let range: MetricScope = DateRange::new(at(7, 0), at(10, 0)).into();
    let series = domain.series(&range, Bucket::Day).await.unwrap();

    match &series["volume"] {
        MeasureSeries::Breakdown { overall, breakdown } => {
            let values: Vec<f64> = overall.iter().map(|b| b.value).collect();
            assert_eq!(values, vec![0.0, 15.0, 2.0]);
            assert_eq!(overall[1].timestamp, at(8, 0));
            let btc: Vec<f64> = breakdown["btc"].iter().map(|b| b.value).collect();
            assert_eq!(btc, vec![0.0, 10.0, 2.0]);
        }
        other => panic!("expected a breakdown, got {other:?}"),
    }
}

#[tokio::test]
async fn test_domain_change_report_serializes() {
    let analytics = analytics_with(AnalyticsConfig::test());
    let domain = exchange_domain(&analytics).await;
    let report = domain
        .query(&["volume"])
        .unwrap()
        .change(&Timeframe::LastWeek.into(), None)
        .await
        .unwrap();

    let overall = report
        .percent
        .get("volume")
        .and_then(|v| v.get("overall"))
        .and_then(ChangeTree::as_leaf)
        .unwrap();
    assert_eq!(overall.status, ChangeStatus::Increase);
    assert_eq!(overall.value, Some(112.5));

    let sol = report
        .percent
        .get("volume")
        .and_then(|v| v.get("breakdown"))
        .and_then(|b| b.get("sol"))
        .and_then(ChangeTree::as_leaf)
        .unwrap();
    assert_eq!(sol.status, ChangeStatus::StableAtZero);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["current"]["volume"]["overall"], 17.0);
    assert_eq!(json["percent"]["volume"]["breakdown"]["eth"]["status"], "new");
    assert_eq!(json["absolute"]["volume"]["overall"], 9.0);
}

#[tokio::test]
async fn test_domain_rejects_unknown_measure() {
    let analytics = analytics_with(AnalyticsConfig::test());
    let domain = exchange_domain(&analytics).await;
    assert!(matches!(
        domain.query(&["volume", "fees"]),
        Err(AnalyticsError::UnknownMetric(ref name)) if name == "fees"
    ));
}

// ============================================================================
// Scalar Metrics
// ============================================================================

#[tokio::test]
async fn test_scalar_metrics_through_facade() {
    let analytics = analytics_with(AnalyticsConfig::test());
    let metrics = analytics
        .metrics("app")
        .timeseries_metric("volume", [("volume", Aggregation::Sum)], TimeSeriesConfig::default())
        .bloom_counter_metric("signups", None)
        .hll_metric("visitors")
        .build()
        .unwrap();
    metrics.init().await.unwrap();
    metrics.init().await.unwrap();

    metrics
        .record("volume", &[TimeSeriesPoint::new(at(9, 1), 3.0)])
        .await
        .unwrap();
    let ids = [
        UniquePoint::new("u1", at(8, 1)),
        UniquePoint::new("u2", at(8, 2)),
        UniquePoint::new("u1", at(9, 1)),
        UniquePoint::new("u3", at(9, 2)),
    ];
    metrics.record_unique("signups", &ids).await.unwrap();
    metrics.record_unique("visitors", &ids).await.unwrap();

    let lifetime = metrics.stats(&Timeframe::Lifetime.into()).await.unwrap();
    assert_eq!(lifetime["signups"], 3.0);
    assert_eq!(lifetime["visitors"], 3.0);
    assert_eq!(lifetime["volume"], 3.0);

    let day: MetricScope = DateRange::new(at(9, 0), at(10, 0)).into();
    let stats = metrics.stats(&day).await.unwrap();
    assert_eq!(stats["signups"], 1.0);
    assert_eq!(stats["visitors"], 2.0);
}

#[tokio::test]
async fn test_config_from_toml_drives_facade() {
    let config = AnalyticsConfig::from_toml_str(
        r#"
lifetime_series_timeframe = "1m"

[bloom]
capacity = 1000

[capabilities]
supports_native_group_by = false
"#,
    )
    .unwrap();
    let analytics = analytics_with(config);
    assert_eq!(analytics.config().bloom.capacity, 1000);
    assert_eq!(analytics.config().lifetime_series_timeframe, Timeframe::LastMonth);
    assert!(!analytics.context().capabilities().supports_native_group_by);
    assert!(analytics.context().capabilities().supports_pipelining);
}
