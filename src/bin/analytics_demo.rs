//! Analytics Demo
//!
//! Declares an exchange domain (transactions by coin and category) plus a
//! few scalar metrics on the in-memory backend, records two weeks of
//! synthetic activity and prints stats and week-over-week change as JSON.
//!
//! Usage:
//!   cargo run --bin analytics-demo [config.toml]
//!
//! Without a config file, settings come from `ANALYTICS_*` variables.

use chrono::{Duration, Utc};
use redis_analytics::backend::InMemoryBackend;
use redis_analytics::domain::Measure;
use redis_analytics::metrics::{dimension_values, Dimension};
use redis_analytics::observability::init_tracing;
use redis_analytics::store::{DimensionalPoint, TimeSeriesPoint, UniquePoint};
use redis_analytics::{
    Aggregation, Analytics, AnalyticsConfig, Bucket, MetricScope, TimeSeriesConfig, Timeframe,
};
use std::sync::Arc;
use tracing::info;

const COINS: [&str; 3] = ["btc", "eth", "sol"];
const CATEGORIES: [&str; 2] = ["deposit", "withdrawal"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => AnalyticsConfig::from_file(path)?,
        None => AnalyticsConfig::from_env(),
    };
    init_tracing(&config.logging)?;

    let backend = InMemoryBackend::new();
    let analytics = Analytics::with_config(Arc::new(backend.clone()), config)?;

    let domain = analytics
        .domain("exchange")
        .timeseries_store(
            "tx",
            [
                Dimension::closed("coin", COINS),
                Dimension::closed("category", CATEGORIES),
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
                .filter("category", "deposit")
                .breakdown("coin"),
        )
        .measure(
            "transactions",
            Measure::from_store("tx").agg(Aggregation::Count),
        )
        .build()?;
    domain.init().await?;

    let metrics = analytics
        .metrics("exchange")
        .timeseries_metric(
            "fees",
            [("fees", Aggregation::Sum), ("max_fee", Aggregation::Max)],
            TimeSeriesConfig::default(),
        )
        .hll_metric("active_users")
        .bloom_counter_metric("new_users", None)
        .build()?;
    metrics.init().await?;

    let now = Utc::now();
    let mut transfers = Vec::new();
    let mut fees = Vec::new();
    let mut users = Vec::new();
    for hour in 0..(14 * 24) {
        let when = now - Duration::hours(hour);
        let coin = COINS[(hour % 3) as usize];
        let category = CATEGORIES[(hour % 5 == 0) as usize];
        // recent week is busier
        let base = if hour < 7 * 24 { 3.0 } else { 2.0 };
        let value = base + (hour % 4) as f64;
        transfers.push(DimensionalPoint {
            timestamp: when,
            value,
            dimensions: dimension_values([("coin", coin), ("category", category)]),
        });
        fees.push(TimeSeriesPoint::new(when, value / 100.0));
        users.push(UniquePoint::new(format!("user-{}", hour % 40 + hour / 48), when));
    }
    domain.record("tx", &transfers).await?;
    metrics.record("fees", &fees).await?;
    metrics.record_unique("active_users", &users).await?;
    metrics.record_unique("new_users", &users).await?;
    info!(
        transfers = transfers.len(),
        series = backend.series_keys().len(),
        "recorded synthetic activity"
    );

    let week: MetricScope = Timeframe::LastWeek.into();
    println!("== domain stats (1w) ==");
    println!("{}", serde_json::to_string_pretty(&domain.stats(&week).await?)?);

    println!("== domain change (1w vs previous 1w) ==");
    let change = domain.change(&week, None).await?;
    println!("{}", serde_json::to_string_pretty(&change.percent)?);

    println!("== daily deposits (1w) ==");
    let series = domain.query(&["deposits"])?.series(&week, Bucket::Day).await?;
    println!("{}", serde_json::to_string_pretty(&series)?);

    println!("== scalar metrics (1w) ==");
    let report = metrics.change(&week, None).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
