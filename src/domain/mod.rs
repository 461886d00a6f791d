//! Declarative analytics domains
//!
//! Builders that turn a prefix plus a handful of declarations into stores,
//! queries and change reports:
//!
//! - `AnalyticsDomainBuilder`: dimensional stores and the measures read from them
//! - `AnalyticsMetricsBuilder`: scalar series, rollup sketches and first-seen counters

mod dimensional;
mod scalar;

pub use dimensional::{
    AnalyticsDomain, AnalyticsDomainBuilder, DomainSeries, DomainStats, Measure, MeasureSeries,
    MeasureStat, QueryRunner,
};
pub use scalar::{AnalyticsMetrics, AnalyticsMetricsBuilder, MetricSeries, MetricStats};
