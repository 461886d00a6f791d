//! Dimensional metric engine over a Redis-Stack-style backend
//!
//! Records and queries time-bucketed metrics through a small set of
//! backend primitives (time series, cardinality sketches, probabilistic
//! sets). See `Analytics` for the entry point.

pub mod analytics;
pub mod backend;
pub mod compare;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod query;
pub mod services;
pub mod store;
pub mod time;

pub use analytics::Analytics;
pub use backend::{Aggregation, Backend, InMemoryBackend};
pub use config::{AnalyticsConfig, BloomConfig, TimeSeriesConfig};
pub use context::AnalyticsContext;
pub use error::{AnalyticsError, BackendError, Result};
pub use time::{AnalyticBucket, Bucket, DateRange, MetricScope, Timeframe};
