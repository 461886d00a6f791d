//! Context-bound adapters over backend primitives
//!
//! Each service borrows an `AnalyticsContext` and adds the small policies
//! the stores rely on: idempotent provisioning, null→0 normalisation,
//! filter serialisation and pipelining.

mod bloom;
mod hll;
mod timeseries;

pub use bloom::BloomService;
pub use hll::HllService;
pub use timeseries::{CompactionRule, TimeSeriesService, TsSample, TsSeries};
