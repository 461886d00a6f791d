//! Key and dimension model
//!
//! Turns a metric's base key and dimension assignment into backend keys,
//! labels and series filters:
//!
//! - **Deterministic keys**: segments follow declaration order
//! - **Collision-free**: values never contain `=`, so distinct assignments
//!   give distinct keys
//! - **Closed vocabularies**: unknown dimensions and undeclared values are
//!   rejected before anything reaches the backend

mod dimension;
mod filter;
mod key_encoder;
mod registry;

pub use dimension::{dimension_filter, dimension_values, Dimension, DimensionSet, DimensionValues};
pub use filter::{DimensionFilter, FilterValue, SeriesFilter, BASE_KEY_LABEL};
pub use key_encoder::{MetricKeyEncoder, ASSIGNMENT_DELIMITER, SEGMENT_DELIMITER};
pub use registry::{DimensionalMetric, DimensionalMetricDef};
