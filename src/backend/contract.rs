//! Client contract check
//!
//! A backend handle advertises the primitive paths it serves. Startup
//! validation walks the required list in a fixed order and fails on the
//! first gap, naming the path, instead of failing deep inside a query.

use super::Backend;
use crate::error::{AnalyticsError, Result};
use std::collections::BTreeSet;

/// Every primitive path the analytics layer may call, in check order
pub const REQUIRED_METHODS: [&str; 18] = [
    "bf.reserve",
    "bf.mAdd",
    "bf.mExists",
    "ts.create",
    "ts.alter",
    "ts.createRule",
    "ts.mAdd",
    "ts.range",
    "ts.mRangeWithLabels",
    "ts.mRangeWithLabelsGroupBy",
    "pfAdd",
    "pfCount",
    "pfMerge",
    "expire",
    "multi",
    "multi().pfAdd",
    "multi().pfCount",
    "multi().execAsPipeline",
];

/// What a backend handle can do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    methods: BTreeSet<&'static str>,
    /// Batch independent HLL reads/writes into one round trip
    pub supports_pipelining: bool,
    /// Reduce grouped series on the backend instead of in process
    pub supports_native_group_by: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::full()
    }
}

impl Capabilities {
    /// Every required path, pipelining and native group-by
    pub fn full() -> Self {
        Capabilities {
            methods: REQUIRED_METHODS.into_iter().collect(),
            supports_pipelining: true,
            supports_native_group_by: true,
        }
    }

    /// Remove a path (e.g. a server without the bloom module)
    pub fn without(mut self, path: &str) -> Self {
        self.methods.retain(|m| *m != path);
        self
    }

    pub fn supports(&self, path: &str) -> bool {
        self.methods.contains(path)
    }

    /// First required path that is not served, in check order
    pub fn first_missing(&self) -> Option<&'static str> {
        REQUIRED_METHODS.into_iter().find(|path| !self.supports(path))
    }
}

/// Fail fast when the handle lacks a primitive the layer depends on
pub fn assert_client_contract(backend: &dyn Backend) -> Result<()> {
    match backend.capabilities().first_missing() {
        Some(path) => Err(AnalyticsError::ContractViolation {
            path: path.to_string(),
        }),
        None => Ok(()),
    }
}
