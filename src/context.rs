//! Explicit analytics context
//!
//! One value per configured instance carrying the backend handle, the clock
//! and the effective capabilities. Stores, queries and services receive it
//! at construction; nothing reads a global.

use crate::backend::{Backend, Capabilities};
use crate::config::CapabilityOverrides;
use crate::services::{BloomService, HllService, TimeSeriesService};
use crate::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Clone)]
pub struct AnalyticsContext {
    backend: Arc<dyn Backend>,
    clock: Arc<dyn Clock>,
    capabilities: Arc<Capabilities>,
}

impl std::fmt::Debug for AnalyticsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsContext")
            .field("capabilities", &self.capabilities)
            .field("now", &self.clock.now())
            .finish()
    }
}

impl AnalyticsContext {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let capabilities = Arc::new(backend.capabilities());
        AnalyticsContext {
            backend,
            clock: Arc::new(SystemClock),
            capabilities,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Arc::new(capabilities);
        self
    }

    /// Apply configured overrides on top of what the backend advertises
    pub fn with_overrides(self, overrides: &CapabilityOverrides) -> Self {
        let mut capabilities = (*self.capabilities).clone();
        if let Some(pipelining) = overrides.supports_pipelining {
            capabilities.supports_pipelining = pipelining;
        }
        if let Some(group_by) = overrides.supports_native_group_by {
            capabilities.supports_native_group_by = group_by;
        }
        self.with_capabilities(capabilities)
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn timeseries(&self) -> TimeSeriesService<'_> {
        TimeSeriesService::new(self)
    }

    pub fn hll(&self) -> HllService<'_> {
        HllService::new(self)
    }

    pub fn bloom(&self) -> BloomService<'_> {
        BloomService::new(self)
    }
}
