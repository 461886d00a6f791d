//! Probabilistic-set service

use crate::config::BloomConfig;
use crate::context::AnalyticsContext;
use crate::error::{AnalyticsError, Result};
use tracing::debug;

pub struct BloomService<'a> {
    ctx: &'a AnalyticsContext,
}

impl<'a> BloomService<'a> {
    pub(crate) fn new(ctx: &'a AnalyticsContext) -> Self {
        BloomService { ctx }
    }

    pub async fn reserve(&self, key: &str, config: &BloomConfig) -> Result<()> {
        config.validate()?;
        self.ctx
            .backend()
            .bf_reserve(key, config.error_rate, config.capacity)
            .await?;
        debug!(key = %key, error_rate = config.error_rate, capacity = config.capacity, "reserved filter");
        Ok(())
    }

    /// Reserve unless a filter already exists under `key`
    pub async fn reserve_first(&self, key: &str, config: &BloomConfig) -> Result<()> {
        match self.reserve(key, config).await {
            Err(AnalyticsError::Backend(e)) if e.is_already_exists() => Ok(()),
            other => other,
        }
    }

    /// Insert `ids`; `true` where the id had probably been seen before
    pub async fn check_and_register(&self, key: &str, ids: &[String]) -> Result<Vec<bool>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let added = self.ctx.backend().bf_madd(key, ids).await?;
        Ok(added.into_iter().map(|fresh| !fresh).collect())
    }

    pub async fn exists(&self, key: &str, ids: &[String]) -> Result<Vec<bool>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.ctx.backend().bf_mexists(key, ids).await?)
    }
}
