//! Cardinality-sketch service

use crate::backend::Pipeline;
use crate::context::AnalyticsContext;
use crate::error::{AnalyticsError, BackendError, Result};
use futures::future::try_join_all;
use tracing::debug;

pub struct HllService<'a> {
    ctx: &'a AnalyticsContext,
}

impl<'a> HllService<'a> {
    pub(crate) fn new(ctx: &'a AnalyticsContext) -> Self {
        HllService { ctx }
    }

    pub async fn add(&self, key: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.ctx.backend().pf_add(key, ids).await?;
        Ok(())
    }

    /// Add the same or different ids to several keys, pipelined when possible
    pub async fn add_multi(&self, entries: &[(String, Vec<String>)]) -> Result<()> {
        let entries: Vec<&(String, Vec<String>)> =
            entries.iter().filter(|(_, ids)| !ids.is_empty()).collect();
        if entries.is_empty() {
            return Ok(());
        }

        if self.ctx.capabilities().supports_pipelining {
            let mut pipeline = Pipeline::new();
            for (key, ids) in &entries {
                pipeline.pf_add(key.as_str(), ids.clone());
            }
            debug!(commands = pipeline.len(), "pipelined cardinality writes");
            self.ctx.backend().exec_pipeline(pipeline).await?;
        } else {
            let backend = self.ctx.backend();
            try_join_all(entries.iter().map(|(key, ids)| backend.pf_add(key, ids))).await?;
        }
        Ok(())
    }

    /// Cardinality of the union of `keys`; no keys counts as 0
    pub async fn count(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        Ok(self.ctx.backend().pf_count(keys).await?)
    }

    /// One cardinality per key, in key order
    pub async fn count_each(&self, keys: &[String]) -> Result<Vec<u64>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        if self.ctx.capabilities().supports_pipelining {
            let mut pipeline = Pipeline::new();
            for key in keys {
                pipeline.pf_count(key.as_str());
            }
            let replies = self.ctx.backend().exec_pipeline(pipeline).await?;
            if replies.len() != keys.len() {
                return Err(AnalyticsError::Backend(BackendError::Other(format!(
                    "pipeline returned {} replies for {} commands",
                    replies.len(),
                    keys.len()
                ))));
            }
            return Ok(replies.into_iter().map(|r| r.max(0) as u64).collect());
        }

        let backend = self.ctx.backend();
        let counts =
            try_join_all(keys.iter().map(|key| backend.pf_count(std::slice::from_ref(key)))).await?;
        Ok(counts)
    }

    /// Union `sources` into `dest`, optionally expiring the result
    pub async fn merge(&self, dest: &str, sources: &[String], ttl_seconds: Option<u64>) -> Result<()> {
        let backend = self.ctx.backend();
        backend.pf_merge(dest, sources).await?;
        if let Some(ttl) = ttl_seconds {
            backend.expire(dest, ttl).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Capabilities, InMemoryBackend};
    use std::sync::Arc;

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_add_multi_uses_pipeline() {
        let backend = InMemoryBackend::new();
        let ctx = AnalyticsContext::new(Arc::new(backend.clone()));
        ctx.hll()
            .add_multi(&[("a".into(), ids(&["x", "y"])), ("b".into(), ids(&["x"]))])
            .await
            .unwrap();

        assert_eq!(backend.call_count("multi().execAsPipeline"), 1);
        assert_eq!(backend.call_count("pfAdd"), 0);
        assert_eq!(backend.hll_len("a"), 2);
        assert_eq!(backend.hll_len("b"), 1);
    }

    #[tokio::test]
    async fn test_add_multi_without_pipelining() {
        let backend = InMemoryBackend::new();
        let mut caps = Capabilities::full();
        caps.supports_pipelining = false;
        let ctx = AnalyticsContext::new(Arc::new(backend.clone())).with_capabilities(caps);
        ctx.hll()
            .add_multi(&[("a".into(), ids(&["x"])), ("b".into(), ids(&["y"]))])
            .await
            .unwrap();

        assert_eq!(backend.call_count("multi().execAsPipeline"), 0);
        assert_eq!(backend.call_count("pfAdd"), 2);
    }

    #[tokio::test]
    async fn test_count_each_and_union() {
        let backend = InMemoryBackend::new();
        let ctx = AnalyticsContext::new(Arc::new(backend));
        let hll = ctx.hll();
        hll.add("a", &ids(&["x", "y"])).await.unwrap();
        hll.add("b", &ids(&["y", "z", "w"])).await.unwrap();

        let keys = ids(&["a", "b", "missing"]);
        assert_eq!(hll.count_each(&keys).await.unwrap(), vec![2, 3, 0]);
        assert_eq!(hll.count(&keys).await.unwrap(), 4);
        assert_eq!(hll.count(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_merge_sets_ttl() {
        let backend = InMemoryBackend::new();
        let ctx = AnalyticsContext::new(Arc::new(backend.clone()));
        let hll = ctx.hll();
        hll.add("a", &ids(&["x"])).await.unwrap();
        hll.add("b", &ids(&["y"])).await.unwrap();
        hll.merge("ab", &ids(&["a", "b"]), Some(60)).await.unwrap();

        assert_eq!(backend.hll_len("ab"), 2);
        assert_eq!(backend.ttl("ab"), Some(60));
    }
}
