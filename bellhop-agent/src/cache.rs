//! Shell asset cache.
//!
//! Cache-first lookup for the handful of assets the offline shell
//! needs. This is not notification-critical: every failure is logged
//! and absorbed, never propagated to the alert path.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{AgentError, AgentResult};

/// One cached asset.
#[derive(Debug, Clone)]
pub struct CachedAsset {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    /// Fetch time (UTC millis).
    pub fetched_at: i64,
}

/// Small fetch-through asset cache.
#[derive(Debug, Clone)]
pub struct ShellCache {
    client: reqwest::Client,
    entries: Arc<DashMap<String, Arc<CachedAsset>>>,
}

impl ShellCache {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Warm the cache. Individual failures are logged and skipped.
    pub async fn prefetch(&self, urls: &[String]) {
        for url in urls {
            if let Err(e) = self.fetch_into_cache(url).await {
                tracing::warn!(url = %url, error = %e, "Shell asset prefetch failed");
            }
        }
        tracing::debug!(cached = self.entries.len(), "Shell cache warmed");
    }

    /// Cache-first lookup; fetches on miss, `None` when both fail.
    pub async fn get(&self, url: &str) -> Option<Arc<CachedAsset>> {
        if let Some(entry) = self.entries.get(url) {
            return Some(entry.value().clone());
        }
        match self.fetch_into_cache(url).await {
            Ok(asset) => Some(asset),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Shell asset fetch failed");
                None
            }
        }
    }

    async fn fetch_into_cache(&self, url: &str) -> AgentResult<Arc<CachedAsset>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AgentError::Cache(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AgentError::Cache(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AgentError::Cache(e.to_string()))?;
        let asset = Arc::new(CachedAsset {
            bytes: bytes.to_vec(),
            content_type,
            fetched_at: shared::util::now_millis(),
        });
        self.entries.insert(url.to_string(), asset.clone());
        Ok(asset)
    }

    /// Seed an entry directly (tests, pre-bundled assets).
    pub fn put(&self, url: impl Into<String>, asset: CachedAsset) {
        self.entries.insert(url.into(), Arc::new(asset));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ShellCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeded_entry_served_from_cache() {
        let cache = ShellCache::new();
        cache.put(
            "app://shell/index.html",
            CachedAsset {
                bytes: b"<html></html>".to_vec(),
                content_type: Some("text/html".into()),
                fetched_at: 1,
            },
        );

        let asset = cache.get("app://shell/index.html").await.unwrap();
        assert_eq!(asset.bytes, b"<html></html>");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_miss_on_unreachable_url_is_absorbed() {
        let cache = ShellCache::new();
        // Unroutable address: must return None, not error out.
        assert!(cache.get("http://127.0.0.1:1/missing.css").await.is_none());
        assert!(cache.is_empty());
    }
}
