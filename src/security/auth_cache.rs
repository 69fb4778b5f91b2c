//! API key cache.
//!
//! Validated API keys are cached with an expiry so the listeners do not
//! round-trip to the storage engine on every request. Teardown always ends
//! with [`ApiKeyCache::reset`], so no credential outlives the servers that
//! cached it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// What is known about a validated key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedApiKey {
    /// Databases the key grants access to.
    pub databases: Vec<String>,
    pub expires_at: Instant,
}

/// A thread-safe cache of validated API keys.
#[derive(Clone, Default)]
pub struct ApiKeyCache {
    inner: Arc<DashMap<String, CachedApiKey>>,
}

impl ApiKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache `key` for `ttl`.
    pub fn insert(&self, key: impl Into<String>, databases: Vec<String>, ttl: Duration) {
        self.inner.insert(
            key.into(),
            CachedApiKey {
                databases,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Look up a key, evicting it if it has expired.
    pub fn get(&self, key: &str) -> Option<CachedApiKey> {
        let now = Instant::now();
        // Only evicts the entry that was seen expired, not a fresh re-insert.
        if self
            .inner
            .remove_if(key, |_, cached| cached.expires_at <= now)
            .is_some()
        {
            return None;
        }
        self.inner
            .get(key)
            .filter(|cached| cached.expires_at > now)
            .map(|cached| cached.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop every cached key.
    pub fn reset(&self) {
        let cleared = self.inner.len();
        self.inner.clear();
        tracing::debug!(cleared, "API key cache reset");
    }
}
