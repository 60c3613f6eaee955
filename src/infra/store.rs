//! In-memory rendering cache.
//!
//! Holds rendered bodies keyed by cache key with LRU eviction, and implements
//! [`CacheEngine`] so the dispatcher can evict from it directly.

use std::num::NonZeroUsize;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tracing::trace;

use crate::invalidation::{CacheEngine, CacheKey, EngineError};

use super::lock;

const OWNER: &str = "infra::store";

pub struct LocalCacheStore {
    entries: RwLock<LruCache<String, Bytes>>,
}

impl LocalCacheStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Store a rendered body under `key`, evicting the least recently used
    /// entry when full.
    pub fn put(&self, key: &CacheKey, body: impl Into<Bytes>) -> Result<(), EngineError> {
        validate(key)?;
        lock::write(&self.entries, OWNER, "put").put(key.as_str().to_string(), body.into());
        Ok(())
    }

    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        lock::write(&self.entries, OWNER, "get")
            .get(key.as_str())
            .cloned()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        lock::read(&self.entries, OWNER, "contains").contains(key.as_str())
    }

    pub fn len(&self) -> usize {
        lock::read(&self.entries, OWNER, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keys must be absolute paths without whitespace.
fn validate(key: &CacheKey) -> Result<(), EngineError> {
    let raw = key.as_str();
    if !raw.starts_with('/') {
        return Err(EngineError::key_construction(
            key,
            "key must be an absolute path",
        ));
    }
    if raw.chars().any(char::is_whitespace) {
        return Err(EngineError::key_construction(
            key,
            "key must not contain whitespace",
        ));
    }
    Ok(())
}

#[async_trait]
impl CacheEngine for LocalCacheStore {
    async fn invalidate(&self, key: &CacheKey) -> Result<(), EngineError> {
        validate(key)?;
        let removed = lock::write(&self.entries, OWNER, "invalidate")
            .pop(key.as_str())
            .is_some();
        trace!(key = %key, removed, "Local cache entry invalidated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(capacity: usize) -> LocalCacheStore {
        LocalCacheStore::new(NonZeroUsize::new(capacity).expect("non-zero capacity"))
    }

    fn key(raw: &str) -> CacheKey {
        CacheKey::from_raw(raw)
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let store = store(4);
        let k = key("/content/layout-wcm/headers/global/jcr:content.content.html");
        store.put(&k, "<header/>").expect("valid key");
        assert!(store.contains(&k));

        store.invalidate(&k).await.expect("invalidate succeeds");
        assert!(!store.contains(&k));
        assert!(store.get(&k).is_none());
    }

    #[tokio::test]
    async fn invalidate_is_idempotent() {
        let store = store(4);
        let k = key("/a/jcr:content.content.html");
        store.put(&k, "body").expect("valid key");

        assert!(store.invalidate(&k).await.is_ok());
        assert!(store.invalidate(&k).await.is_ok());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn invalidating_absent_key_succeeds() {
        let store = store(4);
        assert!(store.invalidate(&key("/never/cached")).await.is_ok());
    }

    #[tokio::test]
    async fn malformed_keys_are_rejected() {
        let store = store(4);

        let relative = store.invalidate(&key("relative/path")).await;
        assert!(matches!(
            relative,
            Err(EngineError::KeyConstruction { .. })
        ));

        let spaced = store.put(&key("/with space"), "x");
        assert!(matches!(spaced, Err(EngineError::KeyConstruction { .. })));
    }

    #[test]
    fn evicts_least_recently_used() {
        let store = store(2);
        store.put(&key("/a"), "a").expect("valid key");
        store.put(&key("/b"), "b").expect("valid key");
        assert!(store.get(&key("/a")).is_some());
        store.put(&key("/c"), "c").expect("valid key");

        assert!(store.contains(&key("/a")));
        assert!(!store.contains(&key("/b")));
        assert_eq!(store.len(), 2);
    }
}
