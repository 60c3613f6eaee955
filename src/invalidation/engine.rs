//! Outbound contract to the cache service.

use async_trait::async_trait;
use thiserror::Error;

use super::keys::CacheKey;

/// Failure reported by the cache service for a single key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The key was rejected by the cache service's own validation.
    #[error("cannot build cache key `{key}`: {reason}")]
    KeyConstruction { key: String, reason: String },
    /// The store could not perform the invalidation.
    #[error("cache persistence failed for `{key}`: {reason}")]
    Persistence { key: String, reason: String },
}

impl EngineError {
    pub fn key_construction(key: &CacheKey, reason: impl Into<String>) -> Self {
        Self::KeyConstruction {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn persistence(key: &CacheKey, reason: impl Into<String>) -> Self {
        Self::Persistence {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::KeyConstruction { .. } => "key_construction",
            EngineError::Persistence { .. } => "persistence",
        }
    }
}

/// Cache service exposing invalidate-by-key.
///
/// Implementations must tolerate concurrent calls, and invalidating a key that
/// is absent or already invalidated must succeed.
#[async_trait]
pub trait CacheEngine: Send + Sync {
    async fn invalidate(&self, key: &CacheKey) -> Result<(), EngineError>;
}
