//! Extension point for additional per-page keys.
//!
//! The set is empty unless the host registers extensions, in which case the
//! dispatcher behaves exactly as if this module did not exist.

use std::fmt;
use std::sync::Arc;

use super::keys::CacheKey;
use super::resolver::PageIdentity;

/// Contributes extra cache keys for a resolved page.
///
/// Keys returned here are submitted after the base and variant keys and are
/// subject to the same failure handling.
pub trait PageCacheExtension: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Extra keys to invalidate for `page`, whose base key is `base`.
    fn extra_keys(&self, page: &PageIdentity, base: &CacheKey) -> Vec<CacheKey>;
}

/// Registered extensions, in registration order.
#[derive(Clone, Default)]
pub struct ExtensionSet {
    extensions: Vec<Arc<dyn PageCacheExtension>>,
}

impl ExtensionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, extension: Arc<dyn PageCacheExtension>) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Collect extra keys from every extension as `(extension name, key)`.
    pub fn extra_keys(&self, page: &PageIdentity, base: &CacheKey) -> Vec<(String, CacheKey)> {
        self.extensions
            .iter()
            .flat_map(|extension| {
                let name = extension.name().to_string();
                extension
                    .extra_keys(page, base)
                    .into_iter()
                    .map(move |key| (name.clone(), key))
            })
            .collect()
    }
}

impl fmt::Debug for ExtensionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.extensions.iter().map(|e| e.name()))
            .finish()
    }
}
