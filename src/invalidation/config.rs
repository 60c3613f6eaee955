//! Invalidation configuration.
//!
//! Built once at startup from the `[invalidation]` settings table and shared
//! read-only (behind an `Arc`) by the resolver, the key scheme and the
//! dispatcher.

use std::num::NonZeroUsize;

use super::events::ChangeKind;

pub const DEFAULT_WATCH_ROOT: &str = "/content/layout-wcm";
pub const DEFAULT_CATEGORIES: &[&str] = &["headers", "footers"];
pub const DEFAULT_MAX_ID_LEN: usize = 99;
pub const DEFAULT_RENDER_SUFFIX: &str = "/jcr:content.content.html";
pub const DEFAULT_DIMENSION_NAME: &str = "user-group";
pub const DEFAULT_DIMENSION_VALUES: &[&str] = &["anonymous", "authenticated"];
pub const DEFAULT_VARIANT_TEMPLATE: &str = "[CookieKeyValues:{dimension}={value}]";

pub const DIMENSION_PLACEHOLDER: &str = "{dimension}";
pub const VALUE_PLACEHOLDER: &str = "{value}";

/// Process-wide, immutable invalidation settings.
#[derive(Debug, Clone)]
pub struct InvalidationConfig {
    /// Root path the change subscription is registered for.
    pub watch_root: String,
    /// Allow-listed category segments directly below the root.
    pub categories: Vec<String>,
    /// Maximum length of the page identifier segment.
    pub max_id_len: usize,
    /// Suffix appended to a page identity to form its base cache key.
    pub render_suffix: String,
    /// Name of the personalization dimension encoded into variant keys.
    pub dimension_name: String,
    /// Ordered set of dimension values; one variant key is derived per value.
    pub dimension_values: Vec<String>,
    /// Qualifier template with `{dimension}` and `{value}` placeholders.
    pub variant_template: String,
    /// Change kinds the subscription listens for.
    pub change_kinds: Vec<ChangeKind>,
    /// Upper bound on in-flight invalidate calls within one dispatch.
    pub max_concurrent_invalidations: NonZeroUsize,
}

impl Default for InvalidationConfig {
    fn default() -> Self {
        Self {
            watch_root: DEFAULT_WATCH_ROOT.to_string(),
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            max_id_len: DEFAULT_MAX_ID_LEN,
            render_suffix: DEFAULT_RENDER_SUFFIX.to_string(),
            dimension_name: DEFAULT_DIMENSION_NAME.to_string(),
            dimension_values: DEFAULT_DIMENSION_VALUES
                .iter()
                .map(|v| v.to_string())
                .collect(),
            variant_template: DEFAULT_VARIANT_TEMPLATE.to_string(),
            change_kinds: ChangeKind::ALL.to_vec(),
            max_concurrent_invalidations: NonZeroUsize::MIN,
        }
    }
}

impl From<&crate::config::InvalidationSettings> for InvalidationConfig {
    fn from(settings: &crate::config::InvalidationSettings) -> Self {
        Self {
            watch_root: settings.watch_root.clone(),
            categories: settings.categories.clone(),
            max_id_len: settings.max_id_len.get(),
            render_suffix: settings.render_suffix.clone(),
            dimension_name: settings.dimension_name.clone(),
            dimension_values: settings.dimension_values.clone(),
            variant_template: settings.variant_template.clone(),
            change_kinds: settings.change_kinds.clone(),
            max_concurrent_invalidations: settings.max_concurrent_invalidations,
        }
    }
}

impl InvalidationConfig {
    /// Number of keys derived for every resolved page.
    pub fn keys_per_page(&self) -> usize {
        1 + self.dimension_values.len()
    }

    /// Returns true when invalidations are submitted one at a time.
    pub fn is_sequential(&self) -> bool {
        self.max_concurrent_invalidations.get() == 1
    }
}
