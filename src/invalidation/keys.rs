//! Cache key derivation.
//!
//! Every page identity owns exactly one base key (the page path plus the
//! rendering suffix) and one variant key per configured dimension value (the
//! base key plus an encoded qualifier).

use std::fmt;

use serde::Serialize;

use super::config::{DIMENSION_PLACEHOLDER, InvalidationConfig, VALUE_PLACEHOLDER};
use super::resolver::PageIdentity;

/// Identifier of a rendered artifact in the external cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an already-encoded key, e.g. one received from an extension or a
    /// cache listing.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Which slot of a page's key set a key occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRole {
    Base,
    Variant { value: String },
    /// Contributed by a registered page cache extension.
    Extension { name: String },
}

/// A derived key together with its role, used for logging and reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKey {
    pub key: CacheKey,
    pub role: KeyRole,
}

/// Encodes page identities into cache keys.
#[derive(Debug, Clone)]
pub struct KeyScheme {
    render_suffix: String,
    dimension_name: String,
    dimension_values: Vec<String>,
    variant_template: String,
}

impl KeyScheme {
    pub fn new(config: &InvalidationConfig) -> Self {
        Self {
            render_suffix: config.render_suffix.clone(),
            dimension_name: config.dimension_name.clone(),
            dimension_values: config.dimension_values.clone(),
            variant_template: config.variant_template.clone(),
        }
    }

    /// `page + render_suffix`.
    pub fn base_key(&self, page: &PageIdentity) -> CacheKey {
        CacheKey(format!("{}{}", page.as_str(), self.render_suffix))
    }

    /// `base + qualifier(dimension_name, value)`.
    pub fn variant_key(&self, base: &CacheKey, value: &str) -> CacheKey {
        CacheKey(format!("{}{}", base.as_str(), self.qualifier(value)))
    }

    /// Render the variant template for `value`.
    ///
    /// Placeholders are substituted in one left-to-right pass, so placeholder
    /// text inside the dimension name or value is copied verbatim.
    pub fn qualifier(&self, value: &str) -> String {
        let substitutions = [
            (DIMENSION_PLACEHOLDER, self.dimension_name.as_str()),
            (VALUE_PLACEHOLDER, value),
        ];
        let mut rendered = String::with_capacity(self.variant_template.len() + value.len());
        let mut rest = self.variant_template.as_str();

        loop {
            let next = substitutions
                .iter()
                .filter_map(|(placeholder, replacement)| {
                    rest.find(placeholder)
                        .map(|at| (at, placeholder.len(), *replacement))
                })
                .min_by_key(|(at, _, _)| *at);

            match next {
                Some((at, len, replacement)) => {
                    rendered.push_str(&rest[..at]);
                    rendered.push_str(replacement);
                    rest = &rest[at + len..];
                }
                None => {
                    rendered.push_str(rest);
                    return rendered;
                }
            }
        }
    }

    /// All keys for `page`: the base key first, then one variant per dimension
    /// value in configured order.
    pub fn keys_for(&self, page: &PageIdentity) -> Vec<DerivedKey> {
        let base = self.base_key(page);
        let mut keys = Vec::with_capacity(1 + self.dimension_values.len());
        keys.push(DerivedKey {
            key: base.clone(),
            role: KeyRole::Base,
        });
        for value in &self.dimension_values {
            keys.push(DerivedKey {
                key: self.variant_key(&base, value),
                role: KeyRole::Variant {
                    value: value.clone(),
                },
            });
        }
        keys
    }
}
