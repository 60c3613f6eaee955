//! Invalidation plan generation.
//!
//! Resolves a batch of change events into the distinct pages they touch and
//! expands those pages into the keys that must be submitted.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use super::events::ChangeEvent;
use super::extension::ExtensionSet;
use super::keys::{CacheKey, DerivedKey, KeyRole, KeyScheme};
use super::resolver::{PageIdentity, PathResolver};

/// A page touched by the batch together with the event paths that hit it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPage {
    pub page: PageIdentity,
    /// Triggering paths in arrival order. Never empty.
    pub paths: Vec<String>,
}

impl PlannedPage {
    /// First path that resolved to this page, used as log context.
    pub fn trigger(&self) -> &str {
        self.paths.first().map(String::as_str).unwrap_or_default()
    }
}

/// One key to submit, with enough context to log a failure meaningfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedKey {
    pub page: PageIdentity,
    pub path: String,
    pub key: CacheKey,
    pub role: KeyRole,
}

/// Resolution result for one batch.
///
/// Pages are deduplicated and kept in first-seen order; invalidation is
/// idempotent so collapsing repeated pages does not change the end state.
#[derive(Debug, Default, Clone)]
pub struct InvalidationPlan {
    /// Number of events in the batch.
    pub events: usize,
    /// Events whose path did not resolve to a page.
    pub skipped: usize,
    /// Distinct pages, first-seen order.
    pub pages: Vec<PlannedPage>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ events: {}, matched: {}, skipped: {}, pages: {} }}",
            self.events,
            self.matched(),
            self.skipped,
            self.pages.len(),
        )
    }
}

impl InvalidationPlan {
    /// Resolve every event; unmatched events are logged and skipped.
    pub fn from_events(resolver: &PathResolver, events: &[ChangeEvent]) -> Self {
        let mut plan = Self {
            events: events.len(),
            ..Self::default()
        };
        let mut index: HashMap<PageIdentity, usize> = HashMap::new();

        for event in events {
            let Some(page) = resolver.resolve(&event.path) else {
                debug!(path = %event.path, kind = %event.kind, "Change does not belong to a tracked page");
                plan.skipped += 1;
                continue;
            };

            debug!(path = %event.path, kind = %event.kind, page = %page, "Resolved page for change");
            match index.get(&page) {
                Some(&position) => plan.pages[position].paths.push(event.path.clone()),
                None => {
                    index.insert(page.clone(), plan.pages.len());
                    plan.pages.push(PlannedPage {
                        page,
                        paths: vec![event.path.clone()],
                    });
                }
            }
        }

        plan
    }

    /// Events that resolved to a page.
    pub fn matched(&self) -> usize {
        self.events - self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Expand every page into base, variant and extension keys.
    pub fn keys(&self, scheme: &KeyScheme, extensions: &ExtensionSet) -> Vec<PlannedKey> {
        let mut keys = Vec::new();
        for planned in &self.pages {
            let derived = scheme.keys_for(&planned.page);
            let base = scheme.base_key(&planned.page);
            let extra = extensions
                .extra_keys(&planned.page, &base)
                .into_iter()
                .map(|(name, key)| DerivedKey {
                    key,
                    role: KeyRole::Extension { name },
                });

            keys.extend(derived.into_iter().chain(extra).map(|derived| PlannedKey {
                page: planned.page.clone(),
                path: planned.trigger().to_string(),
                key: derived.key,
                role: derived.role,
            }));
        }
        keys
    }
}
