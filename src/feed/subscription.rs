//! Subscription filters and the listener contract.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;

use crate::invalidation::{ChangeEvent, ChangeKind};

/// Receives batches of change events from a feed.
///
/// Delivery is fire-and-forget: listeners handle their own failures.
#[async_trait]
pub trait ChangeListener: Send + Sync {
    async fn on_change(&self, changes: Vec<ChangeEvent>);
}

/// Handle returned by [`super::ChangeFeed::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Root path and change kinds a subscriber is interested in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionFilter {
    root: String,
    kinds: HashSet<ChangeKind>,
}

impl SubscriptionFilter {
    pub fn new(root: impl Into<String>, kinds: impl IntoIterator<Item = ChangeKind>) -> Self {
        let root = root.into();
        let root = match root.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        };
        Self {
            root,
            kinds: kinds.into_iter().collect(),
        }
    }

    /// True when `event` is of a listed kind and at or below the root.
    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        self.kinds.contains(&event.kind) && self.covers(&event.path)
    }

    fn covers(&self, path: &str) -> bool {
        if self.root == "/" {
            return path.starts_with('/');
        }
        match path.strip_prefix(self.root.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }
}
