//! Invalidation dispatcher.
//!
//! Turns a batch of change events into invalidate calls against the cache
//! engine. A failing key is logged and recorded, never propagated: the batch
//! always runs to completion.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use tracing::{debug, error, info, instrument};

use crate::feed::{ChangeFeed, ChangeListener, SubscriptionFilter, SubscriptionId};

use super::config::InvalidationConfig;
use super::engine::{CacheEngine, EngineError};
use super::events::ChangeEvent;
use super::extension::ExtensionSet;
use super::keys::{CacheKey, KeyScheme};
use super::planner::{InvalidationPlan, PlannedKey};
use super::resolver::{PageIdentity, PathResolver, ResolverError};

const METRIC_DISPATCH_MS: &str = "layout_flush_dispatch_ms";
const METRIC_KEYS_INVALIDATED: &str = "layout_flush_keys_invalidated_total";
const METRIC_INVALIDATION_FAILURES: &str = "layout_flush_invalidation_failures_total";
const METRIC_EVENTS_SKIPPED: &str = "layout_flush_events_skipped_total";

/// A key the cache engine refused to invalidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationFailure {
    pub page: PageIdentity,
    pub path: String,
    pub key: CacheKey,
    pub error: EngineError,
}

/// Outcome of one dispatched batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub events: usize,
    pub matched: usize,
    pub skipped: usize,
    pub pages: usize,
    pub attempted: usize,
    pub invalidated: usize,
    pub failures: Vec<InvalidationFailure>,
}

impl DispatchReport {
    /// True when every attempted key was invalidated.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Resolves change batches and evicts the affected page renderings.
pub struct InvalidationDispatcher {
    config: Arc<InvalidationConfig>,
    resolver: PathResolver,
    scheme: KeyScheme,
    engine: Arc<dyn CacheEngine>,
    extensions: ExtensionSet,
}

impl InvalidationDispatcher {
    /// Create a dispatcher over `engine` using the shared configuration.
    pub fn new(
        config: Arc<InvalidationConfig>,
        engine: Arc<dyn CacheEngine>,
    ) -> Result<Self, ResolverError> {
        let resolver = PathResolver::new(&config)?;
        let scheme = KeyScheme::new(&config);
        Ok(Self {
            config,
            resolver,
            scheme,
            engine,
            extensions: ExtensionSet::new(),
        })
    }

    pub fn with_extensions(mut self, extensions: ExtensionSet) -> Self {
        self.extensions = extensions;
        self
    }

    /// Resolve `events` without touching the cache engine.
    pub fn plan(&self, events: &[ChangeEvent]) -> InvalidationPlan {
        InvalidationPlan::from_events(&self.resolver, events)
    }

    /// Every key a dispatch of `events` would submit, in submission order.
    pub fn planned_keys(&self, events: &[ChangeEvent]) -> Vec<PlannedKey> {
        self.plan(events).keys(&self.scheme, &self.extensions)
    }

    /// Invalidate every key derived from `events`.
    ///
    /// Never fails; per-key errors are logged and listed in the report.
    #[instrument(skip_all, fields(events = events.len()))]
    pub async fn dispatch(&self, events: &[ChangeEvent]) -> DispatchReport {
        let started_at = Instant::now();
        let plan = self.plan(events);
        let keys = plan.keys(&self.scheme, &self.extensions);

        info!(plan = %plan, keys = keys.len(), "Cache invalidation starting");
        if plan.skipped > 0 {
            counter!(METRIC_EVENTS_SKIPPED).increment(plan.skipped as u64);
        }

        let mut report = DispatchReport {
            events: plan.events,
            matched: plan.matched(),
            skipped: plan.skipped,
            pages: plan.pages.len(),
            attempted: keys.len(),
            ..DispatchReport::default()
        };

        let outcomes: Vec<Result<(), InvalidationFailure>> = if self.config.is_sequential() {
            let mut outcomes = Vec::with_capacity(keys.len());
            for planned in keys {
                outcomes.push(self.submit(planned).await);
            }
            outcomes
        } else {
            stream::iter(keys)
                .map(|planned| self.submit(planned))
                .buffer_unordered(self.config.max_concurrent_invalidations.get())
                .collect()
                .await
        };

        for outcome in outcomes {
            match outcome {
                Ok(()) => report.invalidated += 1,
                Err(failure) => report.failures.push(failure),
            }
        }

        info!(
            pages = report.pages,
            invalidated = report.invalidated,
            failed = report.failures.len(),
            skipped = report.skipped,
            "Cache invalidation complete"
        );
        histogram!(METRIC_DISPATCH_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        report
    }

    async fn submit(&self, planned: PlannedKey) -> Result<(), InvalidationFailure> {
        debug!(page = %planned.page, key = %planned.key, role = ?planned.role, "Invalidating cache key");

        match self.engine.invalidate(&planned.key).await {
            Ok(()) => {
                counter!(METRIC_KEYS_INVALIDATED).increment(1);
                Ok(())
            }
            Err(err) => {
                error!(
                    page = %planned.page,
                    path = %planned.path,
                    key = %planned.key,
                    error_kind = err.kind(),
                    error = %err,
                    "Cache invalidation failed"
                );
                counter!(METRIC_INVALIDATION_FAILURES, "kind" => err.kind()).increment(1);
                Err(InvalidationFailure {
                    page: planned.page,
                    path: planned.path,
                    key: planned.key,
                    error: err,
                })
            }
        }
    }

    /// Filter matching the configured watch root and change kinds.
    pub fn subscription_filter(&self) -> SubscriptionFilter {
        SubscriptionFilter::new(
            self.config.watch_root.clone(),
            self.config.change_kinds.iter().copied(),
        )
    }

    /// Register this dispatcher as a listener on `feed`.
    pub fn subscribe(self: &Arc<Self>, feed: &ChangeFeed) -> SubscriptionId {
        let id = feed.subscribe(self.subscription_filter(), self.clone());
        info!(
            subscription = %id,
            root = %self.config.watch_root,
            kinds = ?self.config.change_kinds,
            "Invalidation dispatcher subscribed"
        );
        id
    }

    pub fn config(&self) -> &Arc<InvalidationConfig> {
        &self.config
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }
}

#[async_trait]
impl ChangeListener for InvalidationDispatcher {
    async fn on_change(&self, changes: Vec<ChangeEvent>) {
        self.dispatch(&changes).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::num::NonZeroUsize;
    use std::sync::Mutex;

    use super::*;

    /// Records every key and fails the ones it was told to.
    #[derive(Default)]
    struct RecordingEngine {
        calls: Mutex<Vec<String>>,
        persistence_failures: HashSet<String>,
        rejected: HashSet<String>,
    }

    impl RecordingEngine {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl CacheEngine for RecordingEngine {
        async fn invalidate(&self, key: &CacheKey) -> Result<(), EngineError> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(key.as_str().to_string());
            if self.persistence_failures.contains(key.as_str()) {
                return Err(EngineError::persistence(key, "store unavailable"));
            }
            if self.rejected.contains(key.as_str()) {
                return Err(EngineError::key_construction(key, "malformed key"));
            }
            Ok(())
        }
    }

    const HEADER_TITLE: &str = "/content/layout-wcm/headers/global/jcr:content/title";
    const HEADER_BASE: &str = "/content/layout-wcm/headers/global/jcr:content.content.html";

    fn dispatcher_with(
        config: InvalidationConfig,
        engine: Arc<RecordingEngine>,
    ) -> InvalidationDispatcher {
        InvalidationDispatcher::new(Arc::new(config), engine).expect("dispatcher builds")
    }

    #[tokio::test]
    async fn single_change_issues_base_and_variant_calls() {
        let engine = Arc::new(RecordingEngine::default());
        let config = InvalidationConfig::default();
        let dimension_values = config.dimension_values.clone();
        let dispatcher = dispatcher_with(config, engine.clone());

        let report = dispatcher
            .dispatch(&[ChangeEvent::changed(HEADER_TITLE)])
            .await;

        let calls = engine.calls();
        assert_eq!(calls.len(), 1 + dimension_values.len());
        assert_eq!(calls[0], HEADER_BASE);
        for (call, value) in calls[1..].iter().zip(&dimension_values) {
            assert_eq!(
                call,
                &format!("{HEADER_BASE}[CookieKeyValues:user-group={value}]")
            );
        }
        assert!(report.is_clean());
        assert_eq!(report.invalidated, calls.len());
        assert_eq!(report.pages, 1);
    }

    #[tokio::test]
    async fn unrelated_change_issues_no_calls() {
        let engine = Arc::new(RecordingEngine::default());
        let dispatcher = dispatcher_with(InvalidationConfig::default(), engine.clone());

        let report = dispatcher
            .dispatch(&[ChangeEvent::changed("/content/other-app/x/y")])
            .await;

        assert!(engine.calls().is_empty());
        assert_eq!(report.skipped, 1);
        assert_eq!(report.attempted, 0);
    }

    #[tokio::test]
    async fn base_key_failure_does_not_stop_variants() {
        let engine = Arc::new(RecordingEngine {
            persistence_failures: HashSet::from([HEADER_BASE.to_string()]),
            ..Default::default()
        });
        let config = InvalidationConfig::default();
        let expected_calls = config.keys_per_page();
        let dispatcher = dispatcher_with(config, engine.clone());

        let report = dispatcher
            .dispatch(&[ChangeEvent::changed(HEADER_TITLE)])
            .await;

        assert_eq!(engine.calls().len(), expected_calls);
        assert_eq!(report.invalidated, expected_calls - 1);
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.key.as_str(), HEADER_BASE);
        assert_eq!(failure.path, HEADER_TITLE);
        assert_eq!(failure.error.kind(), "persistence");
    }

    #[tokio::test]
    async fn failures_do_not_stop_later_events() {
        let engine = Arc::new(RecordingEngine {
            rejected: HashSet::from([HEADER_BASE.to_string()]),
            ..Default::default()
        });
        let config = InvalidationConfig {
            dimension_values: Vec::new(),
            ..Default::default()
        };
        let dispatcher = dispatcher_with(config, engine.clone());

        let report = dispatcher
            .dispatch(&[
                ChangeEvent::changed(HEADER_TITLE),
                ChangeEvent::removed("/content/layout-wcm/footers/main/jcr:content"),
            ])
            .await;

        assert_eq!(
            engine.calls(),
            vec![
                HEADER_BASE.to_string(),
                "/content/layout-wcm/footers/main/jcr:content.content.html".to_string()
            ]
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].error.kind(), "key_construction");
        assert_eq!(report.invalidated, 1);
    }

    #[tokio::test]
    async fn repeated_page_in_batch_is_invalidated_once() {
        let engine = Arc::new(RecordingEngine::default());
        let config = InvalidationConfig::default();
        let per_page = config.keys_per_page();
        let dispatcher = dispatcher_with(config, engine.clone());

        let report = dispatcher
            .dispatch(&[
                ChangeEvent::changed(HEADER_TITLE),
                ChangeEvent::added("/content/layout-wcm/headers/global/jcr:content/logo"),
            ])
            .await;

        assert_eq!(engine.calls().len(), per_page);
        assert_eq!(report.matched, 2);
        assert_eq!(report.pages, 1);
    }

    #[tokio::test]
    async fn concurrent_submission_invalidates_same_key_set() {
        let engine = Arc::new(RecordingEngine::default());
        let config = InvalidationConfig {
            dimension_values: vec!["a".into(), "b".into(), "c".into()],
            max_concurrent_invalidations: NonZeroUsize::new(4).expect("non-zero"),
            ..Default::default()
        };
        let dispatcher = dispatcher_with(config, engine.clone());

        let report = dispatcher
            .dispatch(&[
                ChangeEvent::changed(HEADER_TITLE),
                ChangeEvent::changed("/content/layout-wcm/footers/main/jcr:content/x"),
            ])
            .await;

        let expected: HashSet<String> = dispatcher
            .planned_keys(&[
                ChangeEvent::changed(HEADER_TITLE),
                ChangeEvent::changed("/content/layout-wcm/footers/main/jcr:content/x"),
            ])
            .into_iter()
            .map(|k| k.key.into_string())
            .collect();
        let calls: HashSet<String> = engine.calls().into_iter().collect();

        assert_eq!(calls, expected);
        assert_eq!(report.invalidated, 8);
    }

    #[tokio::test]
    async fn listener_entry_point_dispatches() {
        let engine = Arc::new(RecordingEngine::default());
        let dispatcher = dispatcher_with(InvalidationConfig::default(), engine.clone());

        dispatcher
            .on_change(vec![ChangeEvent::changed(HEADER_TITLE)])
            .await;

        assert_eq!(engine.calls()[0], HEADER_BASE);
    }

    #[test]
    fn subscription_filter_uses_watch_root_and_kinds() {
        let engine = Arc::new(RecordingEngine::default());
        let config = InvalidationConfig {
            change_kinds: vec![crate::invalidation::events::ChangeKind::Removed],
            ..Default::default()
        };
        let dispatcher = dispatcher_with(config, engine);
        let filter = dispatcher.subscription_filter();

        assert!(filter.accepts(&ChangeEvent::removed(HEADER_TITLE)));
        assert!(!filter.accepts(&ChangeEvent::changed(HEADER_TITLE)));
        assert!(!filter.accepts(&ChangeEvent::removed("/content/other-app/x")));
    }
}
