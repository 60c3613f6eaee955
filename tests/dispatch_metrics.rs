use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use layout_flush::feed::ChangeFeed;
use layout_flush::infra::{store::LocalCacheStore, telemetry};
use layout_flush::invalidation::{ChangeEvent, InvalidationConfig, InvalidationDispatcher};
use metrics_util::debugging::DebuggingRecorder;

#[tokio::test]
async fn dispatch_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    // Queue length + drop metrics
    let feed = ChangeFeed::new(1);
    assert!(feed.publish(ChangeEvent::changed("/content/layout-wcm/headers/a/x")));
    assert!(!feed.publish(ChangeEvent::changed("/content/layout-wcm/headers/a/y")));

    // Dispatch latency, successes, failures and skips
    let config = InvalidationConfig {
        dimension_values: vec!["anonymous".to_string(), "power user".to_string()],
        ..InvalidationConfig::default()
    };
    let store = Arc::new(LocalCacheStore::new(
        NonZeroUsize::new(8).expect("non-zero capacity"),
    ));
    let dispatcher = Arc::new(
        InvalidationDispatcher::new(Arc::new(config), store).expect("default pattern compiles"),
    );
    dispatcher.subscribe(&feed);
    assert_eq!(feed.flush(10).await, 1);

    let report = dispatcher
        .dispatch(&[
            ChangeEvent::changed("/content/layout-wcm/footers/b/jcr:content"),
            ChangeEvent::changed("/content/elsewhere/page"),
        ])
        .await;
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failures.len(), 1);

    let snapshot = snapshotter.snapshot().into_vec();
    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "layout_flush_dispatch_ms",
        "layout_flush_keys_invalidated_total",
        "layout_flush_invalidation_failures_total",
        "layout_flush_events_skipped_total",
        "layout_flush_change_queue_len",
        "layout_flush_change_dropped_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let failure_labels: Vec<String> = snapshot
        .iter()
        .filter(|(composite_key, _, _, _)| {
            composite_key.key().name() == "layout_flush_invalidation_failures_total"
        })
        .flat_map(|(composite_key, _, _, _)| {
            composite_key
                .key()
                .labels()
                .map(|label| format!("{}={}", label.key(), label.value()))
                .collect::<Vec<_>>()
        })
        .collect();
    assert_eq!(failure_labels, vec!["kind=key_construction".to_string()]);
}
