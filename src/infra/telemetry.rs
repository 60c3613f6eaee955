use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Log output goes to stderr so command output on stdout stays parseable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for every metric the engine emits.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_histogram!(
            "layout_flush_dispatch_ms",
            Unit::Milliseconds,
            "Time spent dispatching one change batch, in milliseconds."
        );
        describe_counter!(
            "layout_flush_keys_invalidated_total",
            Unit::Count,
            "Total number of cache keys successfully invalidated."
        );
        describe_counter!(
            "layout_flush_invalidation_failures_total",
            Unit::Count,
            "Total number of failed key invalidations, labelled by failure kind."
        );
        describe_counter!(
            "layout_flush_events_skipped_total",
            Unit::Count,
            "Total number of change events that did not resolve to a page."
        );
        describe_gauge!(
            "layout_flush_change_queue_len",
            Unit::Count,
            "Current number of change events waiting for delivery."
        );
        describe_counter!(
            "layout_flush_change_dropped_total",
            Unit::Count,
            "Total number of change events dropped because the queue was full."
        );
    });
}
