use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
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
/// Logs go to stderr so stdout stays free for tooling that drives `folio dev`.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_histogram!(
            "folio_build_ms",
            Unit::Milliseconds,
            "Wall-clock duration of a full or partial build."
        );
        describe_counter!(
            "folio_render_failure_total",
            Unit::Count,
            "Total number of units whose render or publish failed."
        );
        describe_counter!(
            "folio_flush_total",
            Unit::Count,
            "Total number of coalesced change batches applied."
        );
        describe_histogram!(
            "folio_flush_keys",
            Unit::Count,
            "Number of distinct keys carried by each change batch."
        );
        describe_counter!(
            "folio_file_cache_hit_total",
            Unit::Count,
            "Total number of file cache hits."
        );
        describe_counter!(
            "folio_file_cache_miss_total",
            Unit::Count,
            "Total number of file cache misses."
        );
    });
}
