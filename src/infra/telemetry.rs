use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::jobs::{
    METRIC_JOB_DURATION_MS, METRIC_JOBS_COMPLETED, METRIC_JOBS_FAILED, METRIC_JOBS_RATE_LIMITED,
    METRIC_JOBS_RUNNING, METRIC_JOBS_SUBMITTED,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_JOBS_SUBMITTED,
            Unit::Count,
            "Total number of jobs accepted by the render queue."
        );
        describe_counter!(
            METRIC_JOBS_COMPLETED,
            Unit::Count,
            "Total number of jobs that produced an artifact."
        );
        describe_counter!(
            METRIC_JOBS_FAILED,
            Unit::Count,
            "Total number of jobs that ended in a fatal error, labelled by classification."
        );
        describe_counter!(
            METRIC_JOBS_RATE_LIMITED,
            Unit::Count,
            "Total number of dispatches delayed by the submission rate limit."
        );
        describe_gauge!(
            METRIC_JOBS_RUNNING,
            Unit::Count,
            "Number of jobs currently holding a worker slot."
        );
        describe_histogram!(
            METRIC_JOB_DURATION_MS,
            Unit::Milliseconds,
            "Wall-clock duration of a job from dispatch to settlement."
        );
    });
}
