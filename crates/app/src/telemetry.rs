use std::{
    fmt::Write as _,
    sync::{Mutex, OnceLock, PoisonError},
    time::Instant,
};

use jaggerbot_util::Environment;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;
use tracing_subscriber::{
    fmt::{self, time::UtcTime},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer,
};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to initialize tracing: {0}")]
    Tracing(#[from] TryInitError),
    #[error("failed to install prometheus recorder: {0}")]
    Metrics(#[from] BuildError),
}

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

const COUNTERS: &[(&str, &str)] = &[
    (
        "eventsub_ingress_total",
        "Signed EventSub callbacks accepted, labelled by message type",
    ),
    (
        "eventsub_invalid_signature_total",
        "EventSub callbacks rejected for a bad signature",
    ),
    (
        "eventsub_decode_errors_total",
        "Signed EventSub callbacks whose body could not be decoded, labelled by message type",
    ),
    (
        "stream_events_dispatched_total",
        "stream.online events taken by the control loop",
    ),
    (
        "notifications_sent_total",
        "Live announcements posted to chat, labelled by form",
    ),
    (
        "channel_lookup_failures_total",
        "Channel information lookups that failed",
    ),
];

static METRICS_HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);
static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Installs the global subscriber: JSON lines in production, pretty output
/// otherwise. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing(environment: Environment) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let base = fmt::layer()
        .with_target(false)
        .with_timer(UtcTime::rfc_3339());
    let output = match environment {
        Environment::Production => base.json().boxed(),
        Environment::Development | Environment::Test => base.pretty().boxed(),
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()?;

    tracing::info!(stage = "telemetry", env = environment.as_str(), version = BUILD_VERSION, "tracing initialized");
    Ok(())
}

/// Installs the Prometheus recorder once and returns its handle on every call.
pub fn init_metrics() -> Result<PrometheusHandle, TelemetryError> {
    let mut slot = METRICS_HANDLE
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = slot.as_ref() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    for (name, help) in COUNTERS {
        describe_counter!(*name, *help);
    }
    describe_histogram!(
        "webhook_ack_latency_seconds",
        "Seconds spent answering an EventSub callback, labelled by message type"
    );
    START_TIME.get_or_init(Instant::now);

    *slot = Some(handle.clone());
    Ok(handle)
}

/// Recorder output plus build and uptime gauges.
pub fn render_metrics(handle: &PrometheusHandle) -> String {
    let mut body = handle.render();
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }

    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs_f64())
        .unwrap_or_default();
    // Writing into a String cannot fail.
    let _ = writeln!(body, "# TYPE app_build_info gauge");
    let _ = writeln!(body, "app_build_info{{version=\"{BUILD_VERSION}\"}} 1");
    let _ = writeln!(body, "# TYPE app_uptime_seconds gauge");
    let _ = writeln!(body, "app_uptime_seconds {uptime}");
    body
}
