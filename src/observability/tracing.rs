//! `tracing` subscriber setup.
//!
//! Configures structured logging with:
//! - Console output (text or JSON) filtered by level
//! - `tracing` spans exported through the tracer provider
//! - `tracing` events exported as OTLP log records

use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use tracing::{Metadata, Subscriber};
use tracing_subscriber::filter::{filter_fn, FilterFn, Filtered};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LogFormat;
use crate::observability::handles::ServiceLogger;
use crate::observability::provider::Telemetry;

const DEFAULT_FILTER: &str = "info,lumen=debug";

// Targets of the export stack itself; exporting their events would loop.
const EXPORT_STACK_TARGETS: [&str; 5] = ["opentelemetry", "tonic", "h2", "hyper", "tower"];

fn is_export_target(target: &str) -> bool {
    EXPORT_STACK_TARGETS
        .iter()
        .any(|prefix| target.starts_with(prefix))
}

/// Target of the per-request completion event. Console only: the request's
/// one OTLP log record is the handler's.
pub const ACCESS_LOG_TARGET: &str = "lumen::access";

fn outside_export_stack(metadata: &Metadata<'_>) -> bool {
    !is_export_target(metadata.target())
}

fn exported_as_log(metadata: &Metadata<'_>) -> bool {
    outside_export_stack(metadata) && metadata.target() != ACCESS_LOG_TARGET
}

/// `tracing` events as OTLP log records, minus the export stack and access log.
pub type LogBridge<S> = Filtered<
    OpenTelemetryTracingBridge<SdkLoggerProvider, ServiceLogger>,
    FilterFn<fn(&Metadata<'_>) -> bool>,
    S,
>;

/// Layer turning `tracing` events into OTLP log records through `provider`.
pub fn log_bridge<S>(provider: &SdkLoggerProvider) -> LogBridge<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let filter: fn(&Metadata<'_>) -> bool = exported_as_log;
    OpenTelemetryTracingBridge::new(provider).with_filter(filter_fn(filter))
}

/// Initialize the global subscriber.
///
/// This sets up:
/// - Level filter from `log_level` (falls back to `info,lumen=debug`)
/// - Console logging in the requested format
/// - OTLP export of spans and events when `telemetry` is given
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(
    log_level: &str,
    format: LogFormat,
    telemetry: Option<&Telemetry>,
) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = match format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .boxed(),
    };

    let otel_layers = telemetry.map(|telemetry| {
        let spans = tracing_opentelemetry::layer()
            .with_tracer(telemetry.handles().tracer().clone())
            .with_filter(filter_fn(outside_export_stack));
        spans.and_then(log_bridge(telemetry.logger_provider().provider()))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layers)
        .try_init()?;

    tracing::info!(
        level = log_level,
        otlp = telemetry.is_some(),
        "Tracing initialized"
    );
    Ok(())
}

/// Initialize tracing for tests (only logs errors).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("error")
        .with_test_writer()
        .try_init();
}
