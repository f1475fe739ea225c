//! Telemetry providers and their lifecycle.
//!
//! Each signal gets one SDK provider owning one exporter and one batching
//! policy:
//! - traces: batch span processor (queue size, export size, delay)
//! - logs: batch log processor with the same policy
//! - metrics: periodic reader on a fixed interval, cumulative temporality
//!
//! Providers are wrapped in [`ProviderHandle`], which makes shutdown
//! idempotent and bounds it with a deadline. Exporters are wrapped in
//! [`Reporting`], and flush or shutdown failures go to the same error side
//! channel.

use opentelemetry::logs::LoggerProvider as _;
use opentelemetry::metrics::MeterProvider as _;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::logs::{BatchLogProcessor, LogExporter, SdkLoggerProvider};
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{BatchSpanProcessor, SdkTracerProvider, SpanExporter};
use opentelemetry_sdk::{logs, trace, Resource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ExportError, TelemetryError};
use crate::observability::exporter::{
    open_log_exporter, open_metric_exporter, open_span_exporter, ExporterConfig, Signal,
};
use crate::observability::errors;
use crate::observability::handles::TelemetryHandles;
use crate::observability::reporting::Reporting;
use crate::observability::resource::ResourceDescriptor;

/// Instrumentation scope of the service tracer.
pub const TRACER_NAME: &str = "lumen-tracer";
/// Instrumentation scope of the service logger.
pub const LOGGER_NAME: &str = "lumen-logger";
/// Instrumentation scope of the service meter.
pub const METER_NAME: &str = "lumen-metrics";

/// Batching and export cadence shared by the providers.
#[derive(Debug, Clone, Copy)]
pub struct BatchPolicy {
    /// Maximum number of spans or log records buffered before dropping
    pub max_queue_size: usize,
    /// Maximum number of spans or log records in one export
    pub max_export_batch_size: usize,
    /// Maximum time a partial batch waits before export
    pub scheduled_delay: Duration,
    /// Interval between metric collections
    pub metric_interval: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            max_queue_size: 2048,
            max_export_batch_size: 512,
            scheduled_delay: Duration::from_secs(5),
            metric_interval: Duration::from_secs(60),
        }
    }
}

impl BatchPolicy {
    fn span_batch_config(&self) -> trace::BatchConfig {
        trace::BatchConfigBuilder::default()
            .with_max_queue_size(self.max_queue_size)
            .with_max_export_batch_size(self.max_export_batch_size.min(self.max_queue_size))
            .with_scheduled_delay(self.scheduled_delay)
            .build()
    }

    fn log_batch_config(&self) -> logs::BatchConfig {
        logs::BatchConfigBuilder::default()
            .with_max_queue_size(self.max_queue_size)
            .with_max_export_batch_size(self.max_export_batch_size.min(self.max_queue_size))
            .with_scheduled_delay(self.scheduled_delay)
            .build()
    }
}

/// Everything needed to open the pipeline.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub exporter: ExporterConfig,
    pub batch: BatchPolicy,
}

/// Build the tracer provider around a span exporter.
pub fn tracer_provider<E>(resource: &Resource, exporter: E, policy: &BatchPolicy) -> SdkTracerProvider
where
    E: SpanExporter + 'static,
{
    let processor = BatchSpanProcessor::builder(exporter)
        .with_batch_config(policy.span_batch_config())
        .build();

    SdkTracerProvider::builder()
        .with_span_processor(processor)
        .with_resource(resource.clone())
        .build()
}

/// Build the logger provider around a log exporter.
pub fn logger_provider<E>(resource: &Resource, exporter: E, policy: &BatchPolicy) -> SdkLoggerProvider
where
    E: LogExporter + 'static,
{
    let processor = BatchLogProcessor::builder(exporter)
        .with_batch_config(policy.log_batch_config())
        .build();

    SdkLoggerProvider::builder()
        .with_log_processor(processor)
        .with_resource(resource.clone())
        .build()
}

/// Build the meter provider around a push metric exporter.
pub fn meter_provider<E>(resource: &Resource, exporter: E, policy: &BatchPolicy) -> SdkMeterProvider
where
    E: PushMetricExporter,
{
    let reader = PeriodicReader::builder(exporter)
        .with_interval(policy.metric_interval)
        .build();

    SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource.clone())
        .build()
}

/// Flush and shutdown operations common to the three SDK providers.
///
/// Both calls block until the exporter has finished, so callers run them on
/// a blocking thread.
pub trait SignalProvider: Clone + Send + Sync + 'static {
    const SIGNAL: Signal;

    fn flush(&self) -> Result<(), String>;

    fn close(&self) -> Result<(), String>;
}

impl SignalProvider for SdkTracerProvider {
    const SIGNAL: Signal = Signal::Trace;

    fn flush(&self) -> Result<(), String> {
        self.force_flush().map_err(|e| e.to_string())
    }

    fn close(&self) -> Result<(), String> {
        self.shutdown().map_err(|e| e.to_string())
    }
}

impl SignalProvider for SdkLoggerProvider {
    const SIGNAL: Signal = Signal::Log;

    fn flush(&self) -> Result<(), String> {
        self.force_flush().map_err(|e| e.to_string())
    }

    fn close(&self) -> Result<(), String> {
        self.shutdown().map_err(|e| e.to_string())
    }
}

impl SignalProvider for SdkMeterProvider {
    const SIGNAL: Signal = Signal::Metric;

    fn flush(&self) -> Result<(), String> {
        self.force_flush().map_err(|e| e.to_string())
    }

    fn close(&self) -> Result<(), String> {
        self.shutdown().map_err(|e| e.to_string())
    }
}

/// A provider with a one-way "shut down" state.
#[derive(Debug, Clone)]
pub struct ProviderHandle<P> {
    provider: P,
    shut_down: Arc<AtomicBool>,
}

impl<P: SignalProvider> ProviderHandle<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            shut_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Export everything buffered so far. A no-op after shutdown.
    pub async fn force_flush(&self) -> Result<(), ExportError> {
        if self.is_shut_down() {
            return Ok(());
        }
        let provider = self.provider.clone();
        let outcome = tokio::task::spawn_blocking(move || provider.flush()).await;
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(ExportError::Flush {
                signal: P::SIGNAL,
                reason,
            }),
            Err(join) => Err(ExportError::Flush {
                signal: P::SIGNAL,
                reason: join.to_string(),
            }),
        }
    }

    /// Flush buffered data and close the exporter, waiting at most `deadline`.
    ///
    /// Only the first call does any work; later calls return `Ok(())`
    /// immediately. On timeout the last partial batch may be lost.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), ExportError> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let provider = self.provider.clone();
        let task = tokio::task::spawn_blocking(move || provider.close());
        match tokio::time::timeout(deadline, task).await {
            Ok(Ok(Ok(()))) => {
                tracing::debug!(signal = %P::SIGNAL, "Provider shut down");
                Ok(())
            }
            Ok(Ok(Err(reason))) => Err(ExportError::Shutdown {
                signal: P::SIGNAL,
                reason,
            }),
            Ok(Err(join)) => Err(ExportError::Shutdown {
                signal: P::SIGNAL,
                reason: join.to_string(),
            }),
            Err(_) => Err(ExportError::ShutdownTimeout {
                signal: P::SIGNAL,
                deadline,
            }),
        }
    }
}

/// The three providers plus the handles issued from them.
pub struct Telemetry {
    tracer_provider: ProviderHandle<SdkTracerProvider>,
    logger_provider: ProviderHandle<SdkLoggerProvider>,
    meter_provider: ProviderHandle<SdkMeterProvider>,
    handles: TelemetryHandles,
    resource: Arc<ResourceDescriptor>,
}

impl Telemetry {
    /// Open the three OTLP exporters and build the providers.
    ///
    /// Fails if any exporter cannot be opened. Exporters opened before the
    /// failure are dropped unused, which releases their channels.
    pub async fn init(
        config: &TelemetryConfig,
        resource: ResourceDescriptor,
    ) -> Result<Self, TelemetryError> {
        let span_exporter = open_span_exporter(&config.exporter).await?;
        let log_exporter = open_log_exporter(&config.exporter).await?;
        let metric_exporter = open_metric_exporter(&config.exporter).await?;

        let telemetry = Self::from_exporters(
            resource,
            span_exporter,
            log_exporter,
            metric_exporter,
            &config.batch,
        );

        tracing::info!(
            endpoint = %config.exporter.endpoint,
            service = telemetry.resource.service_name(),
            metric_interval = ?config.batch.metric_interval,
            "Telemetry pipeline initialized"
        );
        Ok(telemetry)
    }

    /// Build the providers from already opened exporters, each wrapped so
    /// that failed exports are reported.
    pub fn from_exporters<S, L, M>(
        resource: ResourceDescriptor,
        span_exporter: S,
        log_exporter: L,
        metric_exporter: M,
        policy: &BatchPolicy,
    ) -> Self
    where
        S: SpanExporter + 'static,
        L: LogExporter + 'static,
        M: PushMetricExporter,
    {
        let otel_resource = resource.to_resource();

        let tracers = tracer_provider(&otel_resource, Reporting::new(span_exporter), policy);
        let loggers = logger_provider(&otel_resource, Reporting::new(log_exporter), policy);
        let meters = meter_provider(&otel_resource, Reporting::new(metric_exporter), policy);

        let handles = TelemetryHandles::new(
            tracers.tracer(TRACER_NAME),
            loggers.logger(LOGGER_NAME),
            meters.meter(METER_NAME),
        );

        Self {
            tracer_provider: ProviderHandle::new(tracers),
            logger_provider: ProviderHandle::new(loggers),
            meter_provider: ProviderHandle::new(meters),
            handles,
            resource: Arc::new(resource),
        }
    }

    pub fn handles(&self) -> &TelemetryHandles {
        &self.handles
    }

    pub fn resource(&self) -> &ResourceDescriptor {
        &self.resource
    }

    pub fn tracer_provider(&self) -> &ProviderHandle<SdkTracerProvider> {
        &self.tracer_provider
    }

    pub fn logger_provider(&self) -> &ProviderHandle<SdkLoggerProvider> {
        &self.logger_provider
    }

    pub fn meter_provider(&self) -> &ProviderHandle<SdkMeterProvider> {
        &self.meter_provider
    }

    /// Flush all three providers, even when one of them fails.
    ///
    /// Failures are reported and returned.
    pub async fn force_flush(&self) -> Vec<ExportError> {
        let outcomes = [
            self.tracer_provider.force_flush().await,
            self.logger_provider.force_flush().await,
            self.meter_provider.force_flush().await,
        ];
        collect_failures(outcomes)
    }

    /// Shut down metrics, then logs, then traces.
    ///
    /// Failures are reported and returned, never escalated.
    pub async fn shutdown(&self, deadline: Duration) -> Vec<ExportError> {
        let outcomes = [
            self.meter_provider.shutdown(deadline).await,
            self.logger_provider.shutdown(deadline).await,
            self.tracer_provider.shutdown(deadline).await,
        ];

        let failures = collect_failures(outcomes);
        if failures.is_empty() {
            tracing::info!("Telemetry pipeline shut down");
        }
        failures
    }
}

fn collect_failures(outcomes: [Result<(), ExportError>; 3]) -> Vec<ExportError> {
    let failures: Vec<ExportError> = outcomes.into_iter().filter_map(Result::err).collect();
    for failure in &failures {
        errors::report(failure.clone());
    }
    failures
}
