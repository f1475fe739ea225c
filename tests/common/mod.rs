//! Test utilities and server harness for Lumen tests.
//!
//! Provides:
//! - In-memory telemetry pipeline with export assertions
//! - In-process test server setup
//! - A router with extra routes exercising slow, failing and stuck handlers

#![allow(dead_code)]

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use lumen::http::handlers::hello_world;
use lumen::http::{InstrumentationOptions, RequestInstrumentation};
use lumen::observability::resource::SERVICE_NAME;
use lumen::observability::{AttributeSet, BatchPolicy, ResourceDescriptor, Telemetry, TelemetryHandles};
use lumen::server::{serve, AppState};
use opentelemetry::logs::Severity;
use opentelemetry::trace::{SpanId, TraceId};
use opentelemetry::{KeyValue, Value};
use opentelemetry_sdk::logs::InMemoryLogExporter;
use opentelemetry_sdk::metrics::data::{Histogram, Metric, ResourceMetrics, Sum};
use opentelemetry_sdk::metrics::InMemoryMetricExporter;
use opentelemetry_sdk::trace::{InMemorySpanExporter, SpanData};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A log record as seen by the exporter.
#[derive(Debug, Clone)]
pub struct CapturedLog {
    pub severity: Option<Severity>,
    pub body: Option<String>,
    pub trace_id: Option<TraceId>,
    pub span_id: Option<SpanId>,
}

/// Telemetry pipeline backed by in-memory exporters.
pub struct TestTelemetry {
    pub telemetry: Telemetry,
    pub spans: InMemorySpanExporter,
    pub logs: InMemoryLogExporter,
    pub metrics: InMemoryMetricExporter,
}

impl TestTelemetry {
    pub fn new() -> Self {
        let resource = ResourceDescriptor::merge(
            &ResourceDescriptor::defaults().expect("default resource"),
            &AttributeSet::new().with(SERVICE_NAME, "lumen-test"),
        )
        .expect("merge resource");

        let spans = InMemorySpanExporter::default();
        let logs = InMemoryLogExporter::default();
        let metrics = InMemoryMetricExporter::default();
        let policy = BatchPolicy {
            scheduled_delay: Duration::from_millis(50),
            ..BatchPolicy::default()
        };

        let telemetry = Telemetry::from_exporters(
            resource,
            spans.clone(),
            logs.clone(),
            metrics.clone(),
            &policy,
        );

        Self {
            telemetry,
            spans,
            logs,
            metrics,
        }
    }

    pub fn handles(&self) -> &TelemetryHandles {
        self.telemetry.handles()
    }

    /// Export everything recorded so far.
    pub async fn flush(&self) {
        let failures = self.telemetry.force_flush().await;
        assert!(failures.is_empty(), "flush telemetry: {failures:?}");
    }

    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans.get_finished_spans().expect("finished spans")
    }

    pub fn span_named(&self, name: &str) -> SpanData {
        self.finished_spans()
            .into_iter()
            .find(|span| span.name == name)
            .unwrap_or_else(|| panic!("no span named {name}"))
    }

    pub fn emitted_logs(&self) -> Vec<CapturedLog> {
        self.logs
            .get_emitted_logs()
            .expect("emitted logs")
            .into_iter()
            .map(|log| {
                let record = &log.record;
                let trace = record.trace_context();
                CapturedLog {
                    severity: record.severity_number(),
                    body: record.body().map(|body| match body {
                        opentelemetry::logs::AnyValue::String(s) => s.as_str().to_string(),
                        other => format!("{other:?}"),
                    }),
                    trace_id: trace.map(|t| t.trace_id),
                    span_id: trace.map(|t| t.span_id),
                }
            })
            .collect()
    }

    /// Most recent cumulative metric export.
    pub fn latest_metrics(&self) -> Option<ResourceMetrics> {
        self.metrics
            .get_finished_metrics()
            .expect("finished metrics")
            .pop()
    }

    /// Number of observations across all data points of a histogram.
    pub fn histogram_count(&self, name: &str) -> u64 {
        self.with_metric(name, |metric| {
            let data = metric.data.as_any();
            if let Some(hist) = data.downcast_ref::<Histogram<f64>>() {
                hist.data_points.iter().map(|p| p.count).sum()
            } else if let Some(hist) = data.downcast_ref::<Histogram<u64>>() {
                hist.data_points.iter().map(|p| p.count).sum()
            } else {
                panic!("{name} is not a histogram")
            }
        })
        .unwrap_or(0)
    }

    /// Sum of all observations of an f64 histogram.
    pub fn histogram_sum(&self, name: &str) -> f64 {
        self.with_metric(name, |metric| {
            let hist = metric
                .data
                .as_any()
                .downcast_ref::<Histogram<f64>>()
                .expect("f64 histogram");
            hist.data_points.iter().map(|p| p.sum).sum()
        })
        .unwrap_or(0.0)
    }

    /// Attribute sets of an f64 histogram's data points, with their counts.
    pub fn histogram_points(&self, name: &str) -> Vec<(Vec<KeyValue>, u64)> {
        self.with_metric(name, |metric| {
            let hist = metric
                .data
                .as_any()
                .downcast_ref::<Histogram<f64>>()
                .expect("f64 histogram");
            hist.data_points
                .iter()
                .map(|p| (p.attributes.clone(), p.count))
                .collect()
        })
        .unwrap_or_default()
    }

    /// Sum across all data points of an i64 up/down counter.
    pub fn counter_value(&self, name: &str) -> i64 {
        self.with_metric(name, |metric| {
            let sum = metric
                .data
                .as_any()
                .downcast_ref::<Sum<i64>>()
                .expect("i64 sum");
            sum.data_points.iter().map(|p| p.value).sum()
        })
        .unwrap_or(0)
    }

    fn with_metric<T>(&self, name: &str, f: impl FnOnce(&Metric) -> T) -> Option<T> {
        let exported = self.latest_metrics()?;
        let metric = exported
            .scope_metrics
            .iter()
            .flat_map(|scope| scope.metrics.iter())
            .find(|metric| metric.name == name)?;
        Some(f(metric))
    }
}

impl Default for TestTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `attributes` contains `key` with a string value `value`.
pub fn has_attribute(attributes: &[KeyValue], key: &str, value: &str) -> bool {
    attributes
        .iter()
        .any(|kv| kv.key.as_str() == key && kv.value.as_str() == value)
}

/// Whether `attributes` contains `key` with integer value `value`.
pub fn has_int_attribute(attributes: &[KeyValue], key: &str, value: i64) -> bool {
    attributes
        .iter()
        .any(|kv| kv.key.as_str() == key && kv.value == Value::I64(value))
}

async fn panicking_handler() -> &'static str {
    panic!("handler exploded")
}

async fn stalled_handler() -> &'static str {
    std::future::pending().await
}

/// Application routes plus test-only routes:
/// - `/slow/{ms}` sleeps before answering
/// - `/fail` answers 500
/// - `/panic` panics
/// - `/stall` never answers
/// - `/healthz` answers 200
pub fn test_router(handles: &TelemetryHandles, instrumentation: &RequestInstrumentation) -> Router {
    let routes = Router::new()
        .route("/", get(hello_world))
        .route(
            "/slow/{ms}",
            get(|Path(ms): Path<u64>| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                "slow"
            }),
        )
        .route("/fail", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route("/panic", get(panicking_handler))
        .route("/stall", get(stalled_handler))
        .route("/healthz", get(|| async { "ok" }));

    instrumentation
        .instrument(routes)
        .with_state(AppState::new(handles.clone()))
}

/// In-process HTTP server on a random local port.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    /// Start the test router with default instrumentation options.
    pub async fn start(handles: &TelemetryHandles) -> (Self, RequestInstrumentation) {
        let instrumentation = RequestInstrumentation::new(handles, InstrumentationOptions::default());
        let server = Self::start_router(test_router(handles, &instrumentation)).await;
        (server, instrumentation)
    }

    pub async fn start_router(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(serve(listener, router, shutdown_rx));
        Self {
            addr,
            shutdown_tx,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Signal shutdown and wait for in-flight requests to drain.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        self.handle
            .await
            .expect("server task panicked")
            .expect("server error");
    }
}

/// Wait for a condition to become true with timeout.
///
/// # Arguments
///
/// * `timeout` - Maximum time to wait
/// * `condition` - Closure that returns true when condition is met
///
/// # Returns
///
/// `true` if condition was met, `false` if timeout expired
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
