//! OpenTelemetry observability infrastructure.
//!
//! Provides:
//! - Resource metadata merged from process defaults and service overrides
//! - OTLP/gRPC exporters and SDK providers for traces, logs and metrics
//! - HTTP server instruments shared by every request
//! - `tracing` subscriber wired to the providers

pub mod errors;
pub mod exporter;
pub mod handles;
pub mod metrics;
pub mod propagation;
pub mod provider;
pub mod reporting;
pub mod resource;
pub mod tracing;

pub use exporter::{ExporterConfig, Signal};
pub use handles::{SpanScope, TelemetryHandles};
pub use metrics::HttpServerMetrics;
pub use propagation::ContextPropagator;
pub use provider::{BatchPolicy, ProviderHandle, Telemetry, TelemetryConfig};
pub use reporting::Reporting;
pub use resource::{AttributeSet, AttributeValue, ResourceDescriptor};
pub use self::tracing::{init_test_tracing, init_tracing, log_bridge};
