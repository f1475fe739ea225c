//! Handles issued by the providers and shared with request code.

use opentelemetry::logs::{AnyValue, LogRecord as _, Logger as _, LoggerProvider, Severity};
use opentelemetry::metrics::Meter;
use opentelemetry::trace::{
    SpanContext, SpanKind, Status, TraceContextExt, Tracer as _, TracerProvider,
};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::SystemTime;

use crate::observability::propagation::ContextPropagator;

/// Tracer issued by the service tracer provider.
pub type ServiceTracer = <SdkTracerProvider as TracerProvider>::Tracer;
/// Logger issued by the service logger provider.
pub type ServiceLogger = <SdkLoggerProvider as LoggerProvider>::Logger;

/// Tracer, logger, meter and propagator for application code.
///
/// Handles stay valid after the providers shut down; telemetry recorded
/// through them is then dropped.
#[derive(Clone)]
pub struct TelemetryHandles {
    tracer: ServiceTracer,
    logger: Arc<ServiceLogger>,
    meter: Meter,
    propagator: ContextPropagator,
}

impl TelemetryHandles {
    pub fn new(tracer: ServiceTracer, logger: ServiceLogger, meter: Meter) -> Self {
        Self {
            tracer,
            logger: Arc::new(logger),
            meter,
            propagator: ContextPropagator::default(),
        }
    }

    pub fn tracer(&self) -> &ServiceTracer {
        &self.tracer
    }

    pub fn logger(&self) -> &ServiceLogger {
        &self.logger
    }

    pub fn meter(&self) -> &Meter {
        &self.meter
    }

    pub fn propagator(&self) -> &ContextPropagator {
        &self.propagator
    }

    /// Start an internal span under `parent`, ended when the scope drops.
    pub fn start_span(
        &self,
        name: impl Into<Cow<'static, str>>,
        parent: &Context,
        attributes: Vec<KeyValue>,
    ) -> SpanScope {
        let span = self
            .tracer
            .span_builder(name)
            .with_kind(SpanKind::Internal)
            .with_attributes(attributes)
            .start_with_context(&self.tracer, parent);
        SpanScope {
            cx: parent.with_span(span),
        }
    }

    /// Emit one log record correlated with the span active in `cx`.
    pub fn emit_log(&self, cx: &Context, severity: Severity, message: impl Into<String>) {
        let now = SystemTime::now();
        let mut record = self.logger.create_log_record();
        record.set_timestamp(now);
        record.set_observed_timestamp(now);
        record.set_severity_number(severity);
        record.set_severity_text(severity_text(severity));
        record.set_body(AnyValue::String(message.into().into()));

        let span = cx.span();
        let span_context = span.span_context();
        if span_context.is_valid() {
            record.set_trace_context(
                span_context.trace_id(),
                span_context.span_id(),
                Some(span_context.trace_flags()),
            );
        }
        self.logger.emit(record);
    }
}

fn severity_text(severity: Severity) -> &'static str {
    match severity as i32 {
        1..=4 => "TRACE",
        5..=8 => "DEBUG",
        9..=12 => "INFO",
        13..=16 => "WARN",
        17..=20 => "ERROR",
        _ => "FATAL",
    }
}

/// A started span that ends when dropped, on every exit path.
pub struct SpanScope {
    cx: Context,
}

impl SpanScope {
    /// Context carrying this span, for children and correlated logs.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn span_context(&self) -> SpanContext {
        self.cx.span().span_context().clone()
    }

    pub fn set_attribute(&self, attribute: KeyValue) {
        self.cx.span().set_attribute(attribute);
    }

    pub fn set_error(&self, description: impl Into<Cow<'static, str>>) {
        self.cx.span().set_status(Status::error(description));
    }
}

impl Drop for SpanScope {
    fn drop(&mut self) {
        self.cx.span().end();
    }
}
