//! Request instrumentation middleware.
//!
//! Every instrumented request:
//! - increments `http.server.active_requests` and opens a server span
//! - runs the wrapped handler with the span context current
//! - on every exit path records duration, sizes and the matching decrement
//!
//! Bookkeeping lives in a drop guard, so a panicking handler or a future
//! dropped on client disconnect is still measured and never leaks the
//! in-flight count.

use axum::body::HttpBody;
use axum::extract::{MatchedPath, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use opentelemetry::trace::{FutureExt, SpanKind, Status, TraceContextExt, Tracer as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_semantic_conventions::attribute::{
    ERROR_TYPE, HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, HTTP_ROUTE, URL_PATH,
};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;

use crate::error::InstrumentError;
use crate::http::inflight::InFlightGauge;
use crate::observability::errors;
use crate::observability::handles::{ServiceTracer, TelemetryHandles};
use crate::observability::metrics::HttpServerMetrics;
use crate::observability::propagation::ContextPropagator;
use crate::observability::tracing::ACCESS_LOG_TARGET;

/// Route label for requests no route matched.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// `error.type` value for requests that ended without a response.
pub const ABORTED: &str = "aborted";

/// Decides whether a request bypasses instrumentation.
pub type SkipFn = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Names the server span from the request and its route template.
pub type SpanNameFn = Arc<dyn Fn(&Request, &str) -> String + Send + Sync>;

/// Optional behaviour of the middleware.
#[derive(Clone, Default)]
pub struct InstrumentationOptions {
    /// Requests for which this returns true pass through untouched.
    pub skip: Option<SkipFn>,
    /// Server span name; defaults to `"{METHOD} {route}"`.
    pub span_name: Option<SpanNameFn>,
}

impl fmt::Debug for InstrumentationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentationOptions")
            .field("skip", &self.skip.is_some())
            .field("span_name", &self.span_name.is_some())
            .finish()
    }
}

impl InstrumentationOptions {
    /// Skip requests whose path is exactly one of `paths`.
    pub fn skip_paths(paths: Vec<String>) -> Self {
        if paths.is_empty() {
            return Self::default();
        }
        Self::default().with_skip(move |request: &Request| {
            let path = request.uri().path();
            paths.iter().any(|skipped| skipped == path)
        })
    }

    #[must_use]
    pub fn with_skip<F>(mut self, skip: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(skip));
        self
    }

    #[must_use]
    pub fn with_span_name<F>(mut self, span_name: F) -> Self
    where
        F: Fn(&Request, &str) -> String + Send + Sync + 'static,
    {
        self.span_name = Some(Arc::new(span_name));
        self
    }

    fn should_skip(&self, request: &Request) -> bool {
        self.skip.as_ref().is_some_and(|skip| skip(request))
    }

    fn span_name(&self, request: &Request, route: &str) -> String {
        match &self.span_name {
            Some(name) => name(request, route),
            None => format!("{} {}", request.method(), route),
        }
    }
}

/// Context of the server span, stored in request extensions.
#[derive(Clone, Debug)]
pub struct RequestContext(pub Context);

struct Inner {
    metrics: HttpServerMetrics,
    tracer: ServiceTracer,
    propagator: ContextPropagator,
    options: InstrumentationOptions,
    in_flight: InFlightGauge,
}

/// Shared middleware state, created once per router.
#[derive(Clone)]
pub struct RequestInstrumentation {
    inner: Arc<Inner>,
}

impl RequestInstrumentation {
    pub fn new(handles: &TelemetryHandles, options: InstrumentationOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                metrics: HttpServerMetrics::new(handles.meter()),
                tracer: handles.tracer().clone(),
                propagator: handles.propagator().clone(),
                options,
                in_flight: InFlightGauge::new(),
            }),
        }
    }

    /// Requests currently inside the instrumented stack.
    pub fn in_flight(&self) -> &InFlightGauge {
        &self.inner.in_flight
    }

    pub fn metrics(&self) -> &HttpServerMetrics {
        &self.inner.metrics
    }

    /// Wrap every route of `router`, including the fallback.
    ///
    /// Handler panics become 500 responses inside the measured region.
    pub fn instrument<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router
            .layer(CatchPanicLayer::new())
            .layer(middleware::from_fn_with_state(self.clone(), track_request))
    }
}

/// Records the request when dropped, whether or not a response was produced.
struct RequestGuard {
    inner: Arc<Inner>,
    attributes: Vec<KeyValue>,
    cx: Context,
    start: Instant,
    request_size: u64,
    outcome: Option<(StatusCode, u64)>,
}

impl RequestGuard {
    fn complete(&mut self, status: StatusCode, response_size: u64) {
        self.outcome = Some((status, response_size));
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        let metrics = &self.inner.metrics;
        let span = self.cx.span();
        let mut attributes = self.attributes.clone();

        match self.outcome {
            Some((status, response_size)) => {
                let code = KeyValue::new(HTTP_RESPONSE_STATUS_CODE, i64::from(status.as_u16()));
                span.set_attribute(code.clone());
                attributes.push(code);
                metrics.response_size.record(response_size, &attributes);
                if status.is_server_error() {
                    span.set_status(Status::error(format!("HTTP {}", status.as_u16())));
                }
            }
            None => {
                let aborted = KeyValue::new(ERROR_TYPE, ABORTED);
                span.set_attribute(aborted.clone());
                attributes.push(aborted);
                span.set_status(Status::error("request ended before a response was produced"));
            }
        }

        metrics.duration.record(elapsed_ms, &attributes);
        metrics.request_size.record(self.request_size, &attributes);
        metrics.active_requests.add(-1, &self.attributes);
        self.inner.in_flight.leave();
        span.end();

        tracing::debug!(
            target: ACCESS_LOG_TARGET,
            duration_ms = elapsed_ms,
            status = self.outcome.map(|(status, _)| status.as_u16()),
            "Request completed"
        );
    }
}

async fn track_request(
    State(instrumentation): State<RequestInstrumentation>,
    mut request: Request,
    next: Next,
) -> Response {
    let inner = &instrumentation.inner;
    if inner.options.should_skip(&request) {
        return next.run(request).await;
    }

    let start = Instant::now();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| UNMATCHED_ROUTE.to_string(), |path| path.as_str().to_string());
    let attributes = vec![
        KeyValue::new(HTTP_REQUEST_METHOD, request.method().as_str().to_string()),
        KeyValue::new(HTTP_ROUTE, route.clone()),
    ];

    let span_name = inner.options.span_name(&request, &route);
    let request_size = request_size(&request);
    let parent = inner.propagator.extract(request.headers());
    let mut span_attributes = attributes.clone();
    span_attributes.push(KeyValue::new(URL_PATH, request.uri().path().to_string()));
    let span = inner
        .tracer
        .span_builder(span_name)
        .with_kind(SpanKind::Server)
        .with_attributes(span_attributes)
        .start_with_context(&inner.tracer, &parent);
    let cx = parent.with_span(span);

    // Nothing may run between the increment and the guard taking ownership of it.
    inner.metrics.active_requests.add(1, &attributes);
    inner.in_flight.enter();
    let mut guard = RequestGuard {
        inner: Arc::clone(inner),
        attributes,
        cx: cx.clone(),
        start,
        request_size,
        outcome: None,
    };

    request.extensions_mut().insert(RequestContext(cx.clone()));
    let response = next.run(request).with_context(cx).await;

    guard.complete(response.status(), response_size(&response));
    response
}

/// Declared body size, from `Content-Length` or the body's exact size hint.
fn request_size(request: &Request) -> u64 {
    match content_length(request.headers()) {
        Ok(Some(length)) => length,
        Ok(None) => request.body().size_hint().exact().unwrap_or(0),
        Err(e) => {
            errors::report(e);
            0
        }
    }
}

fn response_size(response: &Response) -> u64 {
    match content_length(response.headers()) {
        Ok(Some(length)) => length,
        _ => response.body().size_hint().exact().unwrap_or(0),
    }
}

fn content_length(headers: &HeaderMap) -> Result<Option<u64>, InstrumentError> {
    let Some(value) = headers.get(header::CONTENT_LENGTH) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map(Some)
        .ok_or_else(|| {
            InstrumentError::InvalidContentLength(
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
}
