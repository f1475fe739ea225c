//! W3C trace context and baggage propagation over HTTP headers.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::propagation::{
    Extractor, Injector, TextMapCompositePropagator, TextMapPropagator,
};
use opentelemetry::Context;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use std::fmt;
use std::sync::Arc;

/// Reads propagation fields from request headers.
pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// Writes propagation fields into outgoing headers.
pub struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            self.0.insert(name, value);
        }
    }
}

/// `traceparent`/`tracestate` plus `baggage`.
#[derive(Clone)]
pub struct ContextPropagator {
    inner: Arc<TextMapCompositePropagator>,
}

impl Default for ContextPropagator {
    fn default() -> Self {
        let propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>> = vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ];
        Self {
            inner: Arc::new(TextMapCompositePropagator::new(propagators)),
        }
    }
}

impl fmt::Debug for ContextPropagator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextPropagator").finish_non_exhaustive()
    }
}

impl ContextPropagator {
    /// Remote parent carried by `headers`, or an empty context.
    pub fn extract(&self, headers: &HeaderMap) -> Context {
        self.inner.extract(&HeaderExtractor(headers))
    }

    pub fn inject(&self, cx: &Context, headers: &mut HeaderMap) {
        self.inner.inject_context(cx, &mut HeaderInjector(headers));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::TraceContextExt;

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    #[test]
    fn test_extract_remote_parent() {
        let mut headers = HeaderMap::new();
        headers.insert("traceparent", HeaderValue::from_static(TRACEPARENT));

        let cx = ContextPropagator::default().extract(&headers);
        let span = cx.span();
        let parent = span.span_context();
        assert!(parent.is_remote());
        assert_eq!(
            parent.trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
    }

    #[test]
    fn test_missing_headers_give_empty_context() {
        let cx = ContextPropagator::default().extract(&HeaderMap::new());
        assert!(!cx.span().span_context().is_valid());
    }

    #[test]
    fn test_inject_round_trips_traceparent() {
        let propagator = ContextPropagator::default();
        let mut incoming = HeaderMap::new();
        incoming.insert("traceparent", HeaderValue::from_static(TRACEPARENT));
        let cx = propagator.extract(&incoming);

        let mut outgoing = HeaderMap::new();
        propagator.inject(&cx, &mut outgoing);
        assert_eq!(outgoing.get("traceparent").unwrap(), TRACEPARENT);
    }
}
