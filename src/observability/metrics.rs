//! HTTP server metrics.
//!
//! Key metrics:
//! - http.server.duration: Histogram of request duration in milliseconds
//! - http.server.request.size: Histogram of request body size in bytes
//! - http.server.response.size: Histogram of response body size in bytes
//! - http.server.active_requests: UpDownCounter of requests in flight

use opentelemetry::metrics::{Histogram, Meter, UpDownCounter};

pub const HTTP_SERVER_DURATION: &str = "http.server.duration";
pub const HTTP_SERVER_REQUEST_SIZE: &str = "http.server.request.size";
pub const HTTP_SERVER_RESPONSE_SIZE: &str = "http.server.response.size";
pub const HTTP_SERVER_ACTIVE_REQUESTS: &str = "http.server.active_requests";

pub const UNIT_MILLISECONDS: &str = "ms";
pub const UNIT_BYTES: &str = "By";
pub const UNIT_DIMENSIONLESS: &str = "1";

/// Instruments shared by every request.
///
/// Creating a second set from the same meter yields handles onto the same
/// aggregation streams, so constructing this more than once is harmless.
#[derive(Debug, Clone)]
pub struct HttpServerMetrics {
    /// Duration from request start to response, in milliseconds.
    pub duration: Histogram<f64>,
    /// Request body size in bytes.
    pub request_size: Histogram<u64>,
    /// Response body size in bytes.
    pub response_size: Histogram<u64>,
    /// Number of requests currently being processed.
    pub active_requests: UpDownCounter<i64>,
}

impl HttpServerMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            duration: meter
                .f64_histogram(HTTP_SERVER_DURATION)
                .with_description("Measures the duration of inbound HTTP requests")
                .with_unit(UNIT_MILLISECONDS)
                .build(),
            request_size: meter
                .u64_histogram(HTTP_SERVER_REQUEST_SIZE)
                .with_description("Measures the size of HTTP request messages")
                .with_unit(UNIT_BYTES)
                .build(),
            response_size: meter
                .u64_histogram(HTTP_SERVER_RESPONSE_SIZE)
                .with_description("Measures the size of HTTP response messages")
                .with_unit(UNIT_BYTES)
                .build(),
            active_requests: meter
                .i64_up_down_counter(HTTP_SERVER_ACTIVE_REQUESTS)
                .with_description("Measures the number of concurrent HTTP requests in flight")
                .with_unit(UNIT_DIMENSIONLESS)
                .build(),
        }
    }
}
