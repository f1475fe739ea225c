//! HTTP surface: request instrumentation and handlers.

pub mod handlers;
pub mod inflight;
pub mod middleware;

pub use inflight::InFlightGauge;
pub use middleware::{InstrumentationOptions, RequestContext, RequestInstrumentation};
