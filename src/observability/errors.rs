//! Process-wide side channel for non-fatal telemetry errors.
//!
//! Runtime failures (a flush that fails, an unparsable header while
//! measuring a request) must never reach the request path. They are counted
//! here and handed to the installed handler, or logged at WARN when none is
//! installed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use crate::error::TelemetryError;

type ErrorHandler = Box<dyn Fn(&TelemetryError) + Send + Sync>;

static HANDLER: OnceLock<ErrorHandler> = OnceLock::new();
static REPORTED: AtomicU64 = AtomicU64::new(0);

/// Install the process-wide error handler.
///
/// Only the first installation takes effect; returns `false` if a handler
/// was already installed.
pub fn set_error_handler<F>(handler: F) -> bool
where
    F: Fn(&TelemetryError) + Send + Sync + 'static,
{
    HANDLER.set(Box::new(handler)).is_ok()
}

/// Report a non-fatal telemetry error.
pub fn report(error: impl Into<TelemetryError>) {
    let error = error.into();
    REPORTED.fetch_add(1, Ordering::Relaxed);
    match HANDLER.get() {
        Some(handler) => handler(&error),
        None => tracing::warn!(error = %error, "Telemetry error"),
    }
}

/// Number of errors reported since process start.
pub fn reported_count() -> u64 {
    REPORTED.load(Ordering::Relaxed)
}
