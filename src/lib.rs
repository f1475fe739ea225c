//! Lumen: a minimal HTTP service instrumented with OpenTelemetry.
//!
//! Every request is measured by shared HTTP server instruments, wrapped in a
//! server span, and the example handler emits a debug log record correlated
//! to its own span. Traces, logs and metrics are exported over OTLP/gRPC.
//!
//! # Architecture
//!
//! - **Explicit handles**: tracer, logger and meter live in a
//!   [`observability::TelemetryHandles`] bundle passed to handlers, no
//!   hidden globals
//! - **Fail fast**: an unreachable collector or a malformed resource stops
//!   startup before the listener binds
//! - **Leak-free accounting**: request bookkeeping runs in a drop guard, so
//!   errors, panics and client disconnects are all measured
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration
//! - [`error`]: Error taxonomy (config, export, instrument)
//! - [`http`]: Request instrumentation middleware and handlers
//! - [`observability`]: Resource, exporters, providers, instruments, logging
//! - [`server`]: Router assembly and listener lifecycle

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // observability::provider::ProviderHandle is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::missing_panics_doc,      // Panic docs can be verbose
    clippy::cast_possible_truncation // Byte counts fit comfortably in u64
)]

pub mod config;
pub mod error;
pub mod http;
pub mod observability;
pub mod server;

pub use error::{ConfigError, ExportError, InstrumentError, TelemetryError};
