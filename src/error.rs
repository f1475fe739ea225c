//! Error taxonomy for the telemetry pipeline.
//!
//! - [`ConfigError`]: bad resource, endpoint or header configuration. Fatal
//!   at startup.
//! - [`ExportError`]: exporter open, export, flush and shutdown failures.
//!   Fatal only while opening at startup.
//! - [`InstrumentError`]: per-request recording problems. Reported, the
//!   request proceeds.

use std::time::Duration;
use thiserror::Error;

use crate::observability::exporter::Signal;

/// Invalid configuration detected while building the pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("resource attribute key must not be empty")]
    EmptyAttributeKey,

    #[error("resource attribute `{key}` given as both {first} and {second} in one source")]
    ConflictingAttributeTypes {
        key: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("malformed resource attribute entry `{0}` (expected key=value)")]
    MalformedAttribute(String),

    #[error("invalid collector endpoint `{endpoint}`: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("invalid export header `{0}` (expected ascii key=value)")]
    InvalidHeader(String),
}

/// Failure while opening, flushing or closing an exporter.
#[derive(Debug, Error, Clone)]
pub enum ExportError {
    #[error("{signal} collector at {endpoint} is unreachable: {reason}")]
    Unreachable {
        signal: Signal,
        endpoint: String,
        reason: String,
    },

    #[error("failed to build {signal} exporter: {reason}")]
    Build { signal: Signal, reason: String },

    #[error("failed to export {signal} batch: {reason}")]
    Export { signal: Signal, reason: String },

    #[error("failed to flush {signal} provider: {reason}")]
    Flush { signal: Signal, reason: String },

    #[error("failed to shut down {signal} provider: {reason}")]
    Shutdown { signal: Signal, reason: String },

    #[error("{signal} provider did not shut down within {deadline:?}")]
    ShutdownTimeout { signal: Signal, deadline: Duration },
}

/// Failure while recording a request measurement.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InstrumentError {
    #[error("unparsable content-length header `{0}`")]
    InvalidContentLength(String),
}

/// Any error produced by the telemetry pipeline.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Instrument(#[from] InstrumentError),
}
