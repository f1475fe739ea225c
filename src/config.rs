//! Configuration parsing for the Lumen service.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides (standard `OTEL_*` names where one exists)
//! - Sensible defaults for a local collector on `localhost:4317`

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::observability::exporter::ExporterConfig;
use crate::observability::provider::{BatchPolicy, TelemetryConfig};
use crate::observability::resource::{
    AttributeSet, DEPLOYMENT_ENVIRONMENT, SERVICE_NAME, SERVICE_VERSION,
};

/// Output format of the console log layer.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Payload compression for the metric exporter.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricCompression {
    Gzip,
    #[value(name = "none")]
    Uncompressed,
}

/// Lumen: a minimal HTTP service instrumented with OpenTelemetry.
#[derive(Parser, Debug, Clone)]
#[command(name = "lumen")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "LUMEN_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "LUMEN_PORT", default_value_t = 9999)]
    pub port: u16,

    /// OpenTelemetry collector endpoint (OTLP/gRPC)
    #[arg(
        long,
        env = "OTEL_EXPORTER_OTLP_ENDPOINT",
        default_value = "http://localhost:4317"
    )]
    pub otel_endpoint: String,

    /// Extra export header as key=value (repeatable)
    #[arg(
        long = "otel-header",
        env = "OTEL_EXPORTER_OTLP_HEADERS",
        value_delimiter = ','
    )]
    pub otel_headers: Vec<String>,

    /// Service name reported in the telemetry resource
    #[arg(long, env = "OTEL_SERVICE_NAME", default_value = "lumen")]
    pub service_name: String,

    /// Service version reported in the telemetry resource
    #[arg(long, env = "LUMEN_SERVICE_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub service_version: String,

    /// Deployment environment (production, staging, development...)
    #[arg(long, env = "LUMEN_ENVIRONMENT", default_value = "development")]
    pub environment: String,

    /// Interval between metric exports in milliseconds
    #[arg(long, env = "OTEL_METRIC_EXPORT_INTERVAL", default_value_t = 60_000)]
    pub metric_interval_ms: u64,

    /// Compression used by the metric exporter
    #[arg(long, env = "LUMEN_METRIC_COMPRESSION", value_enum, default_value_t = MetricCompression::Gzip)]
    pub metric_compression: MetricCompression,

    /// Timeout of a single export call in milliseconds
    #[arg(long, env = "OTEL_EXPORTER_OTLP_TIMEOUT", default_value_t = 10_000)]
    pub export_timeout_ms: u64,

    /// Timeout of the startup collector probe in milliseconds
    #[arg(long, env = "LUMEN_CONNECT_TIMEOUT_MS", default_value_t = 3_000)]
    pub connect_timeout_ms: u64,

    /// Maximum number of spans or log records buffered per provider
    #[arg(long, env = "LUMEN_BATCH_MAX_QUEUE_SIZE", default_value_t = 2048)]
    pub batch_max_queue_size: usize,

    /// Maximum number of spans or log records sent in one export
    #[arg(long, env = "LUMEN_BATCH_MAX_EXPORT_SIZE", default_value_t = 512)]
    pub batch_max_export_size: usize,

    /// Maximum delay before a partial batch is exported, in milliseconds
    #[arg(long, env = "LUMEN_BATCH_DELAY_MS", default_value_t = 5_000)]
    pub batch_delay_ms: u64,

    /// Deadline for flushing and closing each provider at shutdown, in milliseconds
    #[arg(long, env = "LUMEN_SHUTDOWN_TIMEOUT_MS", default_value_t = 5_000)]
    pub shutdown_timeout_ms: u64,

    /// Request path excluded from instrumentation (repeatable)
    #[arg(long = "skip-path", env = "LUMEN_SKIP_PATHS", value_delimiter = ',')]
    pub skip_paths: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Console log format
    #[arg(long, env = "LUMEN_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Address the HTTP listener binds to.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|e: std::net::AddrParseError| ConfigError::InvalidEndpoint {
            endpoint: raw,
            reason: e.to_string(),
        })
    }

    /// Deadline applied to each provider's shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Exporter and batching settings for the telemetry pipeline.
    pub fn telemetry(&self) -> Result<TelemetryConfig, ConfigError> {
        let headers = self
            .otel_headers
            .iter()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| parse_header(raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TelemetryConfig {
            exporter: ExporterConfig {
                endpoint: self.otel_endpoint.clone(),
                headers,
                export_timeout: Duration::from_millis(self.export_timeout_ms),
                connect_timeout: Duration::from_millis(self.connect_timeout_ms),
                gzip_metrics: self.metric_compression == MetricCompression::Gzip,
            },
            batch: BatchPolicy {
                max_queue_size: self.batch_max_queue_size,
                max_export_batch_size: self.batch_max_export_size,
                scheduled_delay: Duration::from_millis(self.batch_delay_ms),
                metric_interval: Duration::from_millis(self.metric_interval_ms.max(1)),
            },
        })
    }

    /// Service-specific resource attributes, overriding process defaults.
    pub fn service_attributes(&self) -> AttributeSet {
        AttributeSet::new()
            .with(SERVICE_NAME, self.service_name.clone())
            .with(SERVICE_VERSION, self.service_version.clone())
            .with(DEPLOYMENT_ENVIRONMENT, self.environment.clone())
    }

    /// Create a default configuration for testing.
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0, // Random port
            log_level: "debug".into(),
            metric_interval_ms: 100,
            shutdown_timeout_ms: 1_000,
            ..Self::default()
        }
    }
}

fn parse_header(raw: &str) -> Result<(String, String), ConfigError> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| ConfigError::InvalidHeader(raw.to_string()))?;
    let key = key.trim();
    if key.is_empty() || !key.is_ascii() || !value.is_ascii() {
        return Err(ConfigError::InvalidHeader(raw.to_string()));
    }
    Ok((key.to_ascii_lowercase(), value.trim().to_string()))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 9999,
            otel_endpoint: "http://localhost:4317".into(),
            otel_headers: Vec::new(),
            service_name: "lumen".into(),
            service_version: env!("CARGO_PKG_VERSION").into(),
            environment: "development".into(),
            metric_interval_ms: 60_000,
            metric_compression: MetricCompression::Gzip,
            export_timeout_ms: 10_000,
            connect_timeout_ms: 3_000,
            batch_max_queue_size: 2048,
            batch_max_export_size: 512,
            batch_delay_ms: 5_000,
            shutdown_timeout_ms: 5_000,
            skip_paths: Vec::new(),
            log_level: "info".into(),
            log_format: LogFormat::Text,
        }
    }
}
