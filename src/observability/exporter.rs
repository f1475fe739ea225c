//! OTLP/gRPC exporters, one per telemetry signal.
//!
//! Opening an exporter first probes the collector with a bounded TCP connect.
//! The tonic channel itself connects lazily, so without the probe an
//! unreachable collector would only show up as failed exports after the
//! service is already serving traffic.

use axum::http::Uri;
use opentelemetry_otlp::{Compression, WithExportConfig, WithTonicConfig};
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tonic::metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue};

use crate::error::{ConfigError, ExportError, TelemetryError};

/// Default OTLP/gRPC port.
pub const DEFAULT_OTLP_PORT: u16 = 4317;

/// A telemetry signal, each with its own exporter and provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Trace,
    Log,
    Metric,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Trace => "trace",
            Self::Log => "log",
            Self::Metric => "metric",
        };
        f.write_str(name)
    }
}

/// Transport settings shared by the three exporters.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Collector endpoint, e.g. `http://otel-collector:4317`
    pub endpoint: String,
    /// Extra gRPC metadata sent with every export
    pub headers: Vec<(String, String)>,
    /// Timeout of one export call
    pub export_timeout: Duration,
    /// Timeout of the startup reachability probe
    pub connect_timeout: Duration,
    /// Gzip-compress metric payloads
    pub gzip_metrics: bool,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4317".into(),
            headers: Vec::new(),
            export_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(3),
            gzip_metrics: true,
        }
    }
}

/// Host and port of the collector, as dialed by the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorAddress {
    pub host: String,
    pub port: u16,
}

/// Split a collector endpoint URL into host and port.
pub fn parse_endpoint(endpoint: &str) -> Result<CollectorAddress, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };

    let uri: Uri = endpoint.parse().map_err(|e: axum::http::uri::InvalidUri| invalid(&e.to_string()))?;
    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(_) => return Err(invalid("scheme must be http or https")),
        None => return Err(invalid("missing scheme")),
    }
    let host = uri.host().ok_or_else(|| invalid("missing host"))?;

    Ok(CollectorAddress {
        host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
        port: uri.port_u16().unwrap_or(DEFAULT_OTLP_PORT),
    })
}

/// Check that the collector accepts connections.
pub async fn probe(signal: Signal, config: &ExporterConfig) -> Result<(), TelemetryError> {
    let address = parse_endpoint(&config.endpoint)?;
    let unreachable = |reason: String| ExportError::Unreachable {
        signal,
        endpoint: config.endpoint.clone(),
        reason,
    };

    let connect = TcpStream::connect((address.host.as_str(), address.port));
    match tokio::time::timeout(config.connect_timeout, connect).await {
        Ok(Ok(_stream)) => {
            tracing::debug!(%signal, endpoint = %config.endpoint, "Collector reachable");
            Ok(())
        }
        Ok(Err(e)) => Err(unreachable(e.to_string()).into()),
        Err(_) => Err(unreachable(format!(
            "no connection within {:?}",
            config.connect_timeout
        ))
        .into()),
    }
}

/// Build the gRPC metadata map from configured headers.
pub fn metadata(config: &ExporterConfig) -> Result<MetadataMap, ConfigError> {
    let mut map = MetadataMap::with_capacity(config.headers.len());
    for (key, value) in &config.headers {
        let invalid = || ConfigError::InvalidHeader(format!("{key}={value}"));
        let key = MetadataKey::<Ascii>::from_bytes(key.as_bytes()).map_err(|_| invalid())?;
        let value = MetadataValue::<Ascii>::try_from(value.as_str()).map_err(|_| invalid())?;
        map.insert(key, value);
    }
    Ok(map)
}

fn build_error(signal: Signal, reason: impl fmt::Display) -> TelemetryError {
    ExportError::Build {
        signal,
        reason: reason.to_string(),
    }
    .into()
}

/// Open the trace exporter.
pub async fn open_span_exporter(
    config: &ExporterConfig,
) -> Result<opentelemetry_otlp::SpanExporter, TelemetryError> {
    probe(Signal::Trace, config).await?;

    opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.endpoint.clone())
        .with_timeout(config.export_timeout)
        .with_metadata(metadata(config)?)
        .build()
        .map_err(|e| build_error(Signal::Trace, e))
}

/// Open the log exporter.
pub async fn open_log_exporter(
    config: &ExporterConfig,
) -> Result<opentelemetry_otlp::LogExporter, TelemetryError> {
    probe(Signal::Log, config).await?;

    opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(config.endpoint.clone())
        .with_timeout(config.export_timeout)
        .with_metadata(metadata(config)?)
        .build()
        .map_err(|e| build_error(Signal::Log, e))
}

/// Open the metric exporter, gzip-compressed unless disabled.
pub async fn open_metric_exporter(
    config: &ExporterConfig,
) -> Result<opentelemetry_otlp::MetricExporter, TelemetryError> {
    probe(Signal::Metric, config).await?;

    let mut builder = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.endpoint.clone())
        .with_timeout(config.export_timeout)
        .with_metadata(metadata(config)?);
    if config.gzip_metrics {
        builder = builder.with_compression(Compression::Gzip);
    }
    builder.build().map_err(|e| build_error(Signal::Metric, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_endpoint() {
        assert_eq!(
            parse_endpoint("http://collector:4317").unwrap(),
            CollectorAddress {
                host: "collector".into(),
                port: 4317
            }
        );
        assert_eq!(parse_endpoint("https://otel.example.com").unwrap().port, DEFAULT_OTLP_PORT);
        assert_eq!(parse_endpoint("http://[::1]:14317").unwrap().host, "::1");
    }

    #[test]
    fn test_parse_endpoint_rejects_bad_input() {
        assert!(parse_endpoint("collector:4317").is_err());
        assert!(parse_endpoint("ftp://collector:21").is_err());
        assert!(parse_endpoint("http://").is_err());
    }

    #[test]
    fn test_metadata_from_headers() {
        let config = ExporterConfig {
            headers: vec![("x-api-key".into(), "secret".into())],
            ..ExporterConfig::default()
        };
        let map = metadata(&config).unwrap();
        assert_eq!(map.get("x-api-key").unwrap().to_str().unwrap(), "secret");

        let bad = ExporterConfig {
            headers: vec![("bad key".into(), "v".into())],
            ..ExporterConfig::default()
        };
        assert!(metadata(&bad).is_err());
    }

    #[tokio::test]
    async fn test_probe_reachable_collector() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ExporterConfig {
            endpoint: format!("http://{}", listener.local_addr().unwrap()),
            ..ExporterConfig::default()
        };
        probe(Signal::Trace, &config).await.unwrap();
    }

    #[tokio::test]
    async fn test_probe_unreachable_collector() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ExporterConfig {
            endpoint: format!("http://{addr}"),
            connect_timeout: Duration::from_millis(500),
            ..ExporterConfig::default()
        };
        let err = probe(Signal::Log, &config).await.unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::Export(ExportError::Unreachable {
                signal: Signal::Log,
                ..
            })
        ));
    }
}
