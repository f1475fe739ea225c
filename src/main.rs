//! Lumen: a minimal HTTP service instrumented with OpenTelemetry.
//!
//! # Usage
//!
//! ```bash
//! lumen --port 9999 --otel-endpoint http://localhost:4317 --log-level info
//! ```
//!
//! Environment variables can also be used:
//! - `LUMEN_PORT`: Port to listen on
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP/gRPC collector endpoint
//! - `OTEL_SERVICE_NAME`: Service name reported in telemetry
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use anyhow::Context as _;
use lumen::config::Config;
use lumen::observability::tracing::init_tracing;
use lumen::observability::{ResourceDescriptor, Telemetry};
use lumen::server::run_server;
use tokio::sync::watch;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config, resource: &ResourceDescriptor) {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        r#"
   _
  | |   _   _ _ __ ___   ___ _ __
  | |  | | | | '_ ` _ \ / _ \ '_ \
  | |__| |_| | | | | | |  __/ | | |
  |_____\__,_|_| |_| |_|\___|_| |_|

  Lumen v{} - OpenTelemetry instrumented HTTP service

  Configuration:
    Address:    {}:{}
    Service:    {}
    Collector:  {}
    Log Level:  {}

  Press Ctrl+C to shutdown gracefully.
"#,
        version,
        config.host,
        config.port,
        resource.service_name(),
        config.otel_endpoint,
        config.log_level
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    // Merge resource attributes and open the telemetry pipeline
    let defaults = ResourceDescriptor::defaults().context("invalid OTEL_RESOURCE_ATTRIBUTES")?;
    let resource = ResourceDescriptor::merge(&defaults, &config.service_attributes())
        .context("invalid service resource attributes")?;
    let telemetry_config = config.telemetry().context("invalid exporter configuration")?;
    let telemetry = Telemetry::init(&telemetry_config, resource)
        .await
        .context("failed to initialize telemetry")?;

    // Initialize tracing/logging
    init_tracing(&config.log_level, config.log_format, Some(&telemetry))
        .context("failed to install tracing subscriber")?;

    // Print startup banner
    print_banner(&config, telemetry.resource());

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn signal handler task
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // Run the server, then flush telemetry whatever the outcome
    let served = run_server(&config, telemetry.handles().clone(), shutdown_rx).await;

    let failures = telemetry.shutdown(config.shutdown_timeout()).await;
    if !failures.is_empty() {
        eprintln!("telemetry shutdown incomplete: {} provider(s) failed", failures.len());
    }

    served.map_err(|e| anyhow::anyhow!(e)).context("server error")?;
    eprintln!("Lumen shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = ctrl_c.await;
                return;
            }
        };

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("Received Ctrl+C, initiating shutdown...");
    }
}
