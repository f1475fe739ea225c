//! HTTP server setup and lifecycle.
//!
//! Configures the axum router with:
//! - `GET /` traced and logged handler
//! - Request instrumentation on every route
//! - Graceful shutdown support

use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::Config;
use crate::http::handlers::hello_world;
use crate::http::middleware::{InstrumentationOptions, RequestInstrumentation};
use crate::observability::handles::TelemetryHandles;

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub handles: TelemetryHandles,
}

impl AppState {
    pub fn new(handles: TelemetryHandles) -> Self {
        Self { handles }
    }
}

/// Build the instrumented application router.
pub fn build_router(state: AppState, instrumentation: &RequestInstrumentation) -> Router {
    let routes = Router::new().route("/", get(hello_world));
    instrumentation.instrument(routes).with_state(state)
}

/// Serve `router` on an already bound listener until shutdown is signalled.
///
/// In-flight requests are drained before this returns.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            // Wait for shutdown signal
            let _ = shutdown_rx.changed().await;
            tracing::info!("Shutdown signal received, stopping server");
        })
        .await
}

/// Run the Lumen HTTP server.
///
/// # Arguments
///
/// * `config` - Server configuration
/// * `handles` - Telemetry handles issued by the providers
/// * `shutdown_rx` - Receiver for shutdown signal
///
/// # Returns
///
/// Returns when the server has shut down and in-flight requests completed.
pub async fn run_server(
    config: &Config,
    handles: TelemetryHandles,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = config.socket_addr()?;

    let instrumentation = RequestInstrumentation::new(
        &handles,
        InstrumentationOptions::skip_paths(config.skip_paths.clone()),
    );
    let router = build_router(AppState::new(handles), &instrumentation);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Starting Lumen HTTP server");

    serve(listener, router, shutdown_rx).await?;

    tracing::info!(
        served = instrumentation.in_flight().completed(),
        "Server stopped"
    );
    Ok(())
}
