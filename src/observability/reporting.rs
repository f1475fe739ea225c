//! Exporter decorator feeding failed exports into the error side channel.
//!
//! The SDK processors swallow export errors after logging them internally.
//! Wrapping each exporter in [`Reporting`] makes every failed batch visible
//! through [`errors::report`] while the result still flows back to the SDK.

use async_trait::async_trait;
use futures::future::BoxFuture;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::logs::{LogBatch, LogExporter};
use opentelemetry_sdk::metrics::data::ResourceMetrics;
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
use opentelemetry_sdk::metrics::Temporality;
use opentelemetry_sdk::trace::{SpanData, SpanExporter};
use opentelemetry_sdk::Resource;

use crate::error::ExportError;
use crate::observability::errors;
use crate::observability::exporter::Signal;

/// An exporter that reports its failed exports.
#[derive(Debug)]
pub struct Reporting<E> {
    inner: E,
}

impl<E> Reporting<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

fn report_failure(signal: Signal, result: &OTelSdkResult) {
    if let Err(e) = result {
        errors::report(ExportError::Export {
            signal,
            reason: e.to_string(),
        });
    }
}

impl<E: SpanExporter> SpanExporter for Reporting<E> {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, OTelSdkResult> {
        let export = self.inner.export(batch);
        Box::pin(async move {
            let result = export.await;
            report_failure(Signal::Trace, &result);
            result
        })
    }

    fn shutdown(&mut self) -> OTelSdkResult {
        self.inner.shutdown()
    }

    fn force_flush(&mut self) -> OTelSdkResult {
        self.inner.force_flush()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}

impl<E: LogExporter> LogExporter for Reporting<E> {
    #[allow(clippy::manual_async_fn)]
    fn export(
        &self,
        batch: LogBatch<'_>,
    ) -> impl std::future::Future<Output = OTelSdkResult> + Send {
        async move {
            let result = self.inner.export(batch).await;
            report_failure(Signal::Log, &result);
            result
        }
    }

    fn shutdown(&mut self) -> OTelSdkResult {
        self.inner.shutdown()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}

#[async_trait]
impl<E: PushMetricExporter> PushMetricExporter for Reporting<E> {
    async fn export(&self, metrics: &mut ResourceMetrics) -> OTelSdkResult {
        let result = self.inner.export(metrics).await;
        report_failure(Signal::Metric, &result);
        result
    }

    async fn force_flush(&self) -> OTelSdkResult {
        self.inner.force_flush().await
    }

    fn shutdown(&self) -> OTelSdkResult {
        self.inner.shutdown()
    }

    fn temporality(&self) -> Temporality {
        self.inner.temporality()
    }
}
