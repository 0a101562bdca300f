//! An exporter that keeps finished spans in memory, for tests and demos.

use crate::error::ExportResult;
use crate::internal_logs::tk_warn;
use crate::resource::Resource;
use crate::trace::export::{SpanData, SpanExporter};
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A [`SpanExporter`] that buffers every exported span in memory.
///
/// Clones share the same buffer, so a test can keep a handle to the exporter
/// it registered with a pipeline and inspect what arrived:
///
/// ```
/// use tracekit::trace::{InMemorySpanExporter, TracerProvider};
///
/// let exporter = InMemorySpanExporter::default();
/// let provider = TracerProvider::builder()
///     .with_simple_exporter(exporter.clone())
///     .build();
///
/// provider.tracer("test").start("op").end();
/// assert_eq!(exporter.get_finished_spans().len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
    resource: Arc<Mutex<Resource>>,
    is_shutdown: Arc<AtomicBool>,
}

/// Builder for [`InMemorySpanExporter`].
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporterBuilder {
    _private: (),
}

impl InMemorySpanExporterBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the exporter.
    pub fn build(self) -> InMemorySpanExporter {
        InMemorySpanExporter::default()
    }
}

impl InMemorySpanExporter {
    /// Returns a copy of every span exported so far.
    pub fn get_finished_spans(&self) -> Vec<SpanData> {
        match self.spans.lock() {
            Ok(spans) => spans.clone(),
            Err(_) => {
                tk_warn!(name: "InMemorySpanExporter.LockPoisoned");
                Vec::new()
            }
        }
    }

    /// Clears the buffered spans.
    pub fn reset(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }

    /// The resource this exporter was handed, if any.
    pub fn resource(&self) -> Resource {
        self.resource
            .lock()
            .map(|resource| resource.clone())
            .unwrap_or_default()
    }

    /// Whether `shutdown` was called.
    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::Relaxed)
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let result = if self.is_shutdown.load(Ordering::Relaxed) {
            Err(crate::TraceError::AlreadyShutdown)
        } else {
            match self.spans.lock() {
                Ok(mut spans) => {
                    spans.extend(batch);
                    Ok(())
                }
                Err(_) => Err(crate::TraceError::Other(
                    "InMemorySpanExporter buffer poisoned".into(),
                )),
            }
        };
        Box::pin(futures_util::future::ready(result))
    }

    fn shutdown(&mut self) {
        self.is_shutdown.store(true, Ordering::Relaxed);
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(mut stored) = self.resource.lock() {
            *stored = resource.clone();
        }
    }
}
