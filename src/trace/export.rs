//! The exporter boundary: finished spans leave the SDK here.

use crate::error::ExportResult;
use crate::resource::Resource;
use crate::trace::{SpanContext, SpanEvents, SpanId, SpanKind, SpanLinks, Status};
use crate::KeyValue;
use futures_util::future::BoxFuture;
use std::borrow::Cow;
use std::fmt;
use std::time::SystemTime;

/// An immutable snapshot of a finished span, handed to exporters in batches.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanData {
    /// Span context of this span.
    pub span_context: SpanContext,
    /// Span id of this span's parent, or the invalid id for root spans.
    pub parent_span_id: SpanId,
    /// Span kind.
    pub span_kind: SpanKind,
    /// Span name.
    pub name: Cow<'static, str>,
    /// Time the span started.
    pub start_time: SystemTime,
    /// Time the span ended.
    pub end_time: SystemTime,
    /// Attributes recorded on the span.
    pub attributes: Vec<KeyValue>,
    /// The number of attributes dropped due to limits.
    pub dropped_attributes_count: u32,
    /// Events recorded on the span.
    pub events: SpanEvents,
    /// Links recorded on the span.
    pub links: SpanLinks,
    /// Final status of the span.
    pub status: Status,
    /// Name of the instrumentation scope (the tracer) that produced the span.
    pub scope_name: Cow<'static, str>,
}

/// A destination for finished spans.
///
/// The batch handed to [`export`](SpanExporter::export) is owned by the
/// exporter; the SDK does not retry a failed batch. Exporters report whether
/// a failure is retryable through
/// [`TraceError::ExportFailed`](crate::TraceError::ExportFailed) so operators
/// can distinguish transient problems from permanent ones.
pub trait SpanExporter: Send + Sync + fmt::Debug {
    /// Export the given batch.
    ///
    /// Implementations must not block indefinitely; span processors drive
    /// this future to completion and enforce their own deadlines around it.
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult>;

    /// Release any held resources. Called at most once; exports will not be
    /// issued afterwards.
    fn shutdown(&mut self) {}

    /// Flush anything the exporter itself buffers. The default does nothing.
    fn force_flush(&mut self) -> BoxFuture<'static, ExportResult> {
        Box::pin(futures_util::future::ready(Ok(())))
    }

    /// Receive the resource describing the producing entity.
    ///
    /// Called once at pipeline construction, before any export.
    fn set_resource(&mut self, _resource: &Resource) {}
}
