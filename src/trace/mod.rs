//! Distributed tracing: span creation, sampling, processing and export.
//!
//! The entry point is the [`TracerProvider`], which owns the pipeline
//! configuration (sampler, id generator, span limits, resource) and the
//! registered [`SpanProcessor`]s. Providers hand out [`Tracer`]s, tracers
//! start [`Span`]s, and finished spans flow through the processors to a
//! [`SpanExporter`].
//!
//! ```
//! use tracekit::trace::TracerProvider;
//! use tracekit::KeyValue;
//!
//! let provider = TracerProvider::builder().build();
//! let tracer = provider.tracer("my-component");
//!
//! let mut span = tracer.start("operation");
//! span.set_attribute(KeyValue::new("my-attribute", "my-value"));
//! span.add_event("my-event", vec![KeyValue::new("processed", true)]);
//! span.end();
//! ```

mod config;
mod context;
mod event;
mod export;
mod id_generator;
#[cfg(any(feature = "testing", test))]
mod in_memory_exporter;
mod link;
mod provider;
mod sampler;
mod span;
mod span_context;
mod span_limit;
mod span_processor;
mod tracer;

pub use config::Config;
pub use context::{get_active_span, mark_span_as_active, SpanRef, TraceContextExt};
pub use event::{Event, SpanEvents};
pub use export::{SpanData, SpanExporter};
pub use id_generator::{IdGenerator, RandomIdGenerator};
#[cfg(any(feature = "testing", test))]
pub use in_memory_exporter::{InMemorySpanExporter, InMemorySpanExporterBuilder};
pub use link::{Link, SpanLinks};
pub use provider::{Builder, TracerProvider};
pub use sampler::{CloneShouldSample, Sampler, SamplingDecision, SamplingResult, ShouldSample};
pub use span::Span;
pub use span_context::{
    IdParseError, SpanContext, SpanId, TraceFlags, TraceId, TraceState, TraceStateError,
};
pub use span_limit::SpanLimits;
pub use span_processor::{
    BatchConfig, BatchConfigBuilder, BatchSpanProcessor, MultiSpanProcessor,
    SimpleSpanProcessor, SpanProcessor,
};
pub use tracer::{SpanBuilder, Tracer};

use std::borrow::Cow;

/// Describes the relationship between a span, its parents and its children
/// in a trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpanKind {
    /// The span describes a request to some remote service.
    Client,
    /// The span covers the server-side handling of a synchronous remote
    /// request.
    Server,
    /// The span describes the initiation of an asynchronous request that the
    /// producer does not wait on.
    Producer,
    /// The span covers the processing of an asynchronously produced message.
    Consumer,
    /// Default value. An internal operation with no remote parties involved.
    Internal,
}

/// The code path status of a span.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Status {
    /// The default status.
    #[default]
    Unset,

    /// The operation contains an error.
    Error {
        /// The description of the error.
        description: Cow<'static, str>,
    },

    /// The operation has been validated by an application developer or
    /// operator to have completed successfully.
    Ok,
}

impl Status {
    /// Create a new error status with the given description.
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }

    /// Statuses are totally ordered `Unset < Error < Ok`; a span status is
    /// only replaced by one of strictly higher priority.
    pub(crate) fn priority(&self) -> u8 {
        match self {
            Status::Unset => 0,
            Status::Error { .. } => 1,
            Status::Ok => 2,
        }
    }
}
