//! A vendor-neutral distributed tracing SDK.
//!
//! `tracekit` implements the tracing signal end to end: span identity and
//! lifecycle, pluggable sampling, span processors with batching, pluggable
//! exporters, and W3C `traceparent`/`tracestate` propagation. There is no
//! process-global registry; applications construct a
//! [`TracerProvider`](trace::TracerProvider), keep it alive for the lifetime
//! of the process, and shut it down to flush outstanding spans.
//!
//! ## Getting started
//!
//! ```
//! use tracekit::trace::{TraceContextExt, TracerProvider};
//! use tracekit::KeyValue;
//!
//! let provider = TracerProvider::builder().build();
//! let tracer = provider.tracer("app");
//!
//! tracer.in_span("doing_work", |cx| {
//!     cx.span().set_attribute(KeyValue::new("widgets", 7i64));
//! });
//!
//! provider.shutdown().expect("shutdown failed");
//! ```
//!
//! ## Crate features
//!
//! - `internal-logs` (default): route SDK self-diagnostics through
//!   [`tracing`](https://crates.io/crates/tracing).
//! - `testing`: expose [`trace::InMemorySpanExporter`] for use in tests.

mod common;
mod context;
mod error;
mod internal_logs;
pub mod propagation;
mod resource;
pub mod trace;

pub use common::{Array, Key, KeyValue, StringValue, Value};
pub use context::{Context, ContextGuard};
pub use error::{ExportResult, TraceError, TraceResult};
pub use resource::Resource;

/// Wall-clock timestamps used throughout the SDK.
pub mod time {
    use std::time::SystemTime;

    /// The current wall-clock time.
    pub fn now() -> SystemTime {
        SystemTime::now()
    }
}
