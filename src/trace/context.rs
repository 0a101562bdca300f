//! Carrying the active span through [`Context`].

use crate::context::{Context, ContextGuard, SynchronizedSpan};
use crate::trace::{Span, SpanContext, Status};
use crate::KeyValue;
use std::borrow::Cow;
use std::sync::OnceLock;
use std::time::SystemTime;

fn noop_span() -> &'static SynchronizedSpan {
    static NOOP_SPAN: OnceLock<SynchronizedSpan> = OnceLock::new();
    NOOP_SPAN.get_or_init(|| SynchronizedSpan::from_span_context(SpanContext::NONE))
}

/// A reference to the span stored in a [`Context`].
///
/// The underlying span may be shared by many context clones, so mutations go
/// through interior synchronization and take `&self`.
#[derive(Debug)]
pub struct SpanRef<'a>(&'a SynchronizedSpan);

impl SpanRef<'_> {
    /// The immutable identity of the referenced span.
    pub fn span_context(&self) -> &SpanContext {
        self.0.span_context()
    }

    /// Returns `true` if the referenced span still records information.
    pub fn is_recording(&self) -> bool {
        self.0.is_recording()
    }

    /// Record an attribute on the referenced span.
    pub fn set_attribute(&self, attribute: KeyValue) {
        self.0.set_attribute(attribute)
    }

    /// Record an event on the referenced span.
    pub fn add_event<T>(&self, name: T, attributes: Vec<KeyValue>)
    where
        T: Into<Cow<'static, str>>,
    {
        self.0.add_event(name.into(), attributes)
    }

    /// Set the status of the referenced span.
    pub fn set_status(&self, status: Status) {
        self.0.set_status(status)
    }

    /// Rename the referenced span.
    pub fn update_name<T>(&self, new_name: T)
    where
        T: Into<Cow<'static, str>>,
    {
        self.0.update_name(new_name.into())
    }

    /// End the referenced span at the current time.
    pub fn end(&self) {
        self.0.end()
    }

    /// End the referenced span with an explicit timestamp.
    pub fn end_with_timestamp(&self, timestamp: SystemTime) {
        self.0.end_with_timestamp(timestamp)
    }
}

/// Methods for storing and retrieving trace data in a [`Context`].
pub trait TraceContextExt {
    /// Returns a copy of the current thread's context with the given span
    /// included.
    fn current_with_span(span: Span) -> Self;

    /// Returns a copy of this context with the given span included.
    fn with_span(&self, span: Span) -> Self;

    /// Returns a reference to this context's span, or to an invalid no-op
    /// span if it has none.
    fn span(&self) -> SpanRef<'_>;

    /// Returns `true` if this context holds a span, recording or not.
    fn has_active_span(&self) -> bool;

    /// Returns a copy of this context with a span wrapping the given remote
    /// span context.
    ///
    /// This is how extracted `traceparent` data becomes the parent of local
    /// spans: the wrapper span never records, it only carries the context.
    fn with_remote_span_context(&self, span_context: SpanContext) -> Self;
}

impl TraceContextExt for Context {
    fn current_with_span(span: Span) -> Self {
        Context::current_with_synchronized_span(SynchronizedSpan::from_span(span))
    }

    fn with_span(&self, span: Span) -> Self {
        self.with_synchronized_span(SynchronizedSpan::from_span(span))
    }

    fn span(&self) -> SpanRef<'_> {
        SpanRef(self.span.as_deref().unwrap_or_else(|| noop_span()))
    }

    fn has_active_span(&self) -> bool {
        self.span.is_some()
    }

    fn with_remote_span_context(&self, span_context: SpanContext) -> Self {
        self.with_synchronized_span(SynchronizedSpan::from_span_context(span_context))
    }
}

/// Run `f` with a reference to the current thread's active span.
pub fn get_active_span<F, T>(f: F) -> T
where
    F: FnOnce(SpanRef<'_>) -> T,
{
    Context::map_current(|cx| f(cx.span()))
}

/// Make the given span the current thread's active span until the returned
/// guard drops.
pub fn mark_span_as_active(span: Span) -> ContextGuard {
    Context::current_with_span(span).attach()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanId, TraceFlags, TraceId, TraceState};

    fn remote_context() -> Context {
        Context::new().with_remote_span_context(SpanContext::new(
            TraceId::from(7u128),
            SpanId::from(7u64),
            TraceFlags::SAMPLED,
            true,
            TraceState::NONE,
        ))
    }

    #[test]
    fn empty_context_has_noop_span() {
        let cx = Context::new();
        assert!(!cx.has_active_span());
        assert!(!cx.span().span_context().is_valid());
        assert!(!cx.span().is_recording());
        // mutations on the no-op span are harmless
        cx.span().set_attribute(KeyValue::new("ignored", true));
        cx.span().end();
    }

    #[test]
    fn remote_span_context_is_carried_but_not_recording() {
        let cx = remote_context();
        assert!(cx.has_active_span());
        let span = cx.span();
        assert!(span.span_context().is_valid());
        assert!(span.span_context().is_remote());
        assert!(!span.is_recording());
    }

    #[test]
    fn attach_makes_span_current() {
        let cx = remote_context();
        let expected = cx.span().span_context().clone();
        let guard = cx.attach();
        get_active_span(|span| {
            assert_eq!(span.span_context(), &expected);
        });
        drop(guard);
        get_active_span(|span| {
            assert!(!span.span_context().is_valid());
        });
    }
}
