//! Execution-scoped ambient state.
//!
//! A [`Context`] is an immutable bag of values that travels with a unit of
//! work. The tracing layer stores the active span in it; applications can
//! stash their own values keyed by type. Attaching a context makes it the
//! current one for the thread until the returned guard is dropped.

use crate::internal_logs::tk_warn;
use crate::trace::{Span, SpanContext, Status};
use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasherDefault, Hasher};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

thread_local! {
    static CURRENT_CONTEXT: RefCell<ContextStack> = RefCell::new(ContextStack::default());
}

type EntryMap = HashMap<TypeId, Arc<dyn Any + Send + Sync>, BuildHasherDefault<IdHasher>>;

/// An execution-scoped collection of values.
#[derive(Clone, Default)]
pub struct Context {
    pub(crate) span: Option<Arc<SynchronizedSpan>>,
    entries: Option<Arc<EntryMap>>,
}

impl Context {
    /// Creates an empty `Context`.
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns an immutable snapshot of the current thread's context.
    pub fn current() -> Self {
        Context::map_current(|cx| cx.clone())
    }

    /// Applies a function to the current context without cloning it.
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT_CONTEXT.with(|cx| cx.borrow().map_current_cx(f))
    }

    /// Returns a copy of the current thread's context with the new value
    /// included.
    pub fn current_with_value<T: 'static + Send + Sync>(value: T) -> Self {
        Context::map_current(|cx| cx.with_value(value))
    }

    /// Returns a copy of the context with the new value included.
    ///
    /// Values are keyed by their type; inserting a second value of the same
    /// type replaces the first.
    pub fn with_value<T: 'static + Send + Sync>(&self, value: T) -> Self {
        let mut new_entries = self
            .entries
            .as_ref()
            .map(|entries| (**entries).clone())
            .unwrap_or_default();
        new_entries.insert(TypeId::of::<T>(), Arc::new(value));
        Context {
            span: self.span.clone(),
            entries: Some(Arc::new(new_entries)),
        }
    }

    /// Returns a reference to the stored value of type `T`, if any.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries
            .as_ref()
            .and_then(|entries| entries.get(&TypeId::of::<T>()))
            .and_then(|rc| rc.downcast_ref())
    }

    /// Makes a copy of this context the current one for the thread, returning
    /// a guard that restores the previous context when dropped.
    ///
    /// Guards should be dropped in the reverse order they were created;
    /// dropping one out of order simply unregisters its context without
    /// disturbing the contexts attached above it.
    pub fn attach(self) -> ContextGuard {
        let cx_pos = CURRENT_CONTEXT.with(|stack| stack.borrow_mut().push(self));
        ContextGuard {
            cx_pos,
            _marker: PhantomData,
        }
    }

    pub(crate) fn current_with_synchronized_span(value: SynchronizedSpan) -> Self {
        Self::map_current(|cx| Context {
            span: Some(Arc::new(value)),
            entries: cx.entries.clone(),
        })
    }

    pub(crate) fn with_synchronized_span(&self, value: SynchronizedSpan) -> Self {
        Context {
            span: Some(Arc::new(value)),
            entries: self.entries.clone(),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Context");
        match &self.span {
            Some(span) => dbg.field("span", span.span_context()),
            None => dbg.field("span", &"None"),
        };
        dbg.field(
            "entries count",
            &self.entries.as_ref().map_or(0, |e| e.len()),
        )
        .finish()
    }
}

/// A span that can be mutated through a shared [`Context`] handle.
///
/// The recording state sits behind a mutex because multiple context clones
/// may reference the same active span; the immutable span context stays
/// outside the lock for cheap reads.
#[derive(Debug)]
pub(crate) struct SynchronizedSpan {
    span_context: SpanContext,
    inner: Option<Mutex<Span>>,
}

impl SynchronizedSpan {
    /// Wrap a span produced by a tracer. Non-recording spans carry only
    /// their context.
    pub(crate) fn from_span(span: Span) -> Self {
        SynchronizedSpan {
            span_context: span.span_context().clone(),
            inner: span.is_recording().then(|| Mutex::new(span)),
        }
    }

    /// Wrap a bare span context, e.g. one extracted from incoming headers.
    pub(crate) fn from_span_context(span_context: SpanContext) -> Self {
        SynchronizedSpan {
            span_context,
            inner: None,
        }
    }

    pub(crate) fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    pub(crate) fn with_inner_mut<F: FnOnce(&mut Span)>(&self, f: F) {
        if let Some(inner) = &self.inner {
            match inner.lock() {
                Ok(mut locked) => f(&mut locked),
                Err(err) => tk_warn!(
                    name: "Context.SpanLockPoisoned",
                    message = err.to_string()
                ),
            }
        }
    }

    pub(crate) fn set_attribute(&self, attribute: crate::KeyValue) {
        self.with_inner_mut(|span| span.set_attribute(attribute))
    }

    pub(crate) fn add_event(
        &self,
        name: Cow<'static, str>,
        attributes: Vec<crate::KeyValue>,
    ) {
        self.with_inner_mut(|span| span.add_event(name, attributes))
    }

    pub(crate) fn set_status(&self, status: Status) {
        self.with_inner_mut(|span| span.set_status(status))
    }

    pub(crate) fn update_name(&self, name: Cow<'static, str>) {
        self.with_inner_mut(|span| span.update_name(name))
    }

    pub(crate) fn is_recording(&self) -> bool {
        let mut recording = false;
        self.with_inner_mut(|span| recording = span.is_recording());
        recording
    }

    pub(crate) fn end_with_timestamp(&self, timestamp: SystemTime) {
        self.with_inner_mut(|span| span.end_with_timestamp(timestamp))
    }

    pub(crate) fn end(&self) {
        self.with_inner_mut(|span| span.end())
    }
}

/// A guard that resets the current context to the prior context when dropped.
#[derive(Debug)]
pub struct ContextGuard {
    // Position of the attached context in the thread's stack.
    cx_pos: u16,
    // Relies on thread locals, so must not cross threads.
    _marker: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let pos = self.cx_pos;
        if pos > ContextStack::BASE_POS && pos < ContextStack::MAX_POS {
            CURRENT_CONTEXT.with(|stack| stack.borrow_mut().pop_id(pos));
        }
    }
}

/// `TypeId`s are already high-quality hashes; store the value as-is.
#[derive(Clone, Default, Debug)]
struct IdHasher(u64);

impl Hasher for IdHasher {
    fn write(&mut self, _: &[u8]) {
        unreachable!("TypeId calls write_u64");
    }

    #[inline]
    fn write_u64(&mut self, id: u64) {
        self.0 = id;
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }
}

/// Per-thread stack of attached contexts.
///
/// Guards hold a 1-based position into this stack so they can detach out of
/// order: a non-top guard clears its slot and the context is skipped when
/// the stack unwinds past it. Only popping the top position actually changes
/// the thread's current context.
struct ContextStack {
    /// The context currently active on this thread. Kept outside the vec so
    /// reads never index into it.
    current_cx: Context,
    /// Saved contexts below the current one. `None` marks a slot whose guard
    /// was dropped out of order.
    stack: Vec<Option<Context>>,
    _marker: PhantomData<*const ()>,
}

impl ContextStack {
    const BASE_POS: u16 = 0;
    const MAX_POS: u16 = u16::MAX;
    const INITIAL_CAPACITY: usize = 8;

    #[inline(always)]
    fn push(&mut self, cx: Context) -> u16 {
        // Ids are 1-based: the empty base context occupies position zero.
        let next_pos = self.stack.len() + 1;
        if next_pos < ContextStack::MAX_POS.into() {
            let previous = std::mem::replace(&mut self.current_cx, cx);
            self.stack.push(Some(previous));
            next_pos as u16
        } else {
            tk_warn!(
                name: "Context.AttachFailed",
                message = "context stack exhausted; the current context is unchanged \
                   and the returned guard does nothing"
            );
            ContextStack::MAX_POS
        }
    }

    #[inline(always)]
    fn pop_id(&mut self, pos: u16) {
        if pos == ContextStack::BASE_POS || pos == ContextStack::MAX_POS {
            return;
        }
        let len = self.stack.len() as u16;
        if pos == len {
            // Unwind past any slots whose guards already detached.
            while let Some(None) = self.stack.last() {
                _ = self.stack.pop();
            }
            if let Some(Some(previous)) = self.stack.pop() {
                self.current_cx = previous;
            }
        } else if pos < len {
            // Out of order drop: the context this guard attached sits in the
            // slot at its own position, saved there by the guard above it.
            _ = self.stack[pos as usize].take();
        } else {
            tk_warn!(
                name: "Context.PopOutOfBounds",
                position = pos,
                stack_length = len
            );
        }
    }

    #[inline(always)]
    fn map_current_cx<T>(&self, f: impl FnOnce(&Context) -> T) -> T {
        f(&self.current_cx)
    }
}

impl Default for ContextStack {
    fn default() -> Self {
        ContextStack {
            current_cx: Context::default(),
            stack: Vec::with_capacity(ContextStack::INITIAL_CAPACITY),
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct ValueA(u64);
    #[derive(Debug, PartialEq)]
    struct ValueB(i64);

    #[test]
    fn nested_contexts() {
        #[derive(Debug, PartialEq)]
        struct A(u8);
        #[derive(Debug, PartialEq)]
        struct B(u8);
        let outer_guard = Context::new().with_value(A(1)).attach();

        // lexical scoping restores the outer context on drop
        {
            let inner_guard = Context::current_with_value(B(2)).attach();
            drop(inner_guard);
            Context::map_current(|cx| {
                assert_eq!(cx.get(), Some(&A(1)));
                assert_eq!(cx.get::<B>(), None);
            });
        }

        drop(outer_guard);
        Context::map_current(|cx| {
            assert_eq!(cx.get::<A>(), None);
            assert_eq!(cx.get::<B>(), None);
        });
    }

    #[test]
    fn overlapping_contexts() {
        let outer_guard = Context::new().with_value(ValueA(1)).attach();
        let inner_guard = Context::current_with_value(ValueB(2)).attach();

        // dropping the outer guard first leaves the inner context current
        drop(outer_guard);
        Context::map_current(|cx| {
            assert_eq!(cx.get(), Some(&ValueA(1)));
            assert_eq!(cx.get(), Some(&ValueB(2)));
        });

        drop(inner_guard);
        Context::map_current(|cx| {
            assert_eq!(cx.get::<ValueA>(), None);
            assert_eq!(cx.get::<ValueB>(), None);
        });
    }

    #[test]
    fn with_value_replaces_same_type() {
        let cx = Context::new().with_value(ValueA(1)).with_value(ValueA(2));
        assert_eq!(cx.get(), Some(&ValueA(2)));
    }

    #[test]
    fn values_survive_cloning() {
        let cx = Context::new().with_value(ValueA(42));
        let cloned = cx.clone();
        assert_eq!(cloned.get(), Some(&ValueA(42)));
        assert_eq!(cx.get(), Some(&ValueA(42)));
    }
}
