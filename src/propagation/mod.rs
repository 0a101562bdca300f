//! Carrying trace context across process boundaries.
//!
//! Propagators read and write text key-value carriers (typically HTTP
//! headers) through the [`Injector`] and [`Extractor`] traits, so the SDK
//! never couples to a particular transport.

mod trace_context;

pub use trace_context::{TraceContextPropagator, TRACEPARENT_HEADER, TRACESTATE_HEADER};

use crate::context::Context;
use std::collections::HashMap;
use std::fmt;
use std::slice;

/// A carrier that outbound context is written into.
pub trait Injector {
    /// Set a key-value pair on the carrier.
    fn set(&mut self, key: &str, value: String);
}

/// A carrier that inbound context is read from.
pub trait Extractor {
    /// Get the value for the given key, if one exists.
    fn get(&self, key: &str) -> Option<&str>;

    /// All keys present in the carrier.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Keys are lowercased, matching HTTP header case-insensitivity.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Lookups are by lowercased key.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect()
    }
}

/// A propagator serializing context to and from text carriers.
pub trait TextMapPropagator: fmt::Debug {
    /// Write the span context found in `cx` into the carrier.
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector);

    /// Write the current thread's span context into the carrier.
    fn inject(&self, injector: &mut dyn Injector) {
        Context::map_current(|cx| self.inject_context(cx, injector))
    }

    /// Build a context on top of `cx` from the carrier's contents.
    ///
    /// When the carrier holds nothing usable, `cx` comes back unchanged.
    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context;

    /// Build a context on top of the current one from the carrier's
    /// contents.
    fn extract(&self, extractor: &dyn Extractor) -> Context {
        Context::map_current(|cx| self.extract_with_context(cx, extractor))
    }

    /// The carrier keys this propagator reads and writes.
    fn fields(&self) -> FieldIter<'_>;
}

/// An iterator over the fields of a [`TextMapPropagator`].
#[derive(Debug)]
pub struct FieldIter<'a>(slice::Iter<'a, String>);

impl<'a> FieldIter<'a> {
    /// Create a new `FieldIter` over the given fields.
    pub fn new(fields: &'a [String]) -> Self {
        FieldIter(fields.iter())
    }
}

impl<'a> Iterator for FieldIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|field| field.as_str())
    }
}
