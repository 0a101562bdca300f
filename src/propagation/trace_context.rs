//! W3C trace context propagation.
//!
//! The `traceparent` header carries the trace id, parent span id and flags
//! in the fixed form `00-{trace-id}-{parent-id}-{flags}`; the optional
//! `tracestate` header carries vendor data. See
//! <https://www.w3.org/TR/trace-context/>.

use crate::context::Context;
use crate::propagation::{Extractor, FieldIter, Injector, TextMapPropagator};
use crate::trace::{
    SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
};
use std::sync::OnceLock;

/// The version this propagator emits and the only one it accepts.
const SUPPORTED_VERSION: &str = "00";

/// The `traceparent` header name.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// The `tracestate` header name.
pub const TRACESTATE_HEADER: &str = "tracestate";

fn header_fields() -> &'static [String; 2] {
    static HEADER_FIELDS: OnceLock<[String; 2]> = OnceLock::new();
    HEADER_FIELDS.get_or_init(|| {
        [
            TRACEPARENT_HEADER.to_owned(),
            TRACESTATE_HEADER.to_owned(),
        ]
    })
}

/// Propagates span context in the W3C trace context format.
///
/// Extraction is strict about `traceparent` (a malformed header is ignored
/// entirely and the incoming context passes through untouched) but forgiving
/// about `tracestate`: a bad tracestate never invalidates a good
/// traceparent.
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

impl TraceContextPropagator {
    /// Create a new propagator.
    pub fn new() -> Self {
        TraceContextPropagator::default()
    }

    fn extract_span_context(&self, extractor: &dyn Extractor) -> Option<SpanContext> {
        let header_value = extractor.get(TRACEPARENT_HEADER)?.trim();
        let parts: Vec<&str> = header_value.split('-').collect();
        if parts.len() != 4 {
            return None;
        }

        // only the original version, spelled exactly "00", is accepted
        if parts[0] != SUPPORTED_VERSION {
            return None;
        }

        let trace_id = TraceId::from_hex(parts[1]).ok()?;
        let span_id = SpanId::from_hex(parts[2]).ok()?;

        let flags_hex = parts[3];
        if flags_hex.len() != 2
            || !flags_hex
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return None;
        }
        let flags = u8::from_str_radix(flags_hex, 16).ok()?;
        // unknown flag bits are reserved; keep only the sampled bit
        let trace_flags = TraceFlags::new(flags) & TraceFlags::SAMPLED;

        let trace_state = extractor
            .get(TRACESTATE_HEADER)
            .map(TraceState::from_header)
            .unwrap_or_default();

        let span_context = SpanContext::new(trace_id, span_id, trace_flags, true, trace_state);
        span_context.is_valid().then_some(span_context)
    }
}

impl TextMapPropagator for TraceContextPropagator {
    /// Writes the `traceparent` header, and the `tracestate` header when the
    /// trace state has members. Invalid span contexts are not written at
    /// all.
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let span = cx.span();
        let span_context = span.span_context();
        if !span_context.is_valid() {
            return;
        }

        let flags = span_context.trace_flags() & TraceFlags::SAMPLED;
        let header_value = format!(
            "{}-{}-{}-{:02x}",
            SUPPORTED_VERSION,
            span_context.trace_id(),
            span_context.span_id(),
            flags,
        );
        injector.set(TRACEPARENT_HEADER, header_value);

        let tracestate = span_context.trace_state().header();
        if !tracestate.is_empty() {
            injector.set(TRACESTATE_HEADER, tracestate);
        }
    }

    /// Returns a context derived from `cx` with the extracted remote span
    /// context, or `cx` unchanged when the headers are absent or malformed.
    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        match self.extract_span_context(extractor) {
            Some(span_context) => cx.with_remote_span_context(span_context),
            None => cx.clone(),
        }
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(header_fields())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid_span_context() -> SpanContext {
        SpanContext::new(
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::NONE,
        )
    }

    #[rustfmt::skip]
    fn extract_data() -> Vec<(&'static str, &'static str, SpanContext)> {
        let trace_id = TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap();
        let span_id = SpanId::from_hex("00f067aa0ba902b7").unwrap();
        let state = TraceState::from_header("foo=bar");
        vec![
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01", "foo=bar", SpanContext::new(trace_id, span_id, TraceFlags::SAMPLED, true, state.clone())),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00", "foo=bar", SpanContext::new(trace_id, span_id, TraceFlags::default(), true, state.clone())),
            // unknown flag bits are masked away
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-ff", "foo=bar", SpanContext::new(trace_id, span_id, TraceFlags::SAMPLED, true, state.clone())),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-fe", "foo=bar", SpanContext::new(trace_id, span_id, TraceFlags::default(), true, state)),
            // surrounding whitespace is tolerated
            (" 00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01 ", "", SpanContext::new(trace_id, span_id, TraceFlags::SAMPLED, true, TraceState::NONE)),
        ]
    }

    #[rustfmt::skip]
    fn extract_data_invalid() -> Vec<(&'static str, &'static str)> {
        vec![
            ("0000-00000000000000000000000000000000-0000000000000000-01", "wrong version length"),
            ("01-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01", "unsupported version"),
            ("0x-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01", "bogus version"),
            ("00-ab00000000000000000000000000000000-cd00000000000000-01", "trace id too long"),
            ("00-ab0000000000000000000000000000-cd00000000000000-01", "trace id too short"),
            ("00-4BF92F3577B34DA6A3CE929D0E0E4736-00f067aa0ba902b7-01", "uppercase trace id"),
            ("00-00000000000000000000000000000000-00f067aa0ba902b7-01", "all-zero trace id"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-0000000000000000-01", "all-zero span id"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00F067AA0BA902B7-01", "uppercase span id"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-1", "flags too short"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-001", "flags too long"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-0F", "uppercase flags"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-qw", "flags not hex"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7", "three fields"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01-extra", "five fields"),
            ("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01-", "trailing delimiter"),
            ("", "empty header"),
            ("gibberish", "not a traceparent at all"),
        ]
    }

    #[test]
    fn extract_valid_headers() {
        let propagator = TraceContextPropagator::new();
        for (traceparent, tracestate, expected) in extract_data() {
            let mut carrier: HashMap<String, String> = HashMap::new();
            carrier.set(TRACEPARENT_HEADER, traceparent.to_string());
            carrier.set(TRACESTATE_HEADER, tracestate.to_string());

            let cx = propagator.extract_with_context(&Context::new(), &carrier);
            assert_eq!(
                cx.span().span_context(),
                &expected,
                "{traceparent:?} / {tracestate:?}"
            );
            assert!(cx.span().span_context().is_remote());
        }
    }

    #[test]
    fn extract_invalid_headers_leaves_context_untouched() {
        let propagator = TraceContextPropagator::new();
        for (traceparent, reason) in extract_data_invalid() {
            let mut carrier: HashMap<String, String> = HashMap::new();
            carrier.set(TRACEPARENT_HEADER, traceparent.to_string());

            let cx = propagator.extract_with_context(&Context::new(), &carrier);
            assert!(
                !cx.has_active_span(),
                "accepted {traceparent:?} ({reason})"
            );
        }
    }

    #[test]
    fn extract_without_headers_leaves_context_untouched() {
        let propagator = TraceContextPropagator::new();
        let carrier: HashMap<String, String> = HashMap::new();
        let cx = propagator.extract_with_context(&Context::new(), &carrier);
        assert!(!cx.has_active_span());
    }

    #[test]
    fn bad_tracestate_does_not_invalidate_traceparent() {
        let propagator = TraceContextPropagator::new();
        let mut carrier: HashMap<String, String> = HashMap::new();
        carrier.set(
            TRACEPARENT_HEADER,
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
        );
        carrier.set(
            TRACESTATE_HEADER,
            "foo=bar,UPPER=no,ok=yes,broken".to_string(),
        );

        let cx = propagator.extract_with_context(&Context::new(), &carrier);
        let span_context = cx.span().span_context().clone();
        assert!(span_context.is_valid());
        assert_eq!(span_context.trace_state().header(), "foo=bar,ok=yes");
    }

    #[test]
    fn inject_writes_traceparent_and_skips_empty_tracestate() {
        let propagator = TraceContextPropagator::new();
        let mut carrier: HashMap<String, String> = HashMap::new();

        let cx = Context::new().with_remote_span_context(valid_span_context());
        propagator.inject_context(&cx, &mut carrier);

        assert_eq!(
            Extractor::get(&carrier, TRACEPARENT_HEADER),
            Some("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
        );
        assert_eq!(Extractor::get(&carrier, TRACESTATE_HEADER), None);
    }

    #[test]
    fn inject_writes_tracestate_when_present() {
        let propagator = TraceContextPropagator::new();
        let mut carrier: HashMap<String, String> = HashMap::new();

        let span_context = SpanContext::new(
            TraceId::from(1u128),
            SpanId::from(1u64),
            TraceFlags::default(),
            false,
            TraceState::from_header("foo=bar"),
        );
        let cx = Context::new().with_remote_span_context(span_context);
        propagator.inject_context(&cx, &mut carrier);

        assert_eq!(
            Extractor::get(&carrier, TRACEPARENT_HEADER),
            Some("00-00000000000000000000000000000001-0000000000000001-00")
        );
        assert_eq!(Extractor::get(&carrier, TRACESTATE_HEADER), Some("foo=bar"));
    }

    #[test]
    fn inject_masks_unknown_flag_bits() {
        let propagator = TraceContextPropagator::new();
        let mut carrier: HashMap<String, String> = HashMap::new();

        let span_context = SpanContext::new(
            TraceId::from(1u128),
            SpanId::from(1u64),
            TraceFlags::new(0xff),
            false,
            TraceState::NONE,
        );
        let cx = Context::new().with_remote_span_context(span_context);
        propagator.inject_context(&cx, &mut carrier);

        assert_eq!(
            Extractor::get(&carrier, TRACEPARENT_HEADER),
            Some("00-00000000000000000000000000000001-0000000000000001-01")
        );
    }

    #[test]
    fn inject_skips_invalid_context() {
        let propagator = TraceContextPropagator::new();
        let mut carrier: HashMap<String, String> = HashMap::new();

        propagator.inject_context(&Context::new(), &mut carrier);
        assert!(carrier.is_empty());

        let cx = Context::new().with_remote_span_context(SpanContext::NONE);
        propagator.inject_context(&cx, &mut carrier);
        assert!(carrier.is_empty());
    }

    #[test]
    fn round_trip_preserves_context() {
        let propagator = TraceContextPropagator::new();
        let mut carrier: HashMap<String, String> = HashMap::new();

        let original = SpanContext::new(
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::from_header("congo=t61rcWkgMzE,rojo=00f067aa0ba902b7"),
        );
        let cx = Context::new().with_remote_span_context(original.clone());
        propagator.inject_context(&cx, &mut carrier);

        let extracted = propagator.extract_with_context(&Context::new(), &carrier);
        assert_eq!(extracted.span().span_context(), &original);
    }

    #[test]
    fn fields_lists_both_headers() {
        let propagator = TraceContextPropagator::new();
        let fields: Vec<&str> = propagator.fields().collect();
        assert_eq!(fields, vec![TRACEPARENT_HEADER, TRACESTATE_HEADER]);
    }
}
