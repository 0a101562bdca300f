//! Tracers create spans on behalf of a provider.

use crate::common::KeyValue;
use crate::context::Context;
use crate::trace::span::SpanData;
use crate::trace::{
    Link, SamplingDecision, Span, SpanContext, SpanEvents, SpanId, SpanKind, SpanLimits,
    SpanLinks, Status, TraceContextExt, TraceFlags, TracerProvider,
};
use std::borrow::Cow;
use std::time::SystemTime;

/// Creates spans carrying one instrumentation scope's name.
///
/// Tracers are cheap handles onto their provider; cloning one does not
/// duplicate any pipeline state.
#[derive(Clone, Debug)]
pub struct Tracer {
    scope_name: Cow<'static, str>,
    provider: TracerProvider,
}

impl Tracer {
    pub(crate) fn new(scope_name: Cow<'static, str>, provider: TracerProvider) -> Self {
        Tracer {
            scope_name,
            provider,
        }
    }

    /// The instrumentation scope name stamped on this tracer's spans.
    pub fn scope_name(&self) -> &Cow<'static, str> {
        &self.scope_name
    }

    pub(crate) fn provider(&self) -> &TracerProvider {
        &self.provider
    }

    /// Start configuring a new span.
    pub fn span_builder<T: Into<Cow<'static, str>>>(&self, name: T) -> SpanBuilder {
        SpanBuilder::from_name(name)
    }

    /// Start a span with the default options, parented to the current
    /// context.
    pub fn start<T: Into<Cow<'static, str>>>(&self, name: T) -> Span {
        Context::map_current(|cx| self.start_with_context(name, cx))
    }

    /// Start a span with the default options, parented to `parent_cx`.
    pub fn start_with_context<T: Into<Cow<'static, str>>>(
        &self,
        name: T,
        parent_cx: &Context,
    ) -> Span {
        self.build_with_context(SpanBuilder::from_name(name), parent_cx)
    }

    /// Start a span from a builder, parented to the current context.
    pub fn build(&self, builder: SpanBuilder) -> Span {
        Context::map_current(|cx| self.build_with_context(builder, cx))
    }

    /// Start a span, make it the current thread's active span, run `f`, and
    /// end the span when `f` returns.
    pub fn in_span<T, F, N>(&self, name: N, f: F) -> T
    where
        F: FnOnce(Context) -> T,
        N: Into<Cow<'static, str>>,
    {
        let span = self.start(name);
        let cx = Context::current_with_span(span);
        let _guard = cx.clone().attach();
        f(cx)
    }

    /// Start a span from a builder, parented to `parent_cx`.
    ///
    /// This is where a span's fate is decided: a span id is always minted;
    /// the trace id comes from a valid parent span context or is minted
    /// fresh; the sampler then runs exactly once and its decision determines
    /// whether the span records, whether the sampled flag is set, and which
    /// trace state the new context carries.
    pub fn build_with_context(&self, builder: SpanBuilder, parent_cx: &Context) -> Span {
        if self.provider.is_shutdown() {
            return Span::new(SpanContext::NONE, None, self.clone(), SpanLimits::default());
        }

        let config = self.provider.config();
        let span_limits = config.span_limits;
        let span_id = config.id_generator.new_span_id();

        let parent_span_context = parent_cx
            .has_active_span()
            .then(|| parent_cx.span().span_context().clone())
            .filter(SpanContext::is_valid);
        let (trace_id, parent_span_id, parent_flags) = match &parent_span_context {
            Some(parent) => (parent.trace_id(), parent.span_id(), parent.trace_flags()),
            None => (
                config.id_generator.new_trace_id(),
                SpanId::INVALID,
                TraceFlags::default(),
            ),
        };

        let span_kind = builder.span_kind.clone().unwrap_or(SpanKind::Internal);
        let sampling_result = config.sampler.should_sample(
            Some(parent_cx),
            trace_id,
            &builder.name,
            &span_kind,
            builder.attributes.as_deref().unwrap_or(&[]),
            builder.links.as_deref().unwrap_or(&[]),
        );

        let trace_flags =
            parent_flags.with_sampled(sampling_result.decision == SamplingDecision::RecordAndSample);
        let span_context = SpanContext::new(
            trace_id,
            span_id,
            trace_flags,
            false,
            sampling_result.trace_state,
        );

        if sampling_result.decision == SamplingDecision::Drop {
            // the context still propagates, the data does not
            return Span::new(span_context, None, self.clone(), span_limits);
        }

        let data = build_recording_data(
            builder,
            span_kind,
            parent_span_id,
            sampling_result.attributes,
            &span_limits,
        );
        let mut span = Span::new(span_context, Some(data), self.clone(), span_limits);

        for processor in self.provider.span_processors() {
            processor.on_start(&mut span, parent_cx);
        }

        span
    }
}

fn build_recording_data(
    builder: SpanBuilder,
    span_kind: SpanKind,
    parent_span_id: SpanId,
    sampler_attributes: Vec<KeyValue>,
    span_limits: &SpanLimits,
) -> SpanData {
    let start_time = builder.start_time.unwrap_or_else(crate::time::now);

    let attribute_limit = span_limits.max_attributes_per_span as usize;
    let mut attributes = Vec::new();
    let mut dropped_attributes_count: u32 = 0;
    for attribute in builder
        .attributes
        .into_iter()
        .flatten()
        .chain(sampler_attributes)
    {
        if attributes.len() < attribute_limit {
            attributes.push(match span_limits.max_attribute_value_length {
                Some(max_len) => KeyValue {
                    key: attribute.key,
                    value: attribute.value.truncated(max_len as usize),
                },
                None => attribute,
            });
        } else {
            dropped_attributes_count += 1;
        }
    }

    let link_limit = span_limits.max_links_per_span as usize;
    let link_attribute_limit = span_limits.max_attributes_per_link as usize;
    let mut links = SpanLinks::default();
    for mut link in builder.links.into_iter().flatten() {
        if links.links.len() < link_limit {
            let dropped = link
                .attributes
                .len()
                .saturating_sub(link_attribute_limit);
            link.attributes.truncate(link_attribute_limit);
            link.dropped_attributes_count += dropped as u32;
            links.links.push(link);
        } else {
            links.dropped_count += 1;
        }
    }

    SpanData {
        parent_span_id,
        span_kind,
        name: builder.name,
        start_time,
        // matching start and end mark the span as not yet ended
        end_time: start_time,
        attributes,
        dropped_attributes_count,
        events: SpanEvents::default(),
        links,
        status: Status::Unset,
    }
}

/// Everything about a span that can be decided before it starts.
#[derive(Clone, Debug, Default)]
pub struct SpanBuilder {
    /// The span's name.
    pub name: Cow<'static, str>,
    /// The span kind, `Internal` if unset.
    pub span_kind: Option<SpanKind>,
    /// An explicit start time, now if unset.
    pub start_time: Option<SystemTime>,
    /// Attributes known up front, visible to the sampler.
    pub attributes: Option<Vec<KeyValue>>,
    /// Links known up front, visible to the sampler.
    pub links: Option<Vec<Link>>,
}

impl SpanBuilder {
    /// Create a builder for a span with the given name.
    pub fn from_name<T: Into<Cow<'static, str>>>(name: T) -> Self {
        SpanBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the span kind.
    pub fn with_kind(self, span_kind: SpanKind) -> Self {
        SpanBuilder {
            span_kind: Some(span_kind),
            ..self
        }
    }

    /// Set an explicit start time.
    pub fn with_start_time(self, start_time: SystemTime) -> Self {
        SpanBuilder {
            start_time: Some(start_time),
            ..self
        }
    }

    /// Attach attributes known before the span starts.
    pub fn with_attributes<I: IntoIterator<Item = KeyValue>>(self, attributes: I) -> Self {
        SpanBuilder {
            attributes: Some(attributes.into_iter().collect()),
            ..self
        }
    }

    /// Attach links known before the span starts.
    pub fn with_links(self, links: Vec<Link>) -> Self {
        SpanBuilder {
            links: Some(links),
            ..self
        }
    }

    /// Start the span, parented to the current context.
    pub fn start(self, tracer: &Tracer) -> Span {
        tracer.build(self)
    }

    /// Start the span, parented to `parent_cx`.
    pub fn start_with_context(self, tracer: &Tracer, parent_cx: &Context) -> Span {
        tracer.build_with_context(self, parent_cx)
    }
}
