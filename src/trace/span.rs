//! The recording half of a span's life.
//!
//! A [`Span`] either carries recording data or it does not. Sampler-dropped
//! spans and spans that have already ended hold no data, which makes every
//! mutation on them a cheap no-op without separate state tracking.

use crate::common::{Key, KeyValue, Value};
use crate::trace::export;
use crate::trace::tracer::Tracer;
use crate::trace::{Event, SpanContext, SpanEvents, SpanId, SpanKind, SpanLimits, SpanLinks, Status};
use std::borrow::Cow;
use std::time::SystemTime;

/// A single operation within a trace.
///
/// Spans are ended explicitly with [`end`](Span::end); dropping an un-ended
/// span ends it implicitly so data is not lost to early returns.
#[derive(Debug)]
pub struct Span {
    span_context: SpanContext,
    data: Option<SpanData>,
    tracer: Tracer,
    span_limits: SpanLimits,
}

/// The mutable state of a recording span.
#[derive(Clone, Debug)]
pub(crate) struct SpanData {
    pub(crate) parent_span_id: SpanId,
    pub(crate) span_kind: SpanKind,
    pub(crate) name: Cow<'static, str>,
    pub(crate) start_time: SystemTime,
    pub(crate) end_time: SystemTime,
    pub(crate) attributes: Vec<KeyValue>,
    pub(crate) dropped_attributes_count: u32,
    pub(crate) events: SpanEvents,
    pub(crate) links: SpanLinks,
    pub(crate) status: Status,
}

impl Span {
    pub(crate) fn new(
        span_context: SpanContext,
        data: Option<SpanData>,
        tracer: Tracer,
        span_limits: SpanLimits,
    ) -> Self {
        Span {
            span_context,
            data,
            tracer,
            span_limits,
        }
    }

    /// The immutable identity of this span.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Returns `true` while the span can still record information.
    ///
    /// This is independent of the sampled flag: an unsampled span may record
    /// (and discard at export time), and a sampled span stops recording once
    /// ended.
    pub fn is_recording(&self) -> bool {
        self.data.is_some()
    }

    /// Record an attribute.
    ///
    /// Setting a key that is already present replaces its value in place and
    /// never counts as a drop. A new key beyond the per-span limit is
    /// discarded and counted in `dropped_attributes_count`.
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        let limits = self.span_limits;
        let attribute = clamp_value_length(attribute, limits.max_attribute_value_length);
        self.with_data(|data| {
            if let Some(existing) = data
                .attributes
                .iter_mut()
                .find(|kv| kv.key == attribute.key)
            {
                existing.value = attribute.value;
            } else if data.attributes.len() < limits.max_attributes_per_span as usize {
                data.attributes.push(attribute);
            } else {
                data.dropped_attributes_count += 1;
            }
        });
    }

    /// Record several attributes at once.
    pub fn set_attributes(&mut self, attributes: impl IntoIterator<Item = KeyValue>) {
        if self.is_recording() {
            for attribute in attributes {
                self.set_attribute(attribute);
            }
        }
    }

    /// Remove an attribute. Removing an absent key does nothing; removals
    /// are not drops.
    pub fn remove_attribute(&mut self, key: &Key) {
        self.with_data(|data| data.attributes.retain(|kv| &kv.key != key));
    }

    /// Record an event at the current time.
    pub fn add_event<T>(&mut self, name: T, attributes: Vec<KeyValue>)
    where
        T: Into<Cow<'static, str>>,
    {
        self.add_event_with_timestamp(name, crate::time::now(), attributes)
    }

    /// Record an event with an explicit timestamp.
    pub fn add_event_with_timestamp<T>(
        &mut self,
        name: T,
        timestamp: SystemTime,
        mut attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>,
    {
        let limits = self.span_limits;
        self.with_data(|data| {
            if data.events.len() < limits.max_events_per_span as usize {
                let dropped = attributes.len().saturating_sub(limits.max_attributes_per_event as usize);
                attributes.truncate(limits.max_attributes_per_event as usize);
                clamp_value_lengths(&mut attributes, limits.max_attribute_value_length);
                data.events.events.push(Event::new(
                    name.into(),
                    timestamp,
                    attributes,
                    dropped as u32,
                ));
            } else {
                data.events.dropped_count += 1;
            }
        });
    }

    /// Record a link to another span.
    pub fn add_link(&mut self, span_context: SpanContext, mut attributes: Vec<KeyValue>) {
        let limits = self.span_limits;
        self.with_data(|data| {
            if data.links.len() < limits.max_links_per_span as usize {
                let dropped = attributes.len().saturating_sub(limits.max_attributes_per_link as usize);
                attributes.truncate(limits.max_attributes_per_link as usize);
                clamp_value_lengths(&mut attributes, limits.max_attribute_value_length);
                data.links.links.push(crate::trace::Link::new(
                    span_context,
                    attributes,
                    dropped as u32,
                ));
            } else {
                data.links.dropped_count += 1;
            }
        });
    }

    /// Set the span status.
    ///
    /// Statuses carry a priority (`Ok` over `Error` over `Unset`) and only a
    /// strictly higher priority replaces the current one, so a span marked
    /// `Ok` stays `Ok`.
    pub fn set_status(&mut self, status: Status) {
        self.with_data(|data| {
            if status.priority() > data.status.priority() {
                data.status = status;
            }
        });
    }

    /// Rename the span.
    pub fn update_name<T>(&mut self, new_name: T)
    where
        T: Into<Cow<'static, str>>,
    {
        self.with_data(|data| data.name = new_name.into());
    }

    /// End the span at the current time.
    ///
    /// Only the first call has an effect; the span stops recording and, if
    /// sampled, its snapshot is handed to the registered span processors.
    pub fn end(&mut self) {
        self.ensure_ended_and_exported(None);
    }

    /// End the span with an explicit timestamp.
    pub fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        self.ensure_ended_and_exported(Some(timestamp));
    }

    fn with_data<T>(&mut self, f: impl FnOnce(&mut SpanData) -> T) -> Option<T> {
        self.data.as_mut().map(f)
    }

    fn ensure_ended_and_exported(&mut self, timestamp: Option<SystemTime>) {
        let Some(mut data) = self.data.take() else {
            return;
        };

        match timestamp {
            Some(timestamp) => data.end_time = timestamp,
            // unchanged end time means the span is ending naturally
            None if data.end_time == data.start_time => data.end_time = crate::time::now(),
            None => {}
        }

        if !self.span_context.is_sampled() {
            return;
        }

        let provider = self.tracer.provider();
        let processors = provider.span_processors();
        match processors.len() {
            0 => {}
            1 => processors[0].on_end(self.snapshot(data)),
            _ => {
                for processor in processors {
                    processor.on_end(self.snapshot(data.clone()));
                }
            }
        }
    }

    fn snapshot(&self, data: SpanData) -> export::SpanData {
        export::SpanData {
            span_context: self.span_context.clone(),
            parent_span_id: data.parent_span_id,
            span_kind: data.span_kind,
            name: data.name,
            start_time: data.start_time,
            end_time: data.end_time,
            attributes: data.attributes,
            dropped_attributes_count: data.dropped_attributes_count,
            events: data.events,
            links: data.links,
            status: data.status,
            scope_name: self.tracer.scope_name().clone(),
        }
    }
}

impl Drop for Span {
    /// Implicitly ends the span if it was not ended explicitly.
    fn drop(&mut self) {
        self.ensure_ended_and_exported(None);
    }
}

fn clamp_value_length(attribute: KeyValue, limit: Option<u32>) -> KeyValue {
    match limit {
        Some(max_len) => KeyValue {
            key: attribute.key,
            value: attribute.value.truncated(max_len as usize),
        },
        None => attribute,
    }
}

fn clamp_value_lengths(attributes: &mut Vec<KeyValue>, limit: Option<u32>) {
    if let Some(max_len) = limit {
        for attribute in attributes.iter_mut() {
            let value = std::mem::replace(&mut attribute.value, Value::Bool(false));
            attribute.value = value.truncated(max_len as usize);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::span_processor::tests::TestSpanProcessor;
    use crate::trace::{TracerProvider, Tracer};
    use crate::KeyValue;
    use std::time::Duration;

    fn sampled_tracer() -> (TracerProvider, Tracer, TestSpanProcessor) {
        let processor = TestSpanProcessor::new();
        let provider = TracerProvider::builder()
            .with_span_processor(processor.clone())
            .build();
        let tracer = provider.tracer("test");
        (provider, tracer, processor)
    }

    fn recording_span(tracer: &Tracer) -> Span {
        tracer.start("test-span")
    }

    #[test]
    fn span_is_recording_until_ended() {
        let (_provider, tracer, _processor) = sampled_tracer();
        let mut span = recording_span(&tracer);
        assert!(span.is_recording());
        span.end();
        assert!(!span.is_recording());
    }

    #[test]
    fn mutations_after_end_are_noops() {
        let (_provider, tracer, processor) = sampled_tracer();
        let mut span = recording_span(&tracer);
        span.set_attribute(KeyValue::new("before", true));
        span.end();

        span.set_attribute(KeyValue::new("after", true));
        span.add_event("too-late", vec![]);
        span.set_status(Status::Ok);
        span.update_name("renamed");

        let spans = processor.ended_spans();
        assert_eq!(spans.len(), 1);
        let data = &spans[0];
        assert_eq!(data.name, "test-span");
        assert_eq!(data.attributes.len(), 1);
        assert!(data.events.is_empty());
        assert_eq!(data.status, Status::Unset);
    }

    #[test]
    fn end_only_once() {
        let (_provider, tracer, processor) = sampled_tracer();
        let mut span = recording_span(&tracer);
        let timestamp = crate::time::now();
        span.end_with_timestamp(timestamp);
        span.end_with_timestamp(timestamp.checked_add(Duration::from_secs(10)).unwrap());

        let spans = processor.ended_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].end_time, timestamp);
    }

    #[test]
    fn drop_ends_span_implicitly() {
        let (_provider, tracer, processor) = sampled_tracer();
        {
            let span = recording_span(&tracer);
            assert!(span.is_recording());
        }
        assert_eq!(processor.ended_spans().len(), 1);
    }

    #[test]
    fn set_attribute_replaces_by_key() {
        let (_provider, tracer, processor) = sampled_tracer();
        let mut span = recording_span(&tracer);
        span.set_attribute(KeyValue::new("k", "v1"));
        span.set_attribute(KeyValue::new("k", "v2"));
        span.end();

        let spans = processor.ended_spans();
        assert_eq!(spans[0].attributes, vec![KeyValue::new("k", "v2")]);
        assert_eq!(spans[0].dropped_attributes_count, 0);
    }

    #[test]
    fn attributes_beyond_limit_are_dropped_and_counted() {
        let processor = TestSpanProcessor::new();
        let provider = TracerProvider::builder()
            .with_span_processor(processor.clone())
            .with_max_attributes_per_span(2)
            .build();
        let tracer = provider.tracer("test");

        let mut span = tracer.start("limited");
        for i in 0..5 {
            span.set_attribute(KeyValue::new(format!("key{}", i), i as i64));
        }
        // replacing a retained key is not a drop
        span.set_attribute(KeyValue::new("key0", -1i64));
        span.end();

        let spans = processor.ended_spans();
        let data = &spans[0];
        assert_eq!(data.attributes.len(), 2);
        assert_eq!(data.dropped_attributes_count, 3);
        assert_eq!(data.attributes[0], KeyValue::new("key0", -1i64));
        assert_eq!(data.attributes[1], KeyValue::new("key1", 1i64));
    }

    #[test]
    fn remove_attribute_is_not_a_drop() {
        let (_provider, tracer, processor) = sampled_tracer();
        let mut span = recording_span(&tracer);
        span.set_attribute(KeyValue::new("keep", 1i64));
        span.set_attribute(KeyValue::new("scrub", "secret"));
        span.remove_attribute(&crate::Key::new("scrub"));
        span.remove_attribute(&crate::Key::new("never-set"));
        span.end();

        let spans = processor.ended_spans();
        assert_eq!(spans[0].attributes, vec![KeyValue::new("keep", 1i64)]);
        assert_eq!(spans[0].dropped_attributes_count, 0);
    }

    #[test]
    fn long_attribute_values_are_truncated() {
        let processor = TestSpanProcessor::new();
        let provider = TracerProvider::builder()
            .with_span_processor(processor.clone())
            .with_max_attribute_value_length(5)
            .build();
        let tracer = provider.tracer("test");

        let mut span = tracer.start("truncating");
        span.set_attribute(KeyValue::new("k", "0123456789"));
        span.end();

        let spans = processor.ended_spans();
        assert_eq!(spans[0].attributes, vec![KeyValue::new("k", "01234")]);
    }

    #[test]
    fn events_beyond_limit_are_dropped_and_counted() {
        let processor = TestSpanProcessor::new();
        let provider = TracerProvider::builder()
            .with_span_processor(processor.clone())
            .with_max_events_per_span(2)
            .build();
        let tracer = provider.tracer("test");

        let mut span = tracer.start("evented");
        for i in 0..4 {
            span.add_event(format!("event-{}", i), vec![]);
        }
        span.end();

        let spans = processor.ended_spans();
        assert_eq!(spans[0].events.len(), 2);
        assert_eq!(spans[0].events.dropped_count, 2);
    }

    #[test]
    fn event_attributes_beyond_limit_are_dropped_on_the_event() {
        let processor = TestSpanProcessor::new();
        let provider = TracerProvider::builder()
            .with_span_processor(processor.clone())
            .with_max_attributes_per_event(1)
            .build();
        let tracer = provider.tracer("test");

        let mut span = tracer.start("evented");
        span.add_event(
            "crowded",
            vec![
                KeyValue::new("a", 1i64),
                KeyValue::new("b", 2i64),
                KeyValue::new("c", 3i64),
            ],
        );
        span.end();

        let spans = processor.ended_spans();
        let event = &spans[0].events.events[0];
        assert_eq!(event.attributes.len(), 1);
        assert_eq!(event.dropped_attributes_count, 2);
    }

    #[test]
    fn links_beyond_limit_are_dropped_and_counted() {
        use crate::trace::{SpanId, TraceFlags, TraceId, TraceState};

        let processor = TestSpanProcessor::new();
        let provider = TracerProvider::builder()
            .with_span_processor(processor.clone())
            .with_max_links_per_span(1)
            .build();
        let tracer = provider.tracer("test");

        let linked = |n: u64| {
            SpanContext::new(
                TraceId::from(n as u128),
                SpanId::from(n),
                TraceFlags::SAMPLED,
                false,
                TraceState::NONE,
            )
        };

        let mut span = tracer.start("linked");
        span.add_link(linked(1), vec![]);
        span.add_link(linked(2), vec![]);
        span.end();

        let spans = processor.ended_spans();
        assert_eq!(spans[0].links.len(), 1);
        assert_eq!(spans[0].links.dropped_count, 1);
    }

    #[test]
    fn status_priority_is_enforced() {
        let (_provider, tracer, processor) = sampled_tracer();

        let mut span = recording_span(&tracer);
        span.set_status(Status::error("first"));
        // a second error does not replace the first
        span.set_status(Status::error("second"));
        span.set_status(Status::Ok);
        // ok is final
        span.set_status(Status::error("third"));
        span.end();

        let spans = processor.ended_spans();
        assert_eq!(spans[0].status, Status::Ok);

        let mut span = recording_span(&tracer);
        span.set_status(Status::error("kept"));
        span.set_status(Status::Unset);
        span.end();

        let spans = processor.ended_spans();
        assert_eq!(spans[1].status, Status::error("kept"));
    }

    #[test]
    fn update_name_while_recording() {
        let (_provider, tracer, processor) = sampled_tracer();
        let mut span = recording_span(&tracer);
        span.update_name("renamed");
        span.end();

        assert_eq!(processor.ended_spans()[0].name, "renamed");
    }
}
